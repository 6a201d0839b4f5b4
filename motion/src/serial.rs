use crate::ring::Ring;
use arrayvec::ArrayVec;
use bitflags::bitflags;
use cnc_protocol::RealtimeCommand;

bitflags! {
    /// Realtime commands received but not yet handled.
    #[derive(Default)]
    pub struct RealtimeFlags: u8 {
        const STATUS_QUERY = 0b0001;
        const FEED_HOLD = 0b0010;
        const CYCLE_START = 0b0100;
        const RESET = 0b1000;
    }
}

impl From<RealtimeCommand> for RealtimeFlags {
    fn from(command: RealtimeCommand) -> Self {
        match command {
            RealtimeCommand::StatusQuery => Self::STATUS_QUERY,
            RealtimeCommand::FeedHold => Self::FEED_HOLD,
            RealtimeCommand::CycleStart => Self::CYCLE_START,
            RealtimeCommand::Reset => Self::RESET,
        }
    }
}

/// Where the main loop gets its received bytes from.
pub trait ByteSource {
    /// Take every realtime command received since the last call.
    fn take_realtime(&mut self) -> RealtimeFlags;

    /// The next byte of command text, if any.
    fn read_byte(&mut self) -> Option<u8>;

    /// Whether bytes were dropped between the last byte read and the next one, because the
    /// receive buffer was full. Must be checked before each [`read_byte`](Self::read_byte), so the
    /// loss is charged to the line it happened in.
    fn take_overflow(&mut self) -> bool;

    /// Drop everything received so far.
    fn discard(&mut self);
}

/// The receive side of the serial port, written one byte at a time from the receive interrupt.
///
/// Realtime command bytes are latched as flags rather than buffered, so they take effect even when
/// the buffer is full of queued lines.
///
/// When a byte has to be dropped, the rest of that line is dropped too and the point in the stream
/// where it happened is remembered, so the main loop can reject just the damaged line. Only one
/// loss is tracked at a time: until the main loop has read up to it, every later byte is dropped
/// as well and the lines they belong to are rejected along with it.
pub struct SerialIntake<const N: usize> {
    buffer: Ring<u8, N>,
    realtime: RealtimeFlags,
    /// Bytes stored and read so far, wrapping.
    stored: usize,
    read: usize,
    /// The value of `read` at which bytes went missing.
    lost_at: Option<usize>,
    /// Bytes are being dropped until the end of the damaged line.
    discarding: bool,
}

impl<const N: usize> Default for SerialIntake<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SerialIntake<N> {
    pub const fn new() -> Self {
        Self {
            buffer: Ring::new(),
            realtime: RealtimeFlags::empty(),
            stored: 0,
            read: 0,
            lost_at: None,
            discarding: false,
        }
    }

    pub fn receive(&mut self, byte: u8) {
        if let Some(command) = RealtimeCommand::parse(byte) {
            self.realtime.insert(command.into());
        } else if self.discarding {
            // The terminator ends the damaged line, if there's room for it and the main loop has
            // already seen the loss.
            if matches!(byte, b'\n' | b'\r') && self.lost_at.is_none() && self.store(byte) {
                self.discarding = false;
            }
        } else if !self.store(byte) {
            self.discarding = true;
            self.lost_at = Some(self.stored);
        }
    }

    fn store(&mut self, byte: u8) -> bool {
        if self.buffer.push(byte).is_ok() {
            self.stored = self.stored.wrapping_add(1);
            true
        } else {
            false
        }
    }

    /// The number of bytes waiting to be read.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl<const N: usize> ByteSource for SerialIntake<N> {
    fn take_realtime(&mut self) -> RealtimeFlags {
        let flags = self.realtime;
        self.realtime = RealtimeFlags::empty();
        flags
    }

    fn read_byte(&mut self) -> Option<u8> {
        let byte = self.buffer.pop()?;
        self.read = self.read.wrapping_add(1);
        Some(byte)
    }

    fn take_overflow(&mut self) -> bool {
        if self.lost_at == Some(self.read) {
            self.lost_at = None;
            true
        } else {
            false
        }
    }

    fn discard(&mut self) {
        self.buffer.clear();
        self.realtime = RealtimeFlags::empty();
        self.read = self.stored;
        self.lost_at = None;
        self.discarding = false;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineEvent {
    /// More bytes are needed.
    Incomplete,
    /// A line is ready in [`LineReader::line`].
    Complete,
    /// A line ended but didn't fit, so it was dropped.
    Overflowed,
}

/// Assembles received bytes into lines.
///
/// Lines end with `\n` or `\r`, so `\r\n` works too. Empty lines are skipped.
#[derive(Debug, Default)]
pub struct LineReader<const N: usize> {
    line: ArrayVec<u8, N>,
    overflowed: bool,
}

impl<const N: usize> LineReader<N> {
    pub fn new() -> Self {
        Self {
            line: ArrayVec::new(),
            overflowed: false,
        }
    }

    pub fn push(&mut self, byte: u8) -> LineEvent {
        match byte {
            b'\n' | b'\r' => {
                if self.overflowed {
                    self.clear();
                    LineEvent::Overflowed
                } else if self.line.is_empty() {
                    LineEvent::Incomplete
                } else {
                    LineEvent::Complete
                }
            }
            _ if self.overflowed => LineEvent::Incomplete,
            _ => {
                if self.line.try_push(byte).is_err() {
                    self.overflowed = true;
                }
                LineEvent::Incomplete
            }
        }
    }

    /// The line so far. Only a whole line once [`push`](Self::push) has returned
    /// [`LineEvent::Complete`].
    pub fn line(&self) -> &[u8] {
        &self.line
    }

    /// Start a new line.
    pub fn clear(&mut self) {
        self.line.clear();
        self.overflowed = false;
    }

    /// Drop the rest of the current line, because some of it was lost.
    pub fn mark_overflowed(&mut self) {
        self.overflowed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod intake {
        use super::*;

        #[test]
        fn realtime_bytes_are_latched() {
            let mut intake = SerialIntake::<16>::new();
            for &byte in b"G1?X1!\x18" {
                intake.receive(byte);
            }
            assert_eq!(intake.len(), 4);
            assert_eq!(
                intake.take_realtime(),
                RealtimeFlags::STATUS_QUERY | RealtimeFlags::FEED_HOLD | RealtimeFlags::RESET
            );
            assert_eq!(intake.take_realtime(), RealtimeFlags::empty());
            let text: Vec<u8> = core::iter::from_fn(|| intake.read_byte()).collect();
            assert_eq!(text, b"G1X1");
        }

        fn receive_all<const N: usize>(intake: &mut SerialIntake<N>, bytes: &[u8]) {
            for &byte in bytes {
                intake.receive(byte);
            }
        }

        /// Read everything available, with `#` where bytes went missing.
        fn drain<const N: usize>(intake: &mut SerialIntake<N>) -> Vec<u8> {
            let mut text = vec![];
            loop {
                if intake.take_overflow() {
                    text.push(b'#');
                }
                match intake.read_byte() {
                    Some(byte) => text.push(byte),
                    None => return text,
                }
            }
        }

        #[test]
        fn realtime_when_full() {
            let mut intake = SerialIntake::<2>::new();
            receive_all(&mut intake, b"abc~");
            assert_eq!(intake.take_realtime(), RealtimeFlags::CYCLE_START);
            assert_eq!(drain(&mut intake), b"ab#");
        }

        #[test]
        fn loss_stays_with_its_line() {
            let mut intake = SerialIntake::<8>::new();
            receive_all(&mut intake, b"G0X1\nX2\nX3\nX4\n");
            assert!(!intake.take_overflow());
            assert_eq!(drain(&mut intake), b"G0X1\nX2\n#");
            // Dropping carries on to the end of the damaged line.
            receive_all(&mut intake, b"Y5\nY6\n");
            assert_eq!(drain(&mut intake), b"\nY6\n");
        }

        #[test]
        fn loss_partway_through_line() {
            let mut intake = SerialIntake::<4>::new();
            receive_all(&mut intake, b"X1\nY23\n");
            assert_eq!(drain(&mut intake), b"X1\nY#");
            receive_all(&mut intake, b"\nZ4\n");
            assert_eq!(drain(&mut intake), b"\nZ4\n");
        }

        #[test]
        fn terminator_waits_for_loss_to_be_read() {
            let mut intake = SerialIntake::<4>::new();
            receive_all(&mut intake, b"X1\nY2");
            assert_eq!(intake.read_byte(), Some(b'X'));
            // There's room for the terminator now, but it belongs to a line that's already damaged
            // and the loss hasn't been read yet.
            receive_all(&mut intake, b"\nZ3\n");
            assert_eq!(drain(&mut intake), b"1\nY#");
            receive_all(&mut intake, b"\nZ4\n");
            assert_eq!(drain(&mut intake), b"\nZ4\n");
        }

        #[test]
        fn discard() {
            let mut intake = SerialIntake::<4>::new();
            for &byte in b"abcde?" {
                intake.receive(byte);
            }
            intake.discard();
            assert!(intake.is_empty());
            assert!(!intake.take_overflow());
            assert_eq!(intake.take_realtime(), RealtimeFlags::empty());
            // Nothing is dropped after a discard, even in the middle of a line.
            receive_all(&mut intake, b"X1\n");
            assert_eq!(drain(&mut intake), b"X1\n");
        }
    }

    mod reader {
        use super::*;

        fn feed<const N: usize>(reader: &mut LineReader<N>, bytes: &[u8]) -> Vec<LineEvent> {
            bytes.iter().map(|&byte| reader.push(byte)).collect()
        }

        #[test]
        fn crlf() {
            let mut reader = LineReader::<8>::new();
            let events = feed(&mut reader, b"G0X1\r");
            assert_eq!(events.last(), Some(&LineEvent::Complete));
            assert_eq!(reader.line(), b"G0X1");
            reader.clear();
            assert_eq!(reader.push(b'\n'), LineEvent::Incomplete);
            assert_eq!(reader.line(), b"");
        }

        #[test]
        fn blank_lines_skipped() {
            let mut reader = LineReader::<8>::new();
            let events = feed(&mut reader, b"\n\r\n");
            assert!(events.iter().all(|&event| event == LineEvent::Incomplete));
        }

        #[test]
        fn too_long() {
            let mut reader = LineReader::<4>::new();
            let events = feed(&mut reader, b"G1X100\nX1\n");
            assert_eq!(events[6], LineEvent::Overflowed);
            assert_eq!(events[9], LineEvent::Complete);
            assert_eq!(reader.line(), b"X1");
        }

        #[test]
        fn exactly_full() {
            let mut reader = LineReader::<4>::new();
            let events = feed(&mut reader, b"G1X1\n");
            assert_eq!(events[4], LineEvent::Complete);
            assert_eq!(reader.line(), b"G1X1");
        }

        #[test]
        fn lost_bytes() {
            let mut reader = LineReader::<8>::new();
            feed(&mut reader, b"G1");
            reader.mark_overflowed();
            assert_eq!(feed(&mut reader, b"X1\n")[2], LineEvent::Overflowed);
        }
    }
}
