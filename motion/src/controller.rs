use crate::block::BlockBuffer;
use crate::interpreter::{Interpreter, ModalState};
use crate::planner::Planner;
use crate::pulse::PulseGenerator;
use crate::reports;
use crate::serial::{ByteSource, LineEvent, LineReader, RealtimeFlags};
use crate::settings::{Settings, SettingsError};
use crate::status::status_report;
use crate::{BLOCK_BUFFER_SIZE, LINE_BUFFER_SIZE};
use arrayvec::ArrayVec;
use cnc_protocol::{AlarmCode, MachineState, ProtocolError, Response, StatusReport};
use embedded_io::Write;
use log::{debug, info, warn};

/// A line starting with `$`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum SystemCommand<'a> {
    Help,
    Settings,
    BuildInfo,
    ParserState,
    /// The words after `$J=`.
    Jog(&'a [u8]),
}

impl<'a> SystemCommand<'a> {
    /// Parse the part of the line after the `$`.
    fn parse(command: &'a [u8]) -> Result<Self, ProtocolError> {
        match command {
            b"" => Ok(Self::Help),
            b"$" => Ok(Self::Settings),
            [b'I' | b'i'] => Ok(Self::BuildInfo),
            [b'G' | b'g'] => Ok(Self::ParserState),
            [b'J' | b'j', b'=', words @ ..] => Ok(Self::Jog(words)),
            _ => Err(ProtocolError::InvalidStatement),
        }
    }
}

fn trim(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |end| end + 1);
    &line[start..end]
}

/// Everything the main loop owns: the interpreter, the block buffer, the planner and the pulse
/// generator, plus the run state.
pub struct Controller<P: PulseGenerator, const N: usize = BLOCK_BUFFER_SIZE> {
    settings: Settings,
    pulses: P,
    buffer: BlockBuffer<N>,
    planner: Planner,
    interpreter: Interpreter,
    reader: LineReader<LINE_BUFFER_SIZE>,
    /// The line in `reader` is complete but couldn't be queued yet because the buffer was full.
    pending: bool,
    /// A feed hold is in effect.
    held: bool,
    alarm: Option<AlarmCode>,
}

impl<P: PulseGenerator, const N: usize> Controller<P, N> {
    pub fn new(settings: Settings, pulses: P) -> Result<Self, SettingsError> {
        settings.validate()?;
        Ok(Self {
            settings,
            pulses,
            buffer: BlockBuffer::new(),
            planner: Planner::new(),
            interpreter: Interpreter::new(),
            reader: LineReader::new(),
            pending: false,
            held: false,
            alarm: None,
        })
    }

    /// Print the welcome banner.
    pub fn startup<W: Write>(&mut self, out: &mut W) -> Result<(), W::Error> {
        info!("Starting with buffer for {} blocks", N);
        Response::Welcome.write_to(out)
    }

    /// One step of the main loop.
    ///
    /// Handles realtime commands first, then lets the planner retire and start blocks, then
    /// processes at most one line. If the block buffer is full a line stays pending, without any
    /// response, and is tried again on later calls.
    pub fn poll<S: ByteSource, W: Write>(
        &mut self,
        source: &mut S,
        out: &mut W,
    ) -> Result<(), W::Error> {
        let realtime = source.take_realtime();
        if realtime.contains(RealtimeFlags::RESET) {
            source.discard();
            return self.reset(out);
        }
        if realtime.contains(RealtimeFlags::FEED_HOLD) {
            self.feed_hold();
        }
        if realtime.contains(RealtimeFlags::CYCLE_START) {
            self.cycle_start();
        }
        if realtime.contains(RealtimeFlags::STATUS_QUERY) {
            Response::Status(self.status()).write_to(out)?;
        }

        self.planner.service(
            &mut self.buffer,
            &mut self.pulses,
            &self.settings,
            self.alarm.is_none() && !self.held,
        );

        if self.pending {
            self.pending = false;
            return self.process_line(out);
        }

        loop {
            if source.take_overflow() {
                warn!("Receive buffer overflowed");
                self.reader.mark_overflowed();
            }
            let byte = match source.read_byte() {
                Some(byte) => byte,
                None => return Ok(()),
            };
            match self.reader.push(byte) {
                LineEvent::Incomplete => {}
                LineEvent::Complete => return self.process_line(out),
                LineEvent::Overflowed => {
                    return Response::error(ProtocolError::LineOverflow).write_to(out)
                }
            }
        }
    }

    /// Run the complete line in the reader, and respond to it unless it has to wait.
    fn process_line<W: Write>(&mut self, out: &mut W) -> Result<(), W::Error> {
        let line: ArrayVec<u8, LINE_BUFFER_SIZE> =
            trim(self.reader.line()).iter().copied().collect();
        let result: nb::Result<(), ProtocolError> = match line.strip_prefix(b"$") {
            Some(command) => match SystemCommand::parse(command) {
                Ok(SystemCommand::Jog(_)) if self.alarm.is_some() => {
                    Err(ProtocolError::Locked.into())
                }
                Ok(SystemCommand::Jog(words)) => {
                    self.interpreter.jog(words, &mut self.buffer, &self.settings)
                }
                Ok(report) => {
                    // The line is done with even if the report can't be written.
                    self.reader.clear();
                    self.report(report, out)?;
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            None if self.alarm.is_some() => Err(ProtocolError::Locked.into()),
            None => self
                .interpreter
                .execute(&line, &mut self.buffer, &self.settings),
        };

        match result {
            Ok(()) => {
                self.reader.clear();
                Response::Ok.write_to(out)
            }
            Err(nb::Error::WouldBlock) => {
                self.pending = true;
                Ok(())
            }
            Err(nb::Error::Other(e)) => {
                debug!("Rejected line: {}", e);
                self.reader.clear();
                Response::error(e).write_to(out)
            }
        }
    }

    fn report<W: Write>(&self, command: SystemCommand, out: &mut W) -> Result<(), W::Error> {
        match command {
            SystemCommand::Help => reports::help(out),
            SystemCommand::Settings => reports::settings(&self.settings, out),
            SystemCommand::BuildInfo => reports::build_info(out),
            SystemCommand::ParserState => reports::parser_state(self.interpreter.modal(), out),
            SystemCommand::Jog(_) => Ok(()),
        }
    }

    /// Pause motion. The executing block keeps its remaining steps and no new block starts.
    pub fn feed_hold(&mut self) {
        if self.alarm.is_none() && !self.held {
            debug!("Feed hold");
            self.planner.hold(&mut self.pulses);
            self.held = true;
        }
    }

    /// Continue after a feed hold.
    pub fn cycle_start(&mut self) {
        if self.alarm.is_none() && self.held {
            debug!("Cycle start");
            self.held = false;
            self.planner.resume(&mut self.pulses);
        }
    }

    /// Stop all motion and lock out motion commands until reset.
    pub fn alarm<W: Write>(&mut self, code: AlarmCode, out: &mut W) -> Result<(), W::Error> {
        warn!("Alarm {:?}", code);
        self.stop_motion();
        self.alarm = Some(code);
        Response::Alarm(code.code()).write_to(out)?;
        Response::message_from_fmt(format_args!("Reset to continue")).write_to(out)
    }

    /// Abort everything and go back to the power-on state, keeping the axes where they stopped.
    ///
    /// If blocks were running or queued, [`AlarmCode::AbortCycle`] is reported before the welcome
    /// banner.
    pub fn reset<W: Write>(&mut self, out: &mut W) -> Result<(), W::Error> {
        info!("Reset");
        let aborted = self.state() == MachineState::Run;
        self.stop_motion();
        self.alarm = None;
        self.interpreter.reset(self.pulses.positions(), &self.settings);
        if aborted {
            warn!("Alarm {:?}", AlarmCode::AbortCycle);
            Response::Alarm(AlarmCode::AbortCycle.code()).write_to(out)?;
        }
        Response::Welcome.write_to(out)
    }

    fn stop_motion(&mut self) {
        self.planner.abort(&mut self.pulses);
        self.buffer.clear();
        self.reader.clear();
        self.pending = false;
        self.held = false;
        self.interpreter
            .sync_position(self.pulses.positions(), &self.settings);
    }

    pub fn state(&self) -> MachineState {
        if self.alarm.is_some() {
            MachineState::Alarm
        } else if self.held {
            MachineState::Hold
        } else if self.planner.is_executing() || !self.buffer.is_empty() {
            MachineState::Run
        } else {
            MachineState::Idle
        }
    }

    pub fn status(&self) -> StatusReport {
        status_report(
            self.state(),
            self.pulses.positions(),
            self.buffer.len(),
            self.buffer.capacity(),
            self.planner.active_feed_rate(),
            &self.settings,
        )
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn modal(&self) -> &ModalState {
        self.interpreter.modal()
    }

    /// The number of blocks queued, including the one executing.
    pub fn queued_blocks(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a line is waiting for space in the block buffer.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn pulses(&self) -> &P {
        &self.pulses
    }

    pub fn pulses_mut(&mut self) -> &mut P {
        &mut self.pulses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(b"", Ok(SystemCommand::Help))]
    #[test_case(b"$", Ok(SystemCommand::Settings))]
    #[test_case(b"i", Ok(SystemCommand::BuildInfo))]
    #[test_case(b"G", Ok(SystemCommand::ParserState))]
    #[test_case(b"J=X1F10", Ok(SystemCommand::Jog(b"X1F10")))]
    #[test_case(b"J", Err(ProtocolError::InvalidStatement))]
    #[test_case(b"H", Err(ProtocolError::InvalidStatement))]
    #[test_case(b"100=5", Err(ProtocolError::InvalidStatement))]
    fn system_command(command: &[u8], expected: Result<SystemCommand, ProtocolError>) {
        assert_eq!(SystemCommand::parse(command), expected);
    }

    #[test_case(b"  G1 X1 \t", b"G1 X1")]
    #[test_case(b"   ", b"")]
    #[test_case(b"$$", b"$$")]
    fn trim_whitespace(line: &[u8], trimmed: &[u8]) {
        assert_eq!(trim(line), trimmed);
    }
}
