use crate::{ProtocolError, AXIS_COUNT};
use arrayvec::ArrayString;
use core::fmt::{self, Display, Formatter, Write};
use core::mem::size_of;
use core::str;
use nb::Error::{Other, WouldBlock};

/// The longest response line, not counting the line ending.
pub const MAX_LINE_SIZE: usize = 128;

/// Name and version printed in the welcome banner.
pub const VERSION: &str = "CncKite 0.1";

struct TruncatingWriter(ArrayString<MAX_LINE_SIZE>);

impl Write for TruncatingWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.0.write_str(s).is_err() {
            // ArrayString::write_str() refuses to write anything if the whole string doesn't fit,
            // so fall back to writing as many chars as possible.
            s.chars().try_for_each(|c| self.0.write_char(c))?
        }

        Ok(())
    }

    fn write_fmt(&mut self, fmt: fmt::Arguments<'_>) -> fmt::Result {
        if fmt::write(self, fmt).is_ok() {
            return Ok(());
        }

        // `fmt::Error` doesn't have a payload, so we just have to guess.
        if self.0.len() + size_of::<char>() >= MAX_LINE_SIZE {
            // If we think we ran out of bytes while writing, truncate with ...
            self.0.pop();
            self.0.pop();
            self.0.pop();
            self.0.write_str("...")
        } else {
            Err(fmt::Error)
        }
    }
}

fn truncated(args: fmt::Arguments<'_>) -> ArrayString<MAX_LINE_SIZE> {
    let mut writer = TruncatingWriter(ArrayString::new());
    // Display impls in this crate don't fail, so the only error is running out of space, which
    // write_fmt handles by truncating.
    let _ = writer.write_fmt(args);
    writer.0
}

/// The run state of the machine as shown in status reports.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MachineState {
    Idle,
    Run,
    Hold,
    Alarm,
}

impl MachineState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Run => "Run",
            Self::Hold => "Hold",
            Self::Alarm => "Alarm",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Idle" => Some(Self::Idle),
            "Run" => Some(Self::Run),
            "Hold" => Some(Self::Hold),
            "Alarm" => Some(Self::Alarm),
            _ => None,
        }
    }
}

/// A snapshot of the machine, sent in reply to a status query.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StatusReport {
    pub state: MachineState,
    /// Machine position of each axis in millimetres.
    pub machine_position: [f32; AXIS_COUNT],
    /// The number of motion blocks queued, including the one executing.
    pub queued_blocks: u16,
    pub buffer_capacity: u16,
    /// Feed rate of the executing block in mm/min, or 0 when idle.
    pub feed_rate: f32,
}

impl Display for StatusReport {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "<{}|MPos:", self.state.name())?;
        for (i, position) in self.machine_position.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{:.3}", position)?;
        }
        write!(
            f,
            "|Bf:{},{}|F:{:.0}>",
            self.queued_blocks, self.buffer_capacity, self.feed_rate
        )
    }
}

impl StatusReport {
    /// Parse the part of a status line between the angle brackets.
    pub fn parse(body: &str) -> Result<Self, ProtocolError> {
        let mut fields = body.split('|');
        let state = fields
            .next()
            .and_then(MachineState::parse)
            .ok_or(ProtocolError::InvalidStatement)?;
        let mut report = StatusReport {
            state,
            machine_position: [0.0; AXIS_COUNT],
            queued_blocks: 0,
            buffer_capacity: 0,
            feed_rate: 0.0,
        };
        for field in fields {
            let (name, values) = field
                .split_once(':')
                .ok_or(ProtocolError::InvalidStatement)?;
            match name {
                "MPos" => {
                    let mut values = values.split(',');
                    for position in report.machine_position.iter_mut() {
                        *position = parse_value(values.next())?;
                    }
                }
                "Bf" => {
                    let (queued, capacity) = values
                        .split_once(',')
                        .ok_or(ProtocolError::InvalidStatement)?;
                    report.queued_blocks = parse_value(Some(queued))?;
                    report.buffer_capacity = parse_value(Some(capacity))?;
                }
                "F" => report.feed_rate = parse_value(Some(values))?,
                // Unknown fields are skipped so newer firmware can add more.
                _ => {}
            }
        }
        Ok(report)
    }
}

fn parse_value<T: str::FromStr>(value: Option<&str>) -> Result<T, ProtocolError> {
    value
        .and_then(|value| value.parse().ok())
        .ok_or(ProtocolError::InvalidStatement)
}

#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    /// The line was accepted.
    Ok,
    /// The line was rejected, with the code from [`ProtocolError::code`].
    Error(u8),
    /// The machine raised an alarm, with the code from [`crate::AlarmCode::code`].
    Alarm(u8),
    Status(StatusReport),
    /// A `[MSG:...]` line.
    Message(ArrayString<MAX_LINE_SIZE>),
    /// Any other bracketed report, like `[GC:G1 G21 G90 F100]`. The brackets are not included.
    Feedback(ArrayString<MAX_LINE_SIZE>),
    /// One `$<id>=<value>` line of a settings report.
    Setting { id: u16, value: f32 },
    /// The banner printed on startup and after a reset.
    Welcome,
}

impl Response {
    pub fn message_from_fmt(args: fmt::Arguments<'_>) -> Self {
        Self::Message(truncated(args))
    }

    pub fn feedback_from_fmt(args: fmt::Arguments<'_>) -> Self {
        Self::Feedback(truncated(args))
    }

    pub fn error(error: ProtocolError) -> Self {
        Self::Error(error.code())
    }

    /// Render this response as a single line, without the line ending.
    pub fn to_line(&self) -> ArrayString<MAX_LINE_SIZE> {
        truncated(format_args!("{}", self))
    }

    pub fn write_to<W: embedded_io::Write>(&self, writer: &mut W) -> Result<(), W::Error> {
        if matches!(self, Self::Welcome) {
            writer.write_all(b"\r\n")?;
        }
        writer.write_all(self.to_line().as_bytes())?;
        writer.write_all(b"\r\n")
    }

    /// Write this response to a `std::io::Write`, for host tools and tests.
    #[cfg(feature = "std")]
    pub fn write_to_std(&self, writer: impl std::io::Write) -> std::io::Result<()> {
        self.write_to(&mut embedded_io_adapters::std::FromStd::new(writer))
    }

    /// Parse one response from the start of `buf`.
    ///
    /// Returns the response and the number of bytes it used, including the line ending and any
    /// blank lines before it. Returns `WouldBlock` if no complete line is available yet.
    pub fn parse(buf: &[u8]) -> nb::Result<(Self, usize), (ProtocolError, usize)> {
        let skipped = buf
            .iter()
            .take_while(|&&b| b == b'\r' || b == b'\n')
            .count();
        let rest = &buf[skipped..];
        let end = match rest.iter().position(|&b| b == b'\n') {
            Some(end) => end,
            None if rest.len() > MAX_LINE_SIZE + 1 => {
                return Err(Other((ProtocolError::LineOverflow, buf.len())))
            }
            None => return Err(WouldBlock),
        };
        let used = skipped + end + 1;
        let line = match rest[..end] {
            [ref line @ .., b'\r'] => line,
            ref line => line,
        };
        let line = str::from_utf8(line).map_err(|_| (ProtocolError::InvalidStatement, used))?;
        Self::parse_line(line)
            .map(|response| (response, used))
            .map_err(|e| Other((e, used)))
    }

    fn parse_line(line: &str) -> Result<Self, ProtocolError> {
        if line == "ok" {
            Ok(Self::Ok)
        } else if let Some(code) = line.strip_prefix("error:") {
            Ok(Self::Error(parse_value(Some(code))?))
        } else if let Some(code) = line.strip_prefix("ALARM:") {
            Ok(Self::Alarm(parse_value(Some(code))?))
        } else if let Some(body) = line.strip_prefix('<').and_then(|l| l.strip_suffix('>')) {
            Ok(Self::Status(StatusReport::parse(body)?))
        } else if let Some(body) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let text = ArrayString::from(body.strip_prefix("MSG:").unwrap_or(body))
                .map_err(|_| ProtocolError::LineOverflow)?;
            if body.starts_with("MSG:") {
                Ok(Self::Message(text))
            } else {
                Ok(Self::Feedback(text))
            }
        } else if let Some((id, value)) = line.strip_prefix('$').and_then(|l| l.split_once('=')) {
            Ok(Self::Setting {
                id: parse_value(Some(id))?,
                value: parse_value(Some(value))?,
            })
        } else if line.starts_with(VERSION) {
            Ok(Self::Welcome)
        } else {
            Err(ProtocolError::InvalidStatement)
        }
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Error(code) => write!(f, "error:{}", code),
            Self::Alarm(code) => write!(f, "ALARM:{}", code),
            Self::Status(report) => write!(f, "{}", report),
            Self::Message(message) => write!(f, "[MSG:{}]", message),
            Self::Feedback(feedback) => write!(f, "[{}]", feedback),
            Self::Setting { id, value } => write!(f, "${}={:.3}", id, value),
            Self::Welcome => write!(f, "{} ['$' for help]", VERSION),
        }
    }
}

#[cfg(feature = "std")]
#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn status() -> StatusReport {
        StatusReport {
            state: MachineState::Run,
            machine_position: [1.5, -2.25, 10.0, 0.0],
            queued_blocks: 3,
            buffer_capacity: 16,
            feed_rate: 600.0,
        }
    }

    mod message {
        use super::super::*;
        use test_case::test_case;

        #[test_case("$" ; "width 1")]
        #[test_case("¢" ; "width 2")]
        #[test_case("€" ; "width 3")]
        #[test_case("𐍈" ; "width 4")]
        fn too_long_with_unicode_widths(c: &str) {
            let response = Response::message_from_fmt(format_args!("{}", c.repeat(500)));
            let message = match response {
                Response::Message(message) => message,
                _ => panic!(),
            };
            assert!(message.ends_with("..."))
        }

        #[test]
        fn parse_too_long() {
            let buf = "n".repeat(500);
            let response = Response::parse(buf.as_bytes());
            assert_eq!(response, Err(Other((ProtocolError::LineOverflow, 500))));
        }
    }

    #[test]
    fn status_line() {
        assert_eq!(
            Response::Status(status()).to_line().as_str(),
            "<Run|MPos:1.500,-2.250,10.000,0.000|Bf:3,16|F:600>"
        );
    }

    #[test]
    fn error_uses_code() {
        let mut buf = Vec::new();
        Response::error(ProtocolError::UndefinedFeedRate)
            .write_to_std(&mut buf)
            .unwrap();
        assert_eq!(buf, b"error:22\r\n");
    }

    #[test]
    fn welcome_starts_on_new_line() {
        let mut buf = Vec::new();
        Response::Welcome.write_to_std(&mut buf).unwrap();
        assert_eq!(buf, b"\r\nCncKite 0.1 ['$' for help]\r\n");
    }

    #[test]
    fn parse_partial() {
        for length in 0..4 {
            assert_eq!(Response::parse(&b"ok\r\n"[..length]), Err(WouldBlock));
        }
    }

    #[test]
    fn parse_skips_blank_lines() {
        assert_eq!(Response::parse(b"\r\n\r\nok\r\n"), Ok((Response::Ok, 8)));
        assert_eq!(Response::parse(b"\r\n"), Err(WouldBlock));
    }

    #[test]
    fn parse_unknown() {
        assert_eq!(
            Response::parse(b"hello\r\nok\r\n"),
            Err(Other((ProtocolError::InvalidStatement, 7)))
        );
    }

    #[test]
    fn parse_bad_status() {
        assert_eq!(
            Response::parse(b"<Dancing|MPos:0,0,0,0>\n"),
            Err(Other((ProtocolError::InvalidStatement, 23)))
        );
    }

    #[test_case(b"ok\r\n", Response::Ok)]
    #[test_case(b"ok\n", Response::Ok ; "bare newline")]
    #[test_case(b"error:20\r\n", Response::Error(20))]
    #[test_case(b"ALARM:1\r\n", Response::Alarm(1))]
    #[test_case(b"[MSG:Reset to continue]\r\n", Response::Message(ArrayString::from("Reset to continue").unwrap()))]
    #[test_case(b"[GC:G0 G21 G90]\r\n", Response::Feedback(ArrayString::from("GC:G0 G21 G90").unwrap()))]
    #[test_case(b"$100=80.000\r\n", Response::Setting { id: 100, value: 80.0 })]
    #[test_case(b"CncKite 0.1 ['$' for help]\r\n", Response::Welcome)]
    fn parse_valid(bytes: &[u8], response: Response) {
        assert_eq!(Response::parse(bytes), Ok((response, bytes.len())));
    }

    #[test]
    fn status_ignores_unknown_fields() {
        let (response, _) =
            Response::parse(b"<Idle|MPos:1.000,2.000,3.000,4.000|WCO:0,0,0|Bf:0,16|F:0>\n")
                .unwrap();
        assert_eq!(
            response,
            Response::Status(StatusReport {
                state: MachineState::Idle,
                machine_position: [1.0, 2.0, 3.0, 4.0],
                queued_blocks: 0,
                buffer_capacity: 16,
                feed_rate: 0.0,
            })
        );
    }

    #[test_case(Response::Ok)]
    #[test_case(Response::Error(9))]
    #[test_case(Response::Alarm(3))]
    #[test_case(Response::Status(status()))]
    #[test_case(Response::Message(ArrayString::from("hello").unwrap()))]
    #[test_case(Response::Setting { id: 110, value: 1500.0 })]
    #[test_case(Response::Welcome)]
    fn round_trip(response: Response) {
        let mut buffer = Vec::new();
        response.write_to_std(&mut buffer).unwrap();

        assert_eq!(Response::parse(&buffer), Ok((response, buffer.len())));
    }
}
