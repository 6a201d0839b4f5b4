/// Single-byte commands which bypass the line buffer and act immediately.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RealtimeCommand {
    /// `?`
    StatusQuery,
    /// `!`
    FeedHold,
    /// `~`
    CycleStart,
    /// Ctrl-X
    Reset,
}

impl RealtimeCommand {
    pub const ALL: [RealtimeCommand; 4] = [
        RealtimeCommand::StatusQuery,
        RealtimeCommand::FeedHold,
        RealtimeCommand::CycleStart,
        RealtimeCommand::Reset,
    ];

    pub fn parse(byte: u8) -> Option<Self> {
        match byte {
            b'?' => Some(Self::StatusQuery),
            b'!' => Some(Self::FeedHold),
            b'~' => Some(Self::CycleStart),
            0x18 => Some(Self::Reset),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::StatusQuery => b'?',
            Self::FeedHold => b'!',
            Self::CycleStart => b'~',
            Self::Reset => 0x18,
        }
    }
}
