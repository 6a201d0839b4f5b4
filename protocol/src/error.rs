#[derive(displaydoc::Display, Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProtocolError {
    /// expected a command letter, got `{0}`
    ExpectedCommandLetter(char),
    /// missing or malformed number after `{0}`
    BadNumberFormat(char),
    /// invalid statement
    InvalidStatement,
    /// value must be positive
    NegativeValue,
    /// locked by an alarm, reset to continue
    Locked,
    /// line too long
    LineOverflow,
    /// number out of range
    NumberOverflow,
    /// invalid jog command
    InvalidJog,
    /// unsupported command `{0}`
    UnsupportedCommand(char),
    /// conflicting words from the same modal group
    ModalGroupViolation,
    /// feed rate has not been set
    UndefinedFeedRate,
    /// word `{0}` repeated in one line
    RepeatedWord(char),
}

impl ProtocolError {
    /// The numeric code sent to the host as `error:<code>`.
    pub fn code(self) -> u8 {
        match self {
            Self::ExpectedCommandLetter(_) => 1,
            Self::BadNumberFormat(_) => 2,
            Self::InvalidStatement => 3,
            Self::NegativeValue => 4,
            Self::Locked => 9,
            Self::LineOverflow => 11,
            Self::NumberOverflow => 13,
            Self::InvalidJog => 15,
            Self::UnsupportedCommand(_) => 20,
            Self::ModalGroupViolation => 21,
            Self::UndefinedFeedRate => 22,
            Self::RepeatedWord(_) => 25,
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ProtocolError {}

/// Reasons for the machine to enter the alarm state.
#[derive(displaydoc::Display, Debug, Copy, Clone, Eq, PartialEq)]
pub enum AlarmCode {
    /// hard limit triggered
    HardLimit,
    /// motion aborted
    AbortCycle,
}

impl AlarmCode {
    /// The numeric code sent to the host as `ALARM:<code>`.
    pub fn code(self) -> u8 {
        match self {
            Self::HardLimit => 1,
            Self::AbortCycle => 3,
        }
    }
}
