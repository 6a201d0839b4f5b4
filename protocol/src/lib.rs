#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
pub mod client;
mod error;
mod realtime;
mod response;
mod word;

pub use embedded_io::ErrorType;
pub use error::{AlarmCode, ProtocolError};
pub use realtime::RealtimeCommand;
pub use response::{MachineState, Response, StatusReport, MAX_LINE_SIZE, VERSION};
pub use word::{Word, Words};

/// The number of axes the controller drives.
pub const AXIS_COUNT: usize = 4;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Axis {
    X,
    Y,
    Z,
    /// The optional rotary axis.
    A,
}

impl Axis {
    pub const ALL: [Axis; AXIS_COUNT] = [Axis::X, Axis::Y, Axis::Z, Axis::A];

    /// Parse an axis word letter. The letter must already be upper case.
    pub fn parse(letter: u8) -> Option<Self> {
        match letter {
            b'X' => Some(Self::X),
            b'Y' => Some(Self::Y),
            b'Z' => Some(Self::Z),
            b'A' => Some(Self::A),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Self::X => 'X',
            Self::Y => 'Y',
            Self::Z => 'Z',
            Self::A => 'A',
        }
    }

    /// Index of this axis into per-axis arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_index_matches_all() {
        for (i, axis) in Axis::ALL.iter().enumerate() {
            assert_eq!(axis.index(), i);
            assert_eq!(Axis::parse(axis.to_char() as u8), Some(*axis));
        }
    }

    #[test]
    fn lower_case_is_not_an_axis() {
        assert_eq!(Axis::parse(b'x'), None);
    }
}
