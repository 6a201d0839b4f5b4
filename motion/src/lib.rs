//! The motion core of the CNC controller: everything between a received byte and a pulse train
//! handed to the step timers. None of it touches hardware directly; the firmware provides a
//! [`PulseGenerator`] and feeds a [`SerialIntake`] from its interrupts.

#![cfg_attr(not(feature = "std"), no_std)]

mod axis;
mod block;
mod controller;
mod interpreter;
mod planner;
mod pulse;
mod reports;
mod ring;
mod serial;
mod settings;
#[cfg(feature = "std")]
pub mod sim;
mod status;

pub use axis::{AxisMask, AxisState, Direction, PulseEvent};
pub use block::{BlockBuffer, MotionBlock, MotionMode};
pub use controller::Controller;
pub use interpreter::{DistanceMode, Interpreter, ModalState, Units};
pub use planner::{block_timing, clamp_period, BlockTiming, Planner, Progress, COUNTER_MARGIN};
pub use pulse::{AxisMove, PulseGenerator, PulseTiming};
pub use ring::{Full, Ring};
pub use serial::{ByteSource, LineEvent, LineReader, RealtimeFlags, SerialIntake};
pub use settings::{Settings, SettingsError};
pub use status::status_report;

/// The number of motion blocks which can be queued ahead of the one executing.
pub const BLOCK_BUFFER_SIZE: usize = 16;
/// The longest command line accepted, not counting the line ending.
pub const LINE_BUFFER_SIZE: usize = 80;
/// Size of the ring between the receive interrupt and the main loop.
pub const RX_BUFFER_SIZE: usize = 128;
