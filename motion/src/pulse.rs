use crate::axis::Direction;
use cnc_protocol::{Axis, AXIS_COUNT};

/// Compare values for one axis timer.
///
/// The step output rises when the counter reaches `rising` and falls at `falling`, and the counter
/// wraps at `period`. The bookkeeping interrupt runs on the falling compare.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PulseTiming {
    pub period: u32,
    pub rising: u32,
    pub falling: u32,
}

impl PulseTiming {
    /// Timing for a period with the given pulse width. The period must already be clamped.
    pub fn new(period: u32, pulse_width: u32) -> Self {
        Self {
            period,
            rising: pulse_width,
            falling: period.saturating_sub(pulse_width),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.rising < self.falling && self.falling < self.period
    }

    /// Pushes the compare values apart if they are out of order, so the step output always gets a
    /// rising edge before its falling edge.
    pub fn sanitized(self) -> Self {
        if self.is_valid() {
            return self;
        }
        let rising = self.rising.max(1);
        let falling = self.falling.max(rising + 1);
        let period = self.period.max(falling + 1);
        Self {
            period,
            rising,
            falling,
        }
    }
}

/// A pulse train for one axis.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct AxisMove {
    pub timing: PulseTiming,
    pub steps: u32,
    pub direction: Direction,
    /// The axis velocity in mm/min this train was timed for, for reporting.
    pub velocity: f32,
}

/// The timers which turn pulse trains into step signals.
///
/// Implemented by the firmware on top of the hardware timers, and by
/// [`Simulator`](crate::sim::Simulator) for tests.
pub trait PulseGenerator {
    /// Load a pulse train for the axis without starting it. Any train already loaded is replaced.
    fn configure(&mut self, axis: Axis, axis_move: &AxisMove);

    /// Start the loaded pulse train, or continue it after [`disable`](Self::disable).
    fn enable(&mut self, axis: Axis);

    /// Stop the timer with the step output low, keeping the remaining steps. Does nothing if the
    /// axis is already disabled.
    fn disable(&mut self, axis: Axis);

    /// Stop the timer and discard the remaining steps.
    fn abort(&mut self, axis: Axis);

    /// Whether the axis still has steps left in its pulse train.
    fn is_busy(&self, axis: Axis) -> bool;

    /// The position of every axis in steps, all read at the same moment.
    fn positions(&self) -> [i32; AXIS_COUNT];
}
