use crate::pulse::{AxisMove, PulseTiming};
use bitflags::bitflags;
use cnc_protocol::Axis;

bitflags! {
    /// A set of axes.
    #[derive(Default)]
    pub struct AxisMask: u8 {
        const X = 0b0001;
        const Y = 0b0010;
        const Z = 0b0100;
        const A = 0b1000;
    }
}

impl AxisMask {
    pub fn of(axis: Axis) -> Self {
        Self::from_bits_truncate(1 << axis.index())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Positive,
    Negative,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Positive
    }
}

impl Direction {
    fn delta(self) -> i32 {
        match self {
            Self::Positive => 1,
            Self::Negative => -1,
        }
    }
}

/// What happened on a falling compare.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PulseEvent {
    /// One step was taken and more remain.
    Stepped,
    /// The last step of the train was taken. The timer should be stopped.
    TrainComplete,
    /// The axis wasn't running, so nothing changed.
    Idle,
}

/// Step bookkeeping for one axis.
///
/// `position` is only changed by [`on_pulse`](Self::on_pulse), which runs in the axis timer's
/// interrupt on the firmware.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisState {
    position: i32,
    remaining: u32,
    direction: Direction,
    enabled: bool,
    timing: PulseTiming,
    velocity: f32,
}

impl Default for AxisState {
    fn default() -> Self {
        Self::new()
    }
}

impl AxisState {
    pub const fn new() -> Self {
        Self {
            position: 0,
            remaining: 0,
            direction: Direction::Positive,
            enabled: false,
            timing: PulseTiming {
                period: 0,
                rising: 0,
                falling: 0,
            },
            velocity: 0.0,
        }
    }

    /// Load a new pulse train, disabled.
    pub fn load(&mut self, axis_move: &AxisMove) {
        debug_assert!(
            axis_move.steps == 0 || axis_move.timing.is_valid(),
            "falling compare must come after rising compare: {:?}",
            axis_move.timing
        );
        self.timing = axis_move.timing.sanitized();
        self.remaining = axis_move.steps;
        self.direction = axis_move.direction;
        self.velocity = axis_move.velocity;
        self.enabled = false;
    }

    /// Account for one step pulse. Called on every falling compare.
    pub fn on_pulse(&mut self) -> PulseEvent {
        if !self.enabled || self.remaining == 0 {
            return PulseEvent::Idle;
        }
        self.remaining -= 1;
        self.position += self.direction.delta();
        if self.remaining == 0 {
            self.enabled = false;
            PulseEvent::TrainComplete
        } else {
            PulseEvent::Stepped
        }
    }

    /// Enable or disable the pulse train. An axis with no remaining steps is never enabled.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled && self.remaining > 0;
    }

    /// Stop and forget the rest of the current train.
    pub fn abort(&mut self) {
        self.enabled = false;
        self.remaining = 0;
        self.velocity = 0.0;
    }

    pub fn is_busy(&self) -> bool {
        self.remaining > 0
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn timing(&self) -> PulseTiming {
        self.timing
    }

    /// Velocity of the loaded train in mm/min.
    pub fn velocity(&self) -> f32 {
        self.velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train(steps: u32, direction: Direction) -> AxisMove {
        AxisMove {
            timing: PulseTiming::new(100, 10),
            steps,
            direction,
            velocity: 60.0,
        }
    }

    #[test]
    fn mask_of_axis() {
        assert_eq!(AxisMask::of(Axis::X), AxisMask::X);
        assert_eq!(AxisMask::of(Axis::A), AxisMask::A);
        assert!(AxisMask::default().is_empty());
    }

    #[test]
    fn counts_steps_in_direction() {
        let mut state = AxisState::new();
        state.load(&train(3, Direction::Negative));
        assert_eq!(state.on_pulse(), PulseEvent::Idle);
        state.set_enabled(true);
        assert_eq!(state.on_pulse(), PulseEvent::Stepped);
        assert_eq!(state.on_pulse(), PulseEvent::Stepped);
        assert_eq!(state.on_pulse(), PulseEvent::TrainComplete);
        assert_eq!(state.on_pulse(), PulseEvent::Idle);
        assert_eq!(state.position(), -3);
        assert!(!state.is_busy());
        assert!(!state.is_enabled());
    }

    #[test]
    fn disable_keeps_remaining_steps() {
        let mut state = AxisState::new();
        state.load(&train(5, Direction::Positive));
        state.set_enabled(true);
        state.on_pulse();
        state.set_enabled(false);
        assert_eq!(state.on_pulse(), PulseEvent::Idle);
        assert_eq!(state.remaining(), 4);
        assert!(state.is_busy());
        state.set_enabled(true);
        assert_eq!(state.on_pulse(), PulseEvent::Stepped);
        assert_eq!(state.position(), 2);
    }

    #[test]
    fn disable_twice_changes_nothing() {
        let mut state = AxisState::new();
        state.load(&train(5, Direction::Positive));
        state.set_enabled(false);
        let before = state.clone();
        state.set_enabled(false);
        assert_eq!(state, before);
    }

    #[test]
    fn empty_train_is_never_enabled() {
        let mut state = AxisState::new();
        state.load(&train(0, Direction::Positive));
        state.set_enabled(true);
        assert!(!state.is_enabled());
    }

    #[test]
    fn abort_discards_steps() {
        let mut state = AxisState::new();
        state.load(&train(5, Direction::Positive));
        state.set_enabled(true);
        state.on_pulse();
        state.abort();
        assert!(!state.is_busy());
        assert_eq!(state.position(), 1);
        assert_eq!(state.velocity(), 0.0);
    }
}
