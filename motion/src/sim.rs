//! A pulse generator which runs the step bookkeeping against simulated time, for testing without
//! hardware.

use crate::axis::{AxisState, PulseEvent};
use crate::pulse::{AxisMove, PulseGenerator};
use cnc_protocol::{Axis, AXIS_COUNT};

#[derive(Debug, Default)]
pub struct Simulator {
    axes: [AxisState; AXIS_COUNT],
    /// The counter value of each axis timer.
    counters: [u32; AXIS_COUNT],
}

impl Simulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(&self, axis: Axis) -> &AxisState {
        &self.axes[axis.index()]
    }

    /// Let the given number of timer ticks pass, taking a step on every falling compare of every
    /// enabled axis.
    pub fn advance(&mut self, ticks: u32) {
        for (state, counter) in self.axes.iter_mut().zip(self.counters.iter_mut()) {
            let mut ticks = ticks;
            while state.is_enabled() {
                let timing = state.timing();
                let until_falling = if *counter < timing.falling {
                    timing.falling - *counter
                } else {
                    timing.period - *counter + timing.falling
                };
                if ticks < until_falling {
                    *counter = (*counter + ticks) % timing.period;
                    break;
                }
                ticks -= until_falling;
                *counter = timing.falling;
                state.on_pulse();
            }
        }
    }

    /// Run until no axis is enabled.
    pub fn run_to_completion(&mut self) {
        while self.axes.iter().any(AxisState::is_enabled) {
            self.advance(u16::MAX as u32);
        }
    }

    /// Fire one falling compare on the axis straight away, as if its timer interrupt ran.
    pub fn pulse(&mut self, axis: Axis) -> PulseEvent {
        self.axes[axis.index()].on_pulse()
    }
}

impl PulseGenerator for Simulator {
    fn configure(&mut self, axis: Axis, axis_move: &AxisMove) {
        self.axes[axis.index()].load(axis_move);
        self.counters[axis.index()] = 0;
    }

    fn enable(&mut self, axis: Axis) {
        self.axes[axis.index()].set_enabled(true);
    }

    fn disable(&mut self, axis: Axis) {
        self.axes[axis.index()].set_enabled(false);
    }

    fn abort(&mut self, axis: Axis) {
        self.axes[axis.index()].abort();
        self.counters[axis.index()] = 0;
    }

    fn is_busy(&self, axis: Axis) -> bool {
        self.axes[axis.index()].is_busy()
    }

    fn positions(&self) -> [i32; AXIS_COUNT] {
        Axis::ALL.map(|axis| self.axes[axis.index()].position())
    }
}
