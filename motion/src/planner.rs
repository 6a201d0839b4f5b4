use crate::axis::{AxisMask, Direction};
use crate::block::{BlockBuffer, MotionBlock, MotionMode};
use crate::pulse::{AxisMove, PulseGenerator, PulseTiming};
use crate::settings::Settings;
use cnc_protocol::{Axis, AXIS_COUNT};
use log::{debug, trace, warn};

/// Ticks kept free below the top of the timer counter, so that a compare value can never be
/// missed by the counter wrapping.
pub const COUNTER_MARGIN: u32 = 2;

/// Round a step period in timer ticks and clamp it to what the timers can produce.
pub fn clamp_period(period: f32, settings: &Settings) -> u32 {
    let max = settings.max_period();
    // Also catches NaN and infinity, from a zero velocity.
    if !(period < max as f32) {
        return max;
    }
    (libm::roundf(period) as u32).clamp(settings.min_period(), max)
}

/// Timer parameters for every axis of a block.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BlockTiming {
    /// The pulse train for each axis which moves.
    pub moves: [Option<AxisMove>; AXIS_COUNT],
    /// The feed rate along the path in mm/min, after limiting to the axis maximum rates.
    pub feed_rate: f32,
}

/// Work out the step period of every axis so that they all start and finish together.
///
/// Each axis gets the share of the feed rate matching its share of the distance. If that would take
/// any axis over its maximum rate the feed rate for the whole block is reduced, so the path stays
/// straight. Rapid moves run as fast as the slowest-limited axis allows.
pub fn block_timing(block: &MotionBlock, settings: &Settings) -> BlockTiming {
    let mut timing = BlockTiming::default();
    let distance = block.distance();
    if block.is_empty() || !(distance > 0.0) {
        return timing;
    }

    let mut feed_rate = match block.mode() {
        MotionMode::Linear => block.feed_rate(),
        MotionMode::Rapid => f32::INFINITY,
    };
    for axis in Axis::ALL {
        let axis_distance = settings.steps_to_mm(axis, block.steps(axis) as i32);
        if axis_distance > 0.0 {
            feed_rate = feed_rate.min(settings.max_rate[axis.index()] * distance / axis_distance);
        }
    }

    for axis in Axis::ALL {
        let steps = block.steps(axis);
        if steps == 0 {
            continue;
        }
        let i = axis.index();
        let velocity = feed_rate * settings.steps_to_mm(axis, steps as i32) / distance;
        // Ticks per step at 1 mm/min.
        let ticks_per_step = settings.timer_hz as f32 * 60.0 / settings.steps_per_mm[i];
        let period = clamp_period(ticks_per_step / velocity, settings);
        let direction = if block.directions().contains(AxisMask::of(axis)) {
            Direction::Negative
        } else {
            Direction::Positive
        };
        timing.moves[i] = Some(AxisMove {
            timing: PulseTiming::new(period, settings.pulse_width),
            steps,
            direction,
            velocity,
        });
    }
    timing.feed_rate = feed_rate;
    timing
}

#[derive(Copy, Clone, Debug)]
struct ActiveBlock {
    /// The axes with steps to take.
    axes: AxisMask,
    target_steps: [i32; AXIS_COUNT],
    feed_rate: f32,
}

/// What a call to [`Planner::service`] did.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Progress {
    /// A block finished and was removed from the buffer.
    pub retired: bool,
    /// A new block was handed to the pulse generator.
    pub started: bool,
}

/// Feeds blocks from the buffer to the pulse generator one at a time.
#[derive(Debug, Default)]
pub struct Planner {
    active: Option<ActiveBlock>,
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retire the executing block if every axis has finished, then start the next block if
    /// `start_allowed`.
    pub fn service<P: PulseGenerator, const N: usize>(
        &mut self,
        buffer: &mut BlockBuffer<N>,
        pulses: &mut P,
        settings: &Settings,
        start_allowed: bool,
    ) -> Progress {
        let mut progress = Progress::default();

        if let Some(active) = self.active {
            if axes(active.axes).any(|axis| pulses.is_busy(axis)) {
                return progress;
            }
            buffer.pop_head();
            self.active = None;
            progress.retired = true;
            let positions = pulses.positions();
            for axis in axes(active.axes) {
                let i = axis.index();
                if positions[i] != active.target_steps[i] {
                    warn!(
                        "Axis {:?} finished at {} steps rather than {}",
                        axis, positions[i], active.target_steps[i]
                    );
                }
            }
            trace!("Retired block, {} left", buffer.len());
        }

        if !start_allowed {
            return progress;
        }
        while let Some(&block) = buffer.peek_head() {
            let timing = block_timing(&block, settings);
            let mut moving = AxisMask::empty();
            for axis in Axis::ALL {
                if let Some(axis_move) = &timing.moves[axis.index()] {
                    pulses.configure(axis, axis_move);
                    moving |= AxisMask::of(axis);
                }
            }
            if moving.is_empty() {
                buffer.pop_head();
                continue;
            }
            // Start every axis as close together as possible, once they are all loaded.
            for axis in axes(moving) {
                pulses.enable(axis);
            }
            debug!(
                "Started block to {:?} at {} mm/min",
                block.target(),
                timing.feed_rate
            );
            self.active = Some(ActiveBlock {
                axes: moving,
                target_steps: block.target_steps(),
                feed_rate: timing.feed_rate,
            });
            progress.started = true;
            break;
        }
        progress
    }

    /// Pause the executing block. Its axes keep their remaining steps.
    pub fn hold<P: PulseGenerator>(&mut self, pulses: &mut P) {
        if let Some(active) = self.active {
            for axis in axes(active.axes) {
                pulses.disable(axis);
            }
        }
    }

    /// Continue a block paused by [`hold`](Self::hold).
    pub fn resume<P: PulseGenerator>(&mut self, pulses: &mut P) {
        if let Some(active) = self.active {
            for axis in axes(active.axes) {
                if pulses.is_busy(axis) {
                    pulses.enable(axis);
                }
            }
        }
    }

    /// Stop every axis immediately and forget the executing block. The caller is responsible for
    /// clearing the buffer.
    pub fn abort<P: PulseGenerator>(&mut self, pulses: &mut P) {
        for axis in Axis::ALL {
            pulses.abort(axis);
        }
        self.active = None;
    }

    pub fn is_executing(&self) -> bool {
        self.active.is_some()
    }

    /// The feed rate of the executing block in mm/min, or 0 if none is executing.
    pub fn active_feed_rate(&self) -> f32 {
        self.active.map_or(0.0, |active| active.feed_rate)
    }
}

fn axes(mask: AxisMask) -> impl Iterator<Item = Axis> {
    Axis::ALL
        .into_iter()
        .filter(move |&axis| mask.contains(AxisMask::of(axis)))
}
