use crate::axis::AxisMask;
use crate::ring::{Full, Ring};
use crate::settings::Settings;
use cnc_protocol::{Axis, ProtocolError, AXIS_COUNT};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MotionMode {
    /// `G0`: each axis as fast as it may go.
    Rapid,
    /// `G1`: a straight line at the programmed feed rate.
    Linear,
}

impl Default for MotionMode {
    fn default() -> Self {
        Self::Rapid
    }
}

/// One straight move, queued for the planner. Blocks are never changed once built.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct MotionBlock {
    target: [f32; AXIS_COUNT],
    target_steps: [i32; AXIS_COUNT],
    feed_rate: f32,
    mode: MotionMode,
    steps: [u32; AXIS_COUNT],
    directions: AxisMask,
    distance: f32,
}

impl MotionBlock {
    /// Build a block moving from `start` (in steps) to `target` (in mm).
    ///
    /// `feed_rate` is in mm/min and is ignored for rapid moves. Fails with `NumberOverflow` if the
    /// target or the distance to it can't be counted in steps.
    pub fn new(
        start: [i32; AXIS_COUNT],
        target: [f32; AXIS_COUNT],
        feed_rate: f32,
        mode: MotionMode,
        settings: &Settings,
    ) -> Result<Self, ProtocolError> {
        let mut block = Self {
            target,
            feed_rate,
            mode,
            ..Self::default()
        };
        let mut distance_squared = 0.0;
        for axis in Axis::ALL {
            let i = axis.index();
            let target_steps = settings
                .checked_mm_to_steps(axis, target[i])
                .ok_or(ProtocolError::NumberOverflow)?;
            let delta = target_steps
                .checked_sub(start[i])
                .ok_or(ProtocolError::NumberOverflow)?;
            block.target_steps[i] = target_steps;
            block.steps[i] = delta.unsigned_abs();
            if delta < 0 {
                block.directions |= AxisMask::of(axis);
            }
            let delta_mm = settings.steps_to_mm(axis, delta);
            distance_squared += delta_mm * delta_mm;
        }
        block.distance = libm::sqrtf(distance_squared);
        Ok(block)
    }

    /// Absolute machine position in mm at the end of the move.
    pub fn target(&self) -> [f32; AXIS_COUNT] {
        self.target
    }

    /// Absolute machine position in steps at the end of the move.
    pub fn target_steps(&self) -> [i32; AXIS_COUNT] {
        self.target_steps
    }

    pub fn feed_rate(&self) -> f32 {
        self.feed_rate
    }

    pub fn mode(&self) -> MotionMode {
        self.mode
    }

    pub fn steps(&self, axis: Axis) -> u32 {
        self.steps[axis.index()]
    }

    /// Axes which move in the negative direction.
    pub fn directions(&self) -> AxisMask {
        self.directions
    }

    /// Length of the move in mm.
    pub fn distance(&self) -> f32 {
        self.distance
    }

    /// Whether no axis moves at all.
    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(|&steps| steps == 0)
    }
}

/// The queue of blocks between the interpreter and the planner.
///
/// The interpreter is the only thing which pushes, and the planner the only thing which pops. The
/// block at the head is the one executing, and stays in the buffer until it is retired.
pub struct BlockBuffer<const SIZE: usize> {
    ring: Ring<MotionBlock, SIZE>,
}

impl<const SIZE: usize> Default for BlockBuffer<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> BlockBuffer<SIZE> {
    pub fn new() -> Self {
        Self {
            ring: Ring::default(),
        }
    }

    pub fn push(&mut self, block: MotionBlock) -> Result<(), Full<MotionBlock>> {
        self.ring.push(block)
    }

    /// The oldest block, which is executing or about to.
    pub fn peek_head(&self) -> Option<&MotionBlock> {
        self.ring.peek()
    }

    /// Retire the oldest block.
    pub fn pop_head(&mut self) -> Option<MotionBlock> {
        self.ring.pop()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    pub fn capacity(&self) -> usize {
        SIZE
    }

    pub fn clear(&mut self) {
        self.ring.clear()
    }
}
