use cnc_protocol::{Axis, AXIS_COUNT};

/// Calibration and hardware limits, read once at startup.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Steps per millimetre (or per degree for the rotary axis).
    pub steps_per_mm: [f32; AXIS_COUNT],
    /// The fastest each axis may move, in mm/min. Rapid moves run at these rates.
    pub max_rate: [f32; AXIS_COUNT],
    /// Frequency of the step timers' counters, after prescaling.
    pub timer_hz: u32,
    /// Width of the step pulse in timer ticks.
    pub pulse_width: u32,
    /// The smallest gap between the rising and falling compare values, in timer ticks. Must be
    /// greater than `pulse_width`.
    pub edge_margin: u32,
    /// The largest value the step timers' counters can hold.
    pub counter_max: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            steps_per_mm: [80.0, 80.0, 400.0, 10.0],
            max_rate: [3000.0, 3000.0, 600.0, 3600.0],
            timer_hz: 1_000_000,
            pulse_width: 10,
            edge_margin: 20,
            counter_max: u16::MAX as u32,
        }
    }
}

#[derive(displaydoc::Display, Debug, Copy, Clone, Eq, PartialEq)]
pub enum SettingsError {
    /// steps per mm for axis {0:?} must be positive
    StepsPerMm(Axis),
    /// max rate for axis {0:?} must be positive
    MaxRate(Axis),
    /// timer frequency must be positive
    TimerFrequency,
    /// pulse width must be positive
    PulseWidth,
    /// edge margin must be greater than the pulse width
    EdgeMargin,
    /// timer counter is too small for the pulse width and margin
    CounterMax,
}

#[cfg(feature = "std")]
impl std::error::Error for SettingsError {}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        for axis in Axis::ALL {
            let steps_per_mm = self.steps_per_mm[axis.index()];
            if !(steps_per_mm.is_finite() && steps_per_mm > 0.0) {
                return Err(SettingsError::StepsPerMm(axis));
            }
            let max_rate = self.max_rate[axis.index()];
            if !(max_rate.is_finite() && max_rate > 0.0) {
                return Err(SettingsError::MaxRate(axis));
            }
        }
        if self.timer_hz == 0 {
            return Err(SettingsError::TimerFrequency);
        }
        if self.pulse_width == 0 {
            return Err(SettingsError::PulseWidth);
        }
        if self.edge_margin <= self.pulse_width {
            return Err(SettingsError::EdgeMargin);
        }
        if self.counter_max <= self.min_period() + crate::planner::COUNTER_MARGIN {
            return Err(SettingsError::CounterMax);
        }
        Ok(())
    }

    /// The shortest step period the timers may be given.
    pub fn min_period(&self) -> u32 {
        self.pulse_width + self.edge_margin
    }

    /// The longest step period the timers may be given.
    pub fn max_period(&self) -> u32 {
        self.counter_max - crate::planner::COUNTER_MARGIN
    }

    /// Convert a position in millimetres to the nearest whole step.
    pub fn mm_to_steps(&self, axis: Axis, mm: f32) -> i32 {
        libm::roundf(mm * self.steps_per_mm[axis.index()]) as i32
    }

    /// Like [`mm_to_steps`](Self::mm_to_steps), but `None` if the position doesn't fit in an `i32`
    /// step count.
    pub fn checked_mm_to_steps(&self, axis: Axis, mm: f32) -> Option<i32> {
        let steps = libm::roundf(mm * self.steps_per_mm[axis.index()]);
        // `i32::MAX as f32` rounds up to 2^31, which is out of range.
        if steps >= i32::MIN as f32 && steps < i32::MAX as f32 {
            Some(steps as i32)
        } else {
            None
        }
    }

    pub fn steps_to_mm(&self, axis: Axis, steps: i32) -> f32 {
        steps as f32 / self.steps_per_mm[axis.index()]
    }

    /// The `$<id>=<value>` pairs shown by the `$$` report.
    pub fn entries(&self) -> impl Iterator<Item = (u16, f32)> + '_ {
        let pulse = core::iter::once((0, self.pulse_width as f32));
        let steps = Axis::ALL
            .into_iter()
            .map(move |axis| (100 + axis.index() as u16, self.steps_per_mm[axis.index()]));
        let rates = Axis::ALL
            .into_iter()
            .map(move |axis| (110 + axis.index() as u16, self.max_rate[axis.index()]));
        pulse.chain(steps).chain(rates)
    }
}
