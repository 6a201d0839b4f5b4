use crate::block::{BlockBuffer, MotionBlock, MotionMode};
use crate::settings::Settings;
use cnc_protocol::{Axis, ProtocolError, Word, Words, AXIS_COUNT};
use core::fmt::{self, Display, Formatter};
use log::trace;

const MM_PER_INCH: f32 = 25.4;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Units {
    /// `G21`
    Millimetres,
    /// `G20`
    Inches,
}

impl Units {
    fn to_mm(self, value: f32) -> f32 {
        match self {
            Self::Millimetres => value,
            Self::Inches => value * MM_PER_INCH,
        }
    }

    fn from_mm(self, value: f32) -> f32 {
        match self {
            Self::Millimetres => value,
            Self::Inches => value / MM_PER_INCH,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DistanceMode {
    /// `G90`: axis words are machine positions.
    Absolute,
    /// `G91`: axis words are offsets from the current position.
    Incremental,
}

/// The sticky parser state, which carries over from one line to the next.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ModalState {
    pub units: Units,
    pub distance: DistanceMode,
    pub motion: MotionMode,
    /// Feed rate in mm/min, if one has been set.
    pub feed_rate: Option<f32>,
}

impl Default for ModalState {
    fn default() -> Self {
        Self {
            units: Units::Millimetres,
            distance: DistanceMode::Absolute,
            motion: MotionMode::Rapid,
            feed_rate: None,
        }
    }
}

/// Formats as the body of a `$G` report, e.g. `G1 G21 G90 F100`.
impl Display for ModalState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let motion = match self.motion {
            MotionMode::Rapid => 0,
            MotionMode::Linear => 1,
        };
        let units = match self.units {
            Units::Inches => 20,
            Units::Millimetres => 21,
        };
        let distance = match self.distance {
            DistanceMode::Absolute => 90,
            DistanceMode::Incremental => 91,
        };
        let feed_rate = self.units.from_mm(self.feed_rate.unwrap_or(0.0));
        write!(f, "G{} G{} G{} F{}", motion, units, distance, feed_rate)
    }
}

/// The words of one line, checked for repeats and conflicts but not yet applied.
#[derive(Debug, Default)]
struct ParsedLine {
    motion: Option<MotionMode>,
    units: Option<Units>,
    distance: Option<DistanceMode>,
    feed_rate: Option<f32>,
    axes: [Option<f32>; AXIS_COUNT],
}

fn set_modal<T>(slot: &mut Option<T>, value: T) -> Result<(), ProtocolError> {
    if slot.is_some() {
        return Err(ProtocolError::ModalGroupViolation);
    }
    *slot = Some(value);
    Ok(())
}

impl ParsedLine {
    fn parse(line: &[u8]) -> Result<Self, ProtocolError> {
        let mut parsed = Self::default();
        for word in Words::new(line) {
            parsed.add(word?)?;
        }
        Ok(parsed)
    }

    fn add(&mut self, word: Word) -> Result<(), ProtocolError> {
        match word.letter {
            b'G' => match word.code() {
                Some(0) => set_modal(&mut self.motion, MotionMode::Rapid),
                Some(1) => set_modal(&mut self.motion, MotionMode::Linear),
                Some(20) => set_modal(&mut self.units, Units::Inches),
                Some(21) => set_modal(&mut self.units, Units::Millimetres),
                Some(90) => set_modal(&mut self.distance, DistanceMode::Absolute),
                Some(91) => set_modal(&mut self.distance, DistanceMode::Incremental),
                _ => Err(ProtocolError::UnsupportedCommand('G')),
            },
            b'F' => {
                if self.feed_rate.is_some() {
                    return Err(ProtocolError::RepeatedWord('F'));
                }
                if !(word.value > 0.0) {
                    return Err(ProtocolError::NegativeValue);
                }
                self.feed_rate = Some(word.value);
                Ok(())
            }
            // Line numbers are accepted but mean nothing.
            b'N' => Ok(()),
            letter => {
                let axis = Axis::parse(letter)
                    .ok_or_else(|| ProtocolError::UnsupportedCommand(word.letter_char()))?;
                let slot = &mut self.axes[axis.index()];
                if slot.is_some() {
                    return Err(ProtocolError::RepeatedWord(word.letter_char()));
                }
                *slot = Some(word.value);
                Ok(())
            }
        }
    }

    fn has_axes(&self) -> bool {
        self.axes.iter().any(Option::is_some)
    }

    /// Apply the mode words to the given modal state.
    fn apply_modes(&self, modal: &mut ModalState) {
        if let Some(units) = self.units {
            modal.units = units;
        }
        if let Some(distance) = self.distance {
            modal.distance = distance;
        }
        if let Some(motion) = self.motion {
            modal.motion = motion;
        }
        if let Some(feed_rate) = self.feed_rate {
            modal.feed_rate = Some(modal.units.to_mm(feed_rate));
        }
    }

    /// The machine position in mm which the axis words move to.
    fn target(
        &self,
        position: [f32; AXIS_COUNT],
        modal: &ModalState,
    ) -> Result<[f32; AXIS_COUNT], ProtocolError> {
        let mut target = position;
        for (target, value) in target.iter_mut().zip(&self.axes) {
            if let Some(value) = value {
                let mm = modal.units.to_mm(*value);
                *target = match modal.distance {
                    DistanceMode::Absolute => mm,
                    DistanceMode::Incremental => *target + mm,
                };
                if !target.is_finite() {
                    return Err(ProtocolError::NumberOverflow);
                }
            }
        }
        Ok(target)
    }
}

/// Turns command lines into motion blocks.
///
/// Tracks the modal state and the position the machine will be at once every queued block has
/// run. Nothing is changed by a line which fails, or which can't be queued yet.
#[derive(Debug, Default)]
pub struct Interpreter {
    modal: ModalState,
    /// Planned machine position in mm.
    position: [f32; AXIS_COUNT],
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one G-code line.
    ///
    /// Returns `WouldBlock` if the line has a move but the buffer is full. The line should be tried
    /// again once there is space.
    pub fn execute<const N: usize>(
        &mut self,
        line: &[u8],
        buffer: &mut BlockBuffer<N>,
        settings: &Settings,
    ) -> nb::Result<(), ProtocolError> {
        let parsed = ParsedLine::parse(line)?;
        let mut modal = self.modal;
        parsed.apply_modes(&mut modal);

        if parsed.has_axes() {
            let feed_rate = match modal.motion {
                MotionMode::Linear => modal.feed_rate.ok_or(ProtocolError::UndefinedFeedRate)?,
                MotionMode::Rapid => modal.feed_rate.unwrap_or(0.0),
            };
            let target = parsed.target(self.position, &modal)?;
            self.queue(target, feed_rate, modal.motion, buffer, settings)?;
        }
        self.modal = modal;
        Ok(())
    }

    /// Run the words of a `$J=` jog line.
    ///
    /// A jog is a single linear move. Units, distance mode and feed rate words apply only to it and
    /// the modal state is left alone.
    pub fn jog<const N: usize>(
        &mut self,
        words: &[u8],
        buffer: &mut BlockBuffer<N>,
        settings: &Settings,
    ) -> nb::Result<(), ProtocolError> {
        let parsed = ParsedLine::parse(words).map_err(|e| match e {
            ProtocolError::UnsupportedCommand(_) | ProtocolError::ModalGroupViolation => {
                ProtocolError::InvalidJog
            }
            e => e,
        })?;
        if parsed.motion.is_some() || !parsed.has_axes() {
            return Err(ProtocolError::InvalidJog.into());
        }
        let mut modal = ModalState {
            feed_rate: None,
            ..self.modal
        };
        parsed.apply_modes(&mut modal);
        let feed_rate = modal.feed_rate.ok_or(ProtocolError::InvalidJog)?;
        let target = parsed.target(self.position, &modal)?;
        self.queue(target, feed_rate, MotionMode::Linear, buffer, settings)
    }

    fn queue<const N: usize>(
        &mut self,
        target: [f32; AXIS_COUNT],
        feed_rate: f32,
        mode: MotionMode,
        buffer: &mut BlockBuffer<N>,
        settings: &Settings,
    ) -> nb::Result<(), ProtocolError> {
        let block = MotionBlock::new(
            self.position_steps(settings),
            target,
            feed_rate,
            mode,
            settings,
        )?;
        if block.is_empty() {
            trace!("Move to {:?} has no steps", target);
        } else {
            buffer.push(block).map_err(|_| nb::Error::WouldBlock)?;
        }
        self.position = target;
        Ok(())
    }

    fn position_steps(&self, settings: &Settings) -> [i32; AXIS_COUNT] {
        Axis::ALL.map(|axis| settings.mm_to_steps(axis, self.position[axis.index()]))
    }

    /// Set the planned position to where the axes actually are, after motion was aborted.
    pub fn sync_position(&mut self, steps: [i32; AXIS_COUNT], settings: &Settings) {
        self.position = Axis::ALL.map(|axis| settings.steps_to_mm(axis, steps[axis.index()]));
    }

    /// Back to the power-on modal state, at the given position.
    pub fn reset(&mut self, steps: [i32; AXIS_COUNT], settings: &Settings) {
        self.modal = ModalState::default();
        self.sync_position(steps, settings);
    }

    pub fn modal(&self) -> &ModalState {
        &self.modal
    }

    /// The position in mm once every queued block has run.
    pub fn position(&self) -> [f32; AXIS_COUNT] {
        self.position
    }
}
