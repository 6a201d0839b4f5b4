use crate::interrupts::with_stepper;
use cnc_motion::{AxisMove, AxisState, Direction, PulseEvent, PulseGenerator, PulseTiming};
use cnc_protocol::{Axis, AXIS_COUNT};
use core::convert::Infallible;
use cortex_m::interrupt::free;
use embedded_hal::digital::{OutputPin, PinState};
use gd32f1x0_hal::{
    pac::{TIMER0, TIMER1, TIMER14, TIMER2},
    rcu::Clocks,
};

/// Compare events seen by a step timer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CompareEvents {
    pub rising: bool,
    pub falling: bool,
}

/// Register access for a timer driving one axis in dual-compare mode.
///
/// Channel 0 compares at the rising edge of the step pulse and channel 1 at the falling edge, and
/// the counter wraps at the end of each period.
pub trait StepTimer {
    /// Set the prescaler so the counter runs at `timer_hz`, and enable both compare interrupts.
    /// The timer is left stopped.
    fn setup(&mut self, clocks: &Clocks, timer_hz: u32);

    /// Load a new period and compare values, with the counter back at zero.
    fn load(&mut self, timing: PulseTiming);

    fn start(&mut self);

    fn stop(&mut self);

    /// Which compare events have fired since the last call, clearing their flags.
    fn take_events(&mut self) -> CompareEvents;
}

macro_rules! step_timer {
    ($TIMER:ident, $pclk:ident, $bits:ty) => {
        impl StepTimer for $TIMER {
            fn setup(&mut self, clocks: &Clocks, timer_hz: u32) {
                // If pclk is prescaled from hclk, the frequency fed into the timers is doubled
                let prescaler = (clocks.$pclk().0 / timer_hz).saturating_sub(1) as u16;
                self.ctl0
                    .modify(|_, w| w.dir().up().ckdiv().div1().arse().enabled().cen().disabled());
                self.psc.write(|w| w.psc().bits(prescaler));
                // Load the prescaler straight away rather than at the next update.
                self.swevg.write(|w| w.upg().set_bit());
                self.intf.write(|w| unsafe { w.bits(0) });
                self.dmainten
                    .modify(|_, w| w.ch0ie().enabled().ch1ie().enabled());
            }

            fn load(&mut self, timing: PulseTiming) {
                self.car
                    .write(|w| w.car().bits((timing.period - 1) as $bits));
                self.ch0cv
                    .write(|w| w.ch0val().bits(timing.rising as $bits));
                self.ch1cv
                    .write(|w| w.ch1val().bits(timing.falling as $bits));
                self.swevg.write(|w| w.upg().set_bit());
                self.cnt.write(|w| w.cnt().bits(0));
                self.intf.write(|w| unsafe { w.bits(0) });
            }

            fn start(&mut self) {
                self.ctl0.modify(|_, w| w.cen().enabled());
            }

            fn stop(&mut self) {
                self.ctl0.modify(|_, w| w.cen().disabled());
            }

            fn take_events(&mut self) -> CompareEvents {
                let flags = self.intf.read();
                let events = CompareEvents {
                    rising: flags.ch0if().bit_is_set(),
                    falling: flags.ch1if().bit_is_set(),
                };
                self.intf
                    .modify(|_, w| w.ch0if().clear_bit().ch1if().clear_bit());
                events
            }
        }
    };
}

step_timer!(TIMER0, pclk2_tim, u16);
step_timer!(TIMER1, pclk1_tim, u32);
step_timer!(TIMER2, pclk1_tim, u16);
step_timer!(TIMER14, pclk2_tim, u16);

fn set_pin<P: OutputPin<Error = Infallible>>(pin: &mut P, state: PinState) {
    match pin.set_state(state) {
        Ok(()) => {}
        Err(e) => match e {},
    }
}

/// One axis: its timer, its step and direction outputs, and the step bookkeeping.
pub struct AxisStepper<T, S, D> {
    timer: T,
    step: S,
    direction: D,
    state: AxisState,
}

impl<T, S, D> AxisStepper<T, S, D>
where
    T: StepTimer,
    S: OutputPin<Error = Infallible>,
    D: OutputPin<Error = Infallible>,
{
    pub fn new(mut timer: T, mut step: S, direction: D, clocks: &Clocks, timer_hz: u32) -> Self {
        timer.setup(clocks, timer_hz);
        set_pin(&mut step, PinState::Low);
        Self {
            timer,
            step,
            direction,
            state: AxisState::new(),
        }
    }

    pub fn configure(&mut self, axis_move: &AxisMove) {
        self.stop();
        self.state.load(axis_move);
        let direction = match axis_move.direction {
            Direction::Positive => PinState::High,
            Direction::Negative => PinState::Low,
        };
        set_pin(&mut self.direction, direction);
        self.timer.load(self.state.timing());
    }

    pub fn enable(&mut self) {
        self.state.set_enabled(true);
        if self.state.is_enabled() {
            self.timer.start();
        }
    }

    pub fn disable(&mut self) {
        self.state.set_enabled(false);
        self.stop();
    }

    pub fn abort(&mut self) {
        self.state.abort();
        self.stop();
    }

    pub fn state(&self) -> &AxisState {
        &self.state
    }

    /// Handle the timer's compare interrupt.
    pub fn on_interrupt(&mut self) {
        let events = self.timer.take_events();
        if events.rising && self.state.is_enabled() {
            set_pin(&mut self.step, PinState::High);
        }
        if events.falling {
            set_pin(&mut self.step, PinState::Low);
            if self.state.on_pulse() == PulseEvent::TrainComplete {
                self.timer.stop();
            }
        }
    }

    fn stop(&mut self) {
        self.timer.stop();
        set_pin(&mut self.step, PinState::Low);
    }
}

/// The pulse generator seen by the controller. The axes themselves live in statics shared with
/// their timer interrupts, so every call here takes a short critical section.
pub struct Steppers;

impl PulseGenerator for Steppers {
    fn configure(&mut self, axis: Axis, axis_move: &AxisMove) {
        free(|cs| {
            with_stepper!(cs, axis, |stepper| stepper.configure(axis_move));
        });
    }

    fn enable(&mut self, axis: Axis) {
        free(|cs| {
            with_stepper!(cs, axis, |stepper| stepper.enable());
        });
    }

    fn disable(&mut self, axis: Axis) {
        free(|cs| {
            with_stepper!(cs, axis, |stepper| stepper.disable());
        });
    }

    fn abort(&mut self, axis: Axis) {
        free(|cs| {
            with_stepper!(cs, axis, |stepper| stepper.abort());
        });
    }

    fn is_busy(&self, axis: Axis) -> bool {
        free(|cs| with_stepper!(cs, axis, |stepper| stepper.state().is_busy())).unwrap_or(false)
    }

    fn positions(&self) -> [i32; AXIS_COUNT] {
        free(|cs| {
            Axis::ALL.map(|axis| {
                with_stepper!(cs, axis, |stepper| stepper.state().position()).unwrap_or(0)
            })
        })
    }
}
