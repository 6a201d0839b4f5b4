use crate::buffered_tx::BufferState;
use crate::stepper::AxisStepper;
use cnc_motion::{ByteSource, RealtimeFlags, SerialIntake, RX_BUFFER_SIZE};
use core::cell::RefCell;
use cortex_m::interrupt::{free, Mutex};
use embedded_io::{Read, ReadReady};
#[cfg(feature = "four-axis")]
use gd32f1x0_hal::{
    gpio::gpiob::{PB10, PB11},
    pac::TIMER0,
};
use gd32f1x0_hal::{
    gpio::{
        gpiob::{PB0, PB1, PB4, PB5, PB8, PB9},
        Output, PushPull,
    },
    pac::{interrupt, TIMER1, TIMER14, TIMER2, USART0},
    serial::{Rx, Tx},
};

pub type XStepper = AxisStepper<TIMER2, PB0<Output<PushPull>>, PB1<Output<PushPull>>>;
pub type YStepper = AxisStepper<TIMER14, PB4<Output<PushPull>>, PB5<Output<PushPull>>>;
pub type ZStepper = AxisStepper<TIMER1, PB8<Output<PushPull>>, PB9<Output<PushPull>>>;
#[cfg(feature = "four-axis")]
pub type AStepper = AxisStepper<TIMER0, PB10<Output<PushPull>>, PB11<Output<PushPull>>>;

pub static X_STEPPER: Mutex<RefCell<Option<XStepper>>> = Mutex::new(RefCell::new(None));
pub static Y_STEPPER: Mutex<RefCell<Option<YStepper>>> = Mutex::new(RefCell::new(None));
pub static Z_STEPPER: Mutex<RefCell<Option<ZStepper>>> = Mutex::new(RefCell::new(None));
#[cfg(feature = "four-axis")]
pub static A_STEPPER: Mutex<RefCell<Option<AStepper>>> = Mutex::new(RefCell::new(None));

pub static SERIAL_RX: Mutex<RefCell<Option<Rx<USART0>>>> = Mutex::new(RefCell::new(None));
pub static SERIAL_BUFFER: Mutex<RefCell<BufferState<Tx<USART0>>>> =
    Mutex::new(RefCell::new(BufferState::new()));
static INTAKE: Mutex<RefCell<SerialIntake<RX_BUFFER_SIZE>>> =
    Mutex::new(RefCell::new(SerialIntake::new()));

/// Run `$body` with the stepper for `$axis` bound to `$stepper`, inside the given critical
/// section. Evaluates to `None` if the axis isn't set up.
macro_rules! with_stepper {
    ($cs:expr, $axis:expr, |$stepper:ident| $body:expr) => {
        match $axis {
            ::cnc_protocol::Axis::X => $crate::interrupts::X_STEPPER
                .borrow($cs)
                .borrow_mut()
                .as_mut()
                .map(|$stepper| $body),
            ::cnc_protocol::Axis::Y => $crate::interrupts::Y_STEPPER
                .borrow($cs)
                .borrow_mut()
                .as_mut()
                .map(|$stepper| $body),
            ::cnc_protocol::Axis::Z => $crate::interrupts::Z_STEPPER
                .borrow($cs)
                .borrow_mut()
                .as_mut()
                .map(|$stepper| $body),
            #[cfg(feature = "four-axis")]
            ::cnc_protocol::Axis::A => $crate::interrupts::A_STEPPER
                .borrow($cs)
                .borrow_mut()
                .as_mut()
                .map(|$stepper| $body),
            #[cfg(not(feature = "four-axis"))]
            ::cnc_protocol::Axis::A => None,
        }
    };
}
pub(crate) use with_stepper;

#[interrupt]
fn USART0() {
    free(|cs| {
        if let Some(rx) = &mut *SERIAL_RX.borrow(cs).borrow_mut() {
            let intake = &mut *INTAKE.borrow(cs).borrow_mut();
            let mut byte = [0];
            while let Ok(true) = rx.read_ready() {
                match rx.read(&mut byte) {
                    Ok(1) => intake.receive(byte[0]),
                    // Framing and overrun errors lose the byte. The line it was part of will fail
                    // to parse.
                    _ => break,
                }
            }
        }
        SERIAL_BUFFER.borrow(cs).borrow_mut().try_write();
    })
}

#[interrupt]
fn TIMER2() {
    free(|cs| {
        if let Some(stepper) = &mut *X_STEPPER.borrow(cs).borrow_mut() {
            stepper.on_interrupt();
        }
    })
}

#[interrupt]
fn TIMER14() {
    free(|cs| {
        if let Some(stepper) = &mut *Y_STEPPER.borrow(cs).borrow_mut() {
            stepper.on_interrupt();
        }
    })
}

#[interrupt]
fn TIMER1() {
    free(|cs| {
        if let Some(stepper) = &mut *Z_STEPPER.borrow(cs).borrow_mut() {
            stepper.on_interrupt();
        }
    })
}

#[cfg(feature = "four-axis")]
#[interrupt]
fn TIMER0_CHANNEL() {
    free(|cs| {
        if let Some(stepper) = &mut *A_STEPPER.borrow(cs).borrow_mut() {
            stepper.on_interrupt();
        }
    })
}

/// The main loop's side of the receive buffer filled by the `USART0` interrupt.
pub struct Intake;

impl ByteSource for Intake {
    fn take_realtime(&mut self) -> RealtimeFlags {
        free(|cs| INTAKE.borrow(cs).borrow_mut().take_realtime())
    }

    fn read_byte(&mut self) -> Option<u8> {
        free(|cs| INTAKE.borrow(cs).borrow_mut().read_byte())
    }

    fn take_overflow(&mut self) -> bool {
        free(|cs| INTAKE.borrow(cs).borrow_mut().take_overflow())
    }

    fn discard(&mut self) {
        free(|cs| INTAKE.borrow(cs).borrow_mut().discard())
    }
}
