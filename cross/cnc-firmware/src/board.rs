use crate::buffered_tx::{BufferedSerialWriter, Listenable};
#[cfg(feature = "four-axis")]
use crate::interrupts::A_STEPPER;
use crate::interrupts::{SERIAL_BUFFER, SERIAL_RX, X_STEPPER, Y_STEPPER, Z_STEPPER};
use crate::stepper::AxisStepper;
use core::ops::Deref;
use cortex_m::{interrupt::free, peripheral::NVIC};
use gd32f1x0_hal::{
    gpio::{
        gpioa::PA15,
        gpiob::PB12,
        Input, Output, OutputMode, PullMode, PullUp, PushPull,
    },
    pac::{usart0, Interrupt, GPIOA, GPIOB, TIMER0, TIMER1, TIMER14, TIMER2, USART0},
    prelude::*,
    rcu::{Clocks, Enable, Reset, AHB, APB1, APB2},
    serial::{Config, Serial, Tx},
};

const USART_BAUD_RATE: u32 = 115200;

/// NVIC priority of the step timer interrupts. Lower numbers preempt higher ones, so a step is
/// never held up by serial traffic.
const AXIS_IRQ_PRIORITY: u8 = 0x10;
const USART_IRQ_PRIORITY: u8 = 0x40;

impl<USART: Deref<Target = usart0::RegisterBlock>> Listenable for Tx<USART> {
    fn listen(&mut self) {
        self.listen()
    }

    fn unlisten(&mut self) {
        self.unlisten()
    }
}

/// The timers shared by the steppers, one per axis.
pub struct StepTimers {
    pub timer0: TIMER0,
    pub timer1: TIMER1,
    pub timer2: TIMER2,
    pub timer14: TIMER14,
}

pub struct Board {
    pub serial_writer: BufferedSerialWriter<Tx<USART0>>,
    /// This will be low while any limit switch is pressed.
    pub limit_switch: PB12<Input<PullUp>>,
    pub status_led: PA15<Output<PushPull>>,
}

impl Board {
    /// Set up the serial port and the steppers, and hand the parts shared with interrupt handlers
    /// over to them.
    pub fn new(
        gpioa: GPIOA,
        gpiob: GPIOB,
        usart0: USART0,
        timers: StepTimers,
        nvic: &mut NVIC,
        ahb: &mut AHB,
        apb1: &mut APB1,
        apb2: &mut APB2,
        clocks: Clocks,
        timer_hz: u32,
    ) -> Board {
        let mut gpioa = gpioa.split(ahb);
        let mut gpiob = gpiob.split(ahb);

        // USART0
        let tx =
            gpiob
                .pb6
                .into_alternate(&mut gpiob.config, PullMode::Floating, OutputMode::PushPull);
        let rx =
            gpiob
                .pb7
                .into_alternate(&mut gpiob.config, PullMode::Floating, OutputMode::PushPull);
        let (mut serial_tx, mut serial_rx) = Serial::usart(
            usart0,
            (tx, rx),
            Config {
                baudrate: USART_BAUD_RATE.bps(),
                ..Config::default()
            },
            clocks,
            apb2,
        )
        .split();
        serial_tx.listen();
        serial_rx.listen();
        free(move |cs| {
            SERIAL_BUFFER.borrow(cs).borrow_mut().set_writer(serial_tx);
            SERIAL_RX.borrow(cs).replace(Some(serial_rx));
        });
        let serial_writer = BufferedSerialWriter::new(&SERIAL_BUFFER);

        // Steppers
        TIMER0::enable(apb2);
        TIMER0::reset(apb2);
        TIMER1::enable(apb1);
        TIMER1::reset(apb1);
        TIMER2::enable(apb1);
        TIMER2::reset(apb1);
        TIMER14::enable(apb2);
        TIMER14::reset(apb2);

        let x = AxisStepper::new(
            timers.timer2,
            gpiob.pb0.into_push_pull_output(&mut gpiob.config),
            gpiob.pb1.into_push_pull_output(&mut gpiob.config),
            &clocks,
            timer_hz,
        );
        let y = AxisStepper::new(
            timers.timer14,
            gpiob.pb4.into_push_pull_output(&mut gpiob.config),
            gpiob.pb5.into_push_pull_output(&mut gpiob.config),
            &clocks,
            timer_hz,
        );
        let z = AxisStepper::new(
            timers.timer1,
            gpiob.pb8.into_push_pull_output(&mut gpiob.config),
            gpiob.pb9.into_push_pull_output(&mut gpiob.config),
            &clocks,
            timer_hz,
        );
        #[cfg(feature = "four-axis")]
        let a = AxisStepper::new(
            timers.timer0,
            gpiob.pb10.into_push_pull_output(&mut gpiob.config),
            gpiob.pb11.into_push_pull_output(&mut gpiob.config),
            &clocks,
            timer_hz,
        );

        free(move |cs| {
            X_STEPPER.borrow(cs).replace(Some(x));
            Y_STEPPER.borrow(cs).replace(Some(y));
            Z_STEPPER.borrow(cs).replace(Some(z));
            #[cfg(feature = "four-axis")]
            A_STEPPER.borrow(cs).replace(Some(a));
        });

        unsafe {
            nvic.set_priority(Interrupt::TIMER2, AXIS_IRQ_PRIORITY);
            nvic.set_priority(Interrupt::TIMER14, AXIS_IRQ_PRIORITY);
            nvic.set_priority(Interrupt::TIMER1, AXIS_IRQ_PRIORITY);
            nvic.set_priority(Interrupt::USART0, USART_IRQ_PRIORITY);
            NVIC::unmask(Interrupt::TIMER2);
            NVIC::unmask(Interrupt::TIMER14);
            NVIC::unmask(Interrupt::TIMER1);
            NVIC::unmask(Interrupt::USART0);
        }
        #[cfg(feature = "four-axis")]
        unsafe {
            nvic.set_priority(Interrupt::TIMER0_CHANNEL, AXIS_IRQ_PRIORITY);
            NVIC::unmask(Interrupt::TIMER0_CHANNEL);
        }

        Board {
            serial_writer,
            limit_switch: gpiob.pb12.into_pull_up_input(&mut gpiob.config),
            status_led: gpioa.pa15.into_push_pull_output(&mut gpioa.config),
        }
    }
}
