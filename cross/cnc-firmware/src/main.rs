#![no_std]
#![no_main]

mod board;
mod buffered_tx;
mod interrupts;
mod stepper;
mod systick;

// pick a panicking behavior
use panic_halt as _; // you can put a breakpoint on `rust_begin_unwind` to catch panics

use board::{Board, StepTimers};
use cnc_motion::{Controller, Settings};
use cnc_protocol::{AlarmCode, MachineState};
use cortex_m_rt::entry;
use embedded_hal::digital::{InputPin, OutputPin, PinState};
use gd32f1x0_hal::{pac, prelude::*, watchdog::FreeWatchdog};
use interrupts::Intake;
use stepper::Steppers;
use systick::SysTick;

const WATCHDOG_MILLIS: u32 = 1000;

/// Counter frequency of the step timers.
const STEP_TIMER_HZ: u32 = 1_000_000;

/// Write a `[MSG:...]` line to the given writer.
#[macro_export]
macro_rules! log {
    ($dst:expr, $($arg:tt)*) => (
        {
            let _ = ::cnc_protocol::Response::message_from_fmt(format_args!($($arg)*)).write_to($dst);
        }
    );
}

/// Calibration for the machine this is built for.
fn settings() -> Settings {
    Settings {
        steps_per_mm: [80.0, 80.0, 400.0, 10.0],
        max_rate: [3000.0, 3000.0, 600.0, 3600.0],
        timer_hz: STEP_TIMER_HZ,
        ..Settings::default()
    }
}

/// Whether the status LED should be lit: off when idle, on while running, and blinking for a
/// feed hold (slowly) or an alarm (quickly).
fn status_led(state: MachineState, millis: u32) -> PinState {
    let on = match state {
        MachineState::Idle => false,
        MachineState::Run => true,
        MachineState::Hold => millis % 1000 < 500,
        MachineState::Alarm => millis % 200 < 100,
    };
    PinState::from(on)
}

#[entry]
fn main() -> ! {
    let (Some(mut cp), Some(dp)) = (cortex_m::Peripherals::take(), pac::Peripherals::take())
    else {
        panic!("Peripherals already taken");
    };

    let mut rcu = dp.RCU.constrain();
    let mut flash = dp.FMC.constrain();
    let clocks = rcu.cfgr.sysclk(72.mhz()).freeze(&mut flash.ws);

    let mut watchdog = FreeWatchdog::new(dp.FWDGT);
    watchdog.start(WATCHDOG_MILLIS.ms());

    let systick = SysTick::start(cp.SYST, &clocks);

    let settings = settings();
    let mut board = Board::new(
        dp.GPIOA,
        dp.GPIOB,
        dp.USART0,
        StepTimers {
            timer0: dp.TIMER0,
            timer1: dp.TIMER1,
            timer2: dp.TIMER2,
            timer14: dp.TIMER14,
        },
        &mut cp.NVIC,
        &mut rcu.ahb,
        &mut rcu.apb1,
        &mut rcu.apb2,
        clocks,
        settings.timer_hz,
    );

    log!(
        &mut board.serial_writer,
        "System clock {} Hz",
        clocks.sysclk().0
    );

    let mut controller = match Controller::new(settings, Steppers) {
        Ok(controller) => controller,
        Err(e) => {
            log!(&mut board.serial_writer, "Invalid settings: {}", e);
            loop {
                watchdog.feed();
            }
        }
    };
    let _ = controller.startup(&mut board.serial_writer);

    let mut intake = Intake;
    let mut limit_was_pressed = false;
    loop {
        // The watchdog must be fed every second or so or the microcontroller will reset.
        watchdog.feed();

        if let Err(e) = controller.poll(&mut intake, &mut board.serial_writer) {
            log!(&mut board.serial_writer, "Write error {:?}", e);
        }

        // Raise the alarm once per press of a limit switch.
        let limit_pressed = board.limit_switch.is_low().unwrap_or(false);
        if limit_pressed && !limit_was_pressed && controller.state() != MachineState::Alarm {
            let _ = controller.alarm(AlarmCode::HardLimit, &mut board.serial_writer);
        }
        limit_was_pressed = limit_pressed;

        let _ = board
            .status_led
            .set_state(status_led(controller.state(), systick.millis_since_start()));
    }
}
