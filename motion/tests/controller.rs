use cnc_motion::sim::Simulator;
use cnc_motion::{Controller, SerialIntake, Settings, RX_BUFFER_SIZE};
use cnc_protocol::{AlarmCode, MachineState, Response, StatusReport};
use embedded_io_adapters::std::FromStd;

/// Ticks for a 10 mm move along X at 600 mm/min with the default settings.
const TEN_MM_TICKS: u32 = 1_000_000;

/// A controller wired to a simulated serial port and simulated steppers.
struct Machine {
    controller: Controller<Simulator, 8>,
    intake: SerialIntake<RX_BUFFER_SIZE>,
    out: FromStd<Vec<u8>>,
}

impl Machine {
    fn new() -> Self {
        let _ = pretty_env_logger::try_init();
        let mut machine = Self {
            controller: Controller::new(Settings::default(), Simulator::new()).unwrap(),
            intake: SerialIntake::new(),
            out: FromStd::new(Vec::new()),
        };
        machine.controller.startup(&mut machine.out).unwrap();
        assert_eq!(machine.responses(), vec![Response::Welcome]);
        machine
    }

    fn send(&mut self, text: &str) {
        for byte in text.bytes() {
            self.intake.receive(byte);
        }
    }

    fn poll(&mut self) {
        self.controller
            .poll(&mut self.intake, &mut self.out)
            .unwrap();
    }

    /// Poll enough times for every line sent to be handled and the planner to catch up.
    fn settle(&mut self) {
        for _ in 0..20 {
            self.poll();
        }
    }

    /// Send a line and return everything printed in reply.
    fn command(&mut self, line: &str) -> Vec<Response> {
        self.send(line);
        self.send("\n");
        self.settle();
        self.responses()
    }

    fn advance(&mut self, ticks: u32) {
        self.controller.pulses_mut().advance(ticks);
        self.poll();
    }

    fn status(&mut self) -> StatusReport {
        self.send("?");
        self.poll();
        let statuses: Vec<StatusReport> = self
            .responses()
            .into_iter()
            .filter_map(|response| match response {
                Response::Status(status) => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses.len(), 1);
        statuses[0]
    }

    /// Take and parse everything written so far.
    fn responses(&mut self) -> Vec<Response> {
        let bytes = std::mem::take(self.out.inner_mut());
        let mut responses = vec![];
        let mut position = 0;
        while position < bytes.len() {
            match Response::parse(&bytes[position..]) {
                Ok((response, length)) => {
                    responses.push(response);
                    position += length;
                }
                Err(e) => panic!("Bad response {:?} in {:?}", e, String::from_utf8_lossy(&bytes)),
            }
        }
        responses
    }
}

#[test]
fn status_during_move_moves_forward() {
    let mut machine = Machine::new();
    assert_eq!(machine.command("G1X10F600"), vec![Response::Ok]);
    let status = machine.status();
    assert_eq!(status.state, MachineState::Run);
    assert_eq!(status.queued_blocks, 1);
    assert_eq!(status.buffer_capacity, 8);
    assert_eq!(status.feed_rate, 600.0);

    let mut last = 0.0;
    let mut seen_between = false;
    for _ in 0..25 {
        machine.advance(TEN_MM_TICKS / 20);
        let x = machine.status().machine_position[0];
        assert!(x >= last, "moved backwards from {} to {}", last, x);
        assert!(x <= 10.0);
        seen_between |= x > 0.0 && x < 10.0;
        last = x;
    }
    assert!(seen_between);

    let status = machine.status();
    assert_eq!(status.state, MachineState::Idle);
    assert_eq!(status.machine_position, [10.0, 0.0, 0.0, 0.0]);
    assert_eq!(status.queued_blocks, 0);
    assert_eq!(status.feed_rate, 0.0);
}

#[test]
fn full_buffer_delays_ok() {
    let mut machine = Machine::new();
    assert_eq!(machine.command("G91 G0"), vec![Response::Ok]);
    for _ in 0..12 {
        machine.send("X1\n");
    }
    machine.settle();
    assert_eq!(machine.responses(), vec![Response::Ok; 8]);
    assert!(machine.controller.is_pending());
    assert_eq!(machine.controller.queued_blocks(), 8);

    // Status queries are still answered while a line waits.
    assert_eq!(machine.status().queued_blocks, 8);

    // Finishing the first block makes room for exactly one more line.
    machine.controller.pulses_mut().run_to_completion();
    machine.poll();
    assert_eq!(machine.responses(), vec![Response::Ok]);
    assert_eq!(machine.controller.queued_blocks(), 8);

    for _ in 0..20 {
        machine.controller.pulses_mut().run_to_completion();
        machine.poll();
    }
    assert_eq!(machine.responses(), vec![Response::Ok; 3]);
    let status = machine.status();
    assert_eq!(status.state, MachineState::Idle);
    assert_eq!(status.machine_position[0], 12.0);
}

#[test]
fn reset_during_move_freezes_position() {
    let mut machine = Machine::new();
    machine.command("G1 X10 F600");
    machine.command("G1 X20");
    machine.advance(TEN_MM_TICKS / 4);
    let before = machine.status().machine_position;
    assert!(before[0] > 0.0 && before[0] < 10.0);

    machine.send("\x18");
    machine.poll();
    assert_eq!(
        machine.responses(),
        vec![Response::Alarm(3), Response::Welcome]
    );

    machine.advance(TEN_MM_TICKS);
    let status = machine.status();
    assert_eq!(status.state, MachineState::Idle);
    assert_eq!(status.queued_blocks, 0);
    assert_eq!(status.machine_position, before);

    // Modal state is back to its defaults, so there's no feed rate any more.
    assert_eq!(
        machine.command("$G"),
        vec![
            Response::feedback_from_fmt(format_args!("GC:G0 G21 G90 F0")),
            Response::Ok
        ]
    );
    assert_eq!(machine.command("G1 X10"), vec![Response::Error(22)]);

    // Moves carry on from where the axes stopped.
    assert_eq!(machine.command("G1 X10 F600"), vec![Response::Ok]);
    machine.controller.pulses_mut().run_to_completion();
    machine.settle();
    assert_eq!(machine.status().machine_position[0], 10.0);
}

#[test]
fn reset_drops_partial_line() {
    let mut machine = Machine::new();
    machine.send("G0 X5");
    machine.poll();
    machine.send("\x18");
    machine.poll();
    assert_eq!(machine.responses(), vec![Response::Welcome]);
    assert_eq!(machine.command("Y1"), vec![Response::Ok]);
    machine.controller.pulses_mut().run_to_completion();
    machine.settle();
    assert_eq!(machine.status().machine_position, [0.0, 1.0, 0.0, 0.0]);
}

#[test]
fn reset_when_held_or_idle_is_quiet() {
    let mut machine = Machine::new();
    machine.send("\x18");
    machine.poll();
    assert_eq!(machine.responses(), vec![Response::Welcome]);

    machine.command("G1 X10 F600");
    machine.advance(TEN_MM_TICKS / 4);
    machine.send("!");
    machine.poll();
    assert_eq!(machine.status().state, MachineState::Hold);
    machine.send("\x18");
    machine.poll();
    assert_eq!(machine.responses(), vec![Response::Welcome]);
    assert_eq!(machine.status().state, MachineState::Idle);
}

#[test]
fn receive_overflow_rejects_damaged_line() {
    let mut machine = Machine::new();
    let mut intake = SerialIntake::<8>::new();
    for &byte in b"G0X1\nX2\nX3\nX4\n" {
        intake.receive(byte);
    }
    for _ in 0..10 {
        machine.controller.poll(&mut intake, &mut machine.out).unwrap();
    }
    for &byte in b"Y5\n" {
        intake.receive(byte);
    }
    for _ in 0..10 {
        machine.controller.poll(&mut intake, &mut machine.out).unwrap();
    }
    // X3 lost its X, and its own terminator and everything after it was dropped until the main
    // loop caught up, so X4 and Y5 are part of the same damaged line.
    assert_eq!(
        machine.responses(),
        vec![Response::Ok, Response::Ok, Response::Error(11)]
    );

    for &byte in b"Y6\n" {
        intake.receive(byte);
    }
    machine.controller.poll(&mut intake, &mut machine.out).unwrap();
    assert_eq!(machine.responses(), vec![Response::Ok]);
    machine.controller.pulses_mut().run_to_completion();
    machine.settle();
    assert_eq!(machine.status().machine_position, [2.0, 6.0, 0.0, 0.0]);
}

/// A serial port that fails every write.
struct Unplugged;

impl embedded_io::ErrorType for Unplugged {
    type Error = embedded_io::ErrorKind;
}

impl embedded_io::Write for Unplugged {
    fn write(&mut self, _buffer: &[u8]) -> Result<usize, Self::Error> {
        Err(embedded_io::ErrorKind::BrokenPipe)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[test]
fn failed_report_finishes_line() {
    let mut machine = Machine::new();
    machine.send("$$\nG0X1\n");
    assert_eq!(
        machine.controller.poll(&mut machine.intake, &mut Unplugged),
        Err(embedded_io::ErrorKind::BrokenPipe)
    );
    machine.poll();
    assert_eq!(machine.responses(), vec![Response::Ok]);
}

#[test]
fn feed_hold_and_cycle_start() {
    let mut machine = Machine::new();
    machine.command("G1 X10 F600");
    machine.advance(TEN_MM_TICKS / 4);

    machine.send("!");
    machine.poll();
    let held = machine.status();
    assert_eq!(held.state, MachineState::Hold);
    machine.advance(TEN_MM_TICKS);
    assert_eq!(machine.status().machine_position, held.machine_position);

    machine.send("~");
    machine.poll();
    assert_eq!(machine.status().state, MachineState::Run);
    machine.advance(TEN_MM_TICKS);
    machine.settle();
    let status = machine.status();
    assert_eq!(status.state, MachineState::Idle);
    assert_eq!(status.machine_position[0], 10.0);
}

#[test]
fn alarm_locks_out_motion() {
    let mut machine = Machine::new();
    machine.command("G1 X10 F600");
    machine.advance(TEN_MM_TICKS / 2);
    machine
        .controller
        .alarm(AlarmCode::HardLimit, &mut machine.out)
        .unwrap();
    assert_eq!(
        machine.responses(),
        vec![
            Response::Alarm(1),
            Response::message_from_fmt(format_args!("Reset to continue"))
        ]
    );

    let stopped = machine.status();
    assert_eq!(stopped.state, MachineState::Alarm);
    assert_eq!(stopped.queued_blocks, 0);
    machine.advance(TEN_MM_TICKS);
    assert_eq!(machine.status().machine_position, stopped.machine_position);

    assert_eq!(machine.command("G0 X1"), vec![Response::Error(9)]);
    assert_eq!(machine.command("$J=X1F100"), vec![Response::Error(9)]);
    assert_eq!(
        machine.command("$I"),
        vec![
            Response::feedback_from_fmt(format_args!("VER:CncKite 0.1")),
            Response::Ok
        ]
    );

    machine.send("\x18");
    machine.poll();
    assert_eq!(machine.responses(), vec![Response::Welcome]);
    assert_eq!(machine.status().state, MachineState::Idle);
    assert_eq!(machine.command("G0 X1"), vec![Response::Ok]);
}

#[test]
fn errors_are_reported() {
    let mut machine = Machine::new();
    assert_eq!(machine.command("G2 X1 Y1"), vec![Response::Error(20)]);
    assert_eq!(machine.command("M3"), vec![Response::Error(20)]);
    assert_eq!(machine.command("G1 X1"), vec![Response::Error(22)]);
    assert_eq!(machine.command("$X"), vec![Response::Error(3)]);
    assert_eq!(machine.command("X1 X2"), vec![Response::Error(25)]);
    assert_eq!(
        machine.command(&format!("G0 X{}", "1".repeat(100))),
        vec![Response::Error(11)]
    );
    // Errors don't stop later lines from working.
    assert_eq!(machine.command("G0 X1"), vec![Response::Ok]);
}

#[test]
fn blank_lines_are_ignored() {
    let mut machine = Machine::new();
    machine.send("\r\n\n  \n");
    machine.settle();
    // A line of spaces isn't empty to the reader, so it gets its own ok.
    assert_eq!(machine.responses(), vec![Response::Ok]);
}

#[test]
fn system_reports() {
    let mut machine = Machine::new();
    let settings = machine.command("$$");
    assert_eq!(settings.len(), 10);
    assert_eq!(settings[1], Response::Setting { id: 100, value: 80.0 });
    assert_eq!(settings[9], Response::Ok);

    machine.command("G1 F100");
    assert_eq!(
        machine.command("$G"),
        vec![
            Response::feedback_from_fmt(format_args!("GC:G1 G21 G90 F100")),
            Response::Ok
        ]
    );

    let help = machine.command("$");
    assert!(matches!(help[0], Response::Feedback(_)));
    assert_eq!(help[1], Response::Ok);
}

#[test]
fn jog_leaves_modes_alone() {
    let mut machine = Machine::new();
    machine.command("G1 F100");
    assert_eq!(machine.command("$J=G91 X2 F300"), vec![Response::Ok]);
    assert_eq!(machine.status().feed_rate, 300.0);
    machine.controller.pulses_mut().run_to_completion();
    machine.settle();
    assert_eq!(machine.status().machine_position[0], 2.0);
    assert_eq!(
        machine.command("$G"),
        vec![
            Response::feedback_from_fmt(format_args!("GC:G1 G21 G90 F100")),
            Response::Ok
        ]
    );
    assert_eq!(machine.command("$J=X1"), vec![Response::Error(15)]);
}

#[test]
fn coordinated_move_finishes_together() {
    let mut machine = Machine::new();
    machine.command("G1 X30 Y-40 F3000");
    let total_ticks = 1_000_000;
    machine.advance(total_ticks / 2);
    let halfway = machine.status().machine_position;
    assert!((halfway[0] - 15.0).abs() < 0.1, "{:?}", halfway);
    assert!((halfway[1] + 20.0).abs() < 0.1, "{:?}", halfway);
    machine.advance(total_ticks / 2 + 10_000);
    machine.settle();
    assert_eq!(machine.status().machine_position, [30.0, -40.0, 0.0, 0.0]);
}
