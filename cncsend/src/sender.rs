use cnc_protocol::client::Connection;
use cnc_protocol::{MachineState, RealtimeCommand, Response};
use eyre::{bail, Report};
use log::{debug, error, info, warn};
use std::thread::sleep;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const BANNER_TIMEOUT: Duration = Duration::from_secs(5);

/// The lines of a program worth sending: without surrounding whitespace, and skipping blank lines.
pub fn program_lines(program: &str) -> impl Iterator<Item = &str> {
    program
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

/// Streams lines to the controller one at a time, waiting for each to be answered.
pub struct Sender {
    connection: Connection,
    status_interval: Duration,
    last_status_query: Instant,
    continue_on_error: bool,
    /// The state from the latest status report.
    state: Option<MachineState>,
}

impl Sender {
    pub fn new(connection: Connection, status_interval: Duration, continue_on_error: bool) -> Self {
        Self {
            connection,
            status_interval,
            last_status_query: Instant::now(),
            continue_on_error,
            state: None,
        }
    }

    /// Reset the controller and wait for it to print its banner.
    pub fn reset(&mut self) -> Result<(), Report> {
        self.connection.send_realtime(RealtimeCommand::Reset)?;
        let deadline = Instant::now() + BANNER_TIMEOUT;
        while Instant::now() < deadline {
            for response in self.connection.poll()? {
                match response {
                    Response::Welcome => {
                        info!("Controller ready");
                        return Ok(());
                    }
                    // A reset which interrupts a running program reports an alarm first.
                    Response::Alarm(code) => warn!("Reset aborted a cycle (alarm {})", code),
                    response => self.handle(response)?,
                }
            }
            sleep(POLL_INTERVAL);
        }
        bail!("No banner from controller after {:?}", BANNER_TIMEOUT)
    }

    /// Send each line in turn. Returns the number of lines which were rejected.
    pub fn stream<'a>(&mut self, lines: impl Iterator<Item = &'a str>) -> Result<usize, Report> {
        let mut rejected = 0;
        for (number, line) in lines.enumerate() {
            debug!("Sending line {}: {}", number + 1, line);
            self.connection.send_line(line)?;
            while self.connection.unanswered() > 0 {
                for response in self.connection.poll()? {
                    if let Response::Error(code) = response {
                        error!("Line {} '{}' rejected with error {}", number + 1, line, code);
                        rejected += 1;
                        if !self.continue_on_error {
                            bail!("Stopping after error {}", code);
                        }
                    } else {
                        self.handle(response)?;
                    }
                }
                self.query_status_if_due()?;
                sleep(POLL_INTERVAL);
            }
        }
        Ok(rejected)
    }

    /// Wait for the queued moves to finish.
    pub fn wait_until_idle(&mut self) -> Result<(), Report> {
        self.state = None;
        while self.state != Some(MachineState::Idle) {
            for response in self.connection.poll()? {
                self.handle(response)?;
            }
            self.query_status_if_due()?;
            sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    fn query_status_if_due(&mut self) -> Result<(), Report> {
        if self.last_status_query.elapsed() >= self.status_interval {
            self.connection.send_realtime(RealtimeCommand::StatusQuery)?;
            self.last_status_query = Instant::now();
        }
        Ok(())
    }

    fn handle(&mut self, response: Response) -> Result<(), Report> {
        match response {
            Response::Status(status) => {
                info!("{}", status);
                self.state = Some(status.state);
            }
            Response::Alarm(code) => bail!("Controller raised alarm {}", code),
            Response::Welcome => bail!("Controller was reset"),
            Response::Message(message) => info!("Controller: {}", message),
            response => debug!("{}", response),
        }
        Ok(())
    }
}
