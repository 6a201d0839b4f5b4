use super::{RealtimeCommand, Response};
use log::{error, trace};
use serialport::SerialPort;
use slice_deque::SliceDeque;
use std::io;

/// A client to talk to the controller over a serial port.
pub struct Connection {
    port: Box<dyn SerialPort>,
    buffer: SliceDeque<u8>,
    /// The number of lines sent which haven't been answered with `ok` or `error` yet.
    unanswered: usize,
}

impl Connection {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self {
            port,
            buffer: SliceDeque::new(),
            unanswered: 0,
        }
    }

    /// Sends one command line. The line ending is added here.
    pub fn send_line(&mut self, line: &str) -> Result<(), io::Error> {
        trace!("Sending line {:?}", line);
        self.port.write_all(line.trim_end().as_bytes())?;
        self.port.write_all(b"\n")?;
        self.unanswered += 1;
        Ok(())
    }

    /// Sends a realtime command, which the controller handles immediately even while lines are
    /// queued.
    pub fn send_realtime(&mut self, command: RealtimeCommand) -> Result<(), io::Error> {
        trace!("Sending realtime command {:?}", command);
        self.port.write_all(&[command.to_byte()])?;
        self.port.flush()
    }

    /// The number of lines still waiting for `ok` or `error`.
    pub fn unanswered(&self) -> usize {
        self.unanswered
    }

    /// Reads from the serial port and returns any complete responses.
    pub fn poll(&mut self) -> Result<Vec<Response>, io::Error> {
        if self.port.bytes_to_read()? > 0 {
            let mut temp = [0; 256];
            let bytes_read = self.port.read(&mut temp)?;
            self.buffer.extend(&temp[0..bytes_read]);
        }

        let mut responses = vec![];
        loop {
            match Response::parse(&self.buffer) {
                Ok((response, len)) => {
                    self.buffer.drain(..len);
                    match response {
                        Response::Ok | Response::Error(_) => {
                            self.unanswered = self.unanswered.saturating_sub(1)
                        }
                        // A reset discards every pending line without answering it.
                        Response::Welcome => self.unanswered = 0,
                        _ => {}
                    }
                    responses.push(response);
                }
                Err(nb::Error::Other((e, len))) => {
                    error!("Unexpected response {:?} from {:?}", e, &self.buffer[..len]);
                    self.buffer.drain(..len);
                }
                Err(nb::Error::WouldBlock) => break,
            }
        }

        Ok(responses)
    }
}
