mod config;
mod sender;

use cnc_protocol::client::Connection;
use config::Config;
use eyre::{eyre, Report, WrapErr};
use log::{info, warn};
use sender::{program_lines, Sender};
use std::env;
use std::fs::read_to_string;
use std::time::Duration;

fn main() -> Result<(), Report> {
    stable_eyre::install()?;
    pretty_env_logger::init();
    color_backtrace::install();

    let filename = env::args()
        .nth(1)
        .ok_or_else(|| eyre!("Usage: cncsend <file.gcode>"))?;
    let program = read_to_string(&filename).wrap_err_with(|| format!("Reading {}", filename))?;
    let config = Config::from_file()?;

    let port = serialport::new(&config.port, config.baud_rate)
        .timeout(Duration::from_millis(10))
        .open()
        .wrap_err_with(|| format!("Failed to open serial port {}", config.port))?;

    let mut sender = Sender::new(
        Connection::new(port),
        config.status_interval(),
        config.continue_on_error,
    );
    sender.reset()?;
    let rejected = sender.stream(program_lines(&program))?;
    sender.wait_until_idle()?;

    if rejected > 0 {
        warn!("{} lines of {} were rejected", rejected, filename);
    } else {
        info!("Finished {}", filename);
    }
    Ok(())
}
