use eyre::{Report, WrapErr};
use serde_derive::Deserialize;
use std::fs::read_to_string;
use std::time::Duration;

const CONFIG_FILENAME: &str = "cncsend.toml";

const DEFAULT_BAUD_RATE: u32 = 115_200;
const DEFAULT_STATUS_INTERVAL_MS: u64 = 250;

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The serial port the controller is connected to.
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// How often to ask for a status report while waiting for a reply.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
    /// Carry on sending after a line is rejected, rather than stopping.
    #[serde(default)]
    pub continue_on_error: bool,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_status_interval_ms() -> u64 {
    DEFAULT_STATUS_INTERVAL_MS
}

impl Config {
    pub fn from_file() -> Result<Config, Report> {
        Config::read(CONFIG_FILENAME)
    }

    fn read(filename: &str) -> Result<Config, Report> {
        let config_file =
            read_to_string(filename).wrap_err_with(|| format!("Reading {}", filename))?;
        toml::from_str(&config_file).wrap_err_with(|| format!("Parsing {}", filename))
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parsing the example config file should not give any errors.
    #[test]
    fn example_config() {
        let config = Config::read("cncsend.example.toml").unwrap();
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.status_interval(), Duration::from_millis(250));
    }

    #[test]
    fn defaults() {
        let config = toml::from_str::<Config>(r#"port = "COM3""#).unwrap();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.status_interval_ms, 250);
        assert!(!config.continue_on_error);
    }

    #[test]
    fn port_is_required() {
        assert!(toml::from_str::<Config>("").is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Config>("port = \"COM3\"\nspeed = 9600").is_err());
    }
}
