//! Configuration values handed to the transport and the board at
//! construction time.
//!
//! Nothing in the crate reads configuration from a global; the CLI builds a
//! [`Config`] from its arguments and passes the pieces down.

use std::ops::RangeInclusive;
use std::time::Duration;

/// Default serial device of the MCU UART on the Service Module.
pub const DEFAULT_DEVICE: &str = "/dev/ttyUL1";

/// Serial transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Serial device path. Empty selects simulated hardware access.
    pub device: String,
    pub baud_rate: u32,
    /// Steady-state read timeout while collecting the response block.
    ///
    /// The empirically stable value is 150 us; the tokio timer rounds this
    /// up to its own resolution.
    pub poll_timeout: Duration,
    /// Wider read timeout used only while waiting for the command echo.
    pub echo_timeout: Duration,
    pub write_timeout: Duration,
    /// Upper bound on read attempts per command before the response is
    /// declared incomplete.
    pub max_lines: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            baud_rate: 115_200,
            poll_timeout: Duration::from_micros(150),
            echo_timeout: Duration::from_millis(50),
            write_timeout: Duration::from_secs(2),
            max_lines: 100,
        }
    }
}

impl TransportConfig {
    /// Configuration for the given device, other values at their defaults.
    pub fn with_device(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            ..Default::default()
        }
    }

    /// Whether this configuration selects simulated hardware access.
    pub fn is_simulated(&self) -> bool {
        self.device.is_empty()
    }
}

/// Board façade settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    /// Number of bus proxies to create (indices `0..bus_count`).
    pub bus_count: u8,
    /// Buses that are wired on the board and handled by the MCU firmware.
    pub active_buses: RangeInclusive<u8>,
    /// Pulse the reset lines of the I2C bus switches while the board is
    /// set up.
    pub reset_i2c_on_init: bool,
    /// Command-line verbosity; 2 and above adds device IDs to reports.
    pub verbosity: u8,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            bus_count: 10,
            active_buses: 1..=8,
            reset_i2c_on_init: true,
            verbosity: 1,
        }
    }
}

impl BoardConfig {
    pub fn is_active(&self, bus: u8) -> bool {
        bus < self.bus_count && self.active_buses.contains(&bus)
    }
}

/// Complete program configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub transport: TransportConfig,
    pub board: BoardConfig,
}

impl Config {
    pub fn new(device: impl Into<String>, verbosity: u8) -> Self {
        Self {
            transport: TransportConfig::with_device(device),
            board: BoardConfig {
                verbosity,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_device_is_simulated() {
        assert!(TransportConfig::with_device("").is_simulated());
        assert!(!TransportConfig::default().is_simulated());
    }

    #[test]
    fn active_buses() {
        let board = BoardConfig::default();
        assert!(!board.is_active(0));
        assert!(board.is_active(1));
        assert!(board.is_active(8));
        assert!(!board.is_active(9));
    }

    #[test]
    fn config_carries_verbosity() {
        let config = Config::new("/dev/ttyUSB3", 3);
        assert_eq!(config.transport.device, "/dev/ttyUSB3");
        assert_eq!(config.board.verbosity, 3);
        assert_eq!(config.transport.max_lines, 100);
    }
}
