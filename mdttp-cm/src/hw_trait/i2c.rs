//! I2C bus trait.

use async_trait::async_trait;

use super::Result;

/// I2C-specific failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum I2cError {
    /// The MCU reported a failed transaction (NACK, timeout, lost
    /// arbitration). The MCU text is kept verbatim.
    #[error("bus {port}: {response}")]
    Bus { port: u8, response: String },

    #[error("invalid I2C port {0}")]
    InvalidPort(u8),

    #[error("invalid transfer length: {0}")]
    Length(String),

    #[error("malformed reply: {0}")]
    Malformed(String),
}

/// Byte-level access to one I2C bus.
///
/// `write_read` must be a single bus transaction with a repeated start
/// between the write and the read: some devices latch state between the
/// two phases.
#[async_trait]
pub trait I2c: Send {
    /// Index of the bus this handle talks to, for diagnostics.
    fn bus_index(&self) -> u8;

    /// Write `data` to the device at 7-bit address `addr`.
    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()>;

    /// Fill `buffer` with bytes read from the device at `addr`.
    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()>;

    /// Write `write`, then read into `read` with a repeated start.
    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()>;
}
