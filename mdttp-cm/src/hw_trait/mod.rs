//! Hardware abstraction traits.
//!
//! Peripheral drivers are written against these traits rather than against
//! the MCU shell directly, so they can be exercised with in-memory fakes and
//! so the register logic stays separate from the wire vocabulary.

pub mod i2c;

pub use i2c::{I2c, I2cError};

use crate::transport::{Outcome, TransportError};

/// Errors surfaced by hardware access.
///
/// Validation errors (`InvalidParameter`, `I2cError::InvalidPort`,
/// `I2cError::Length`) are raised before anything is sent to the MCU.
#[derive(Debug, thiserror::Error)]
pub enum HwError {
    #[error("I2C error: {0}")]
    I2c(#[from] I2cError),

    #[error("GPIO error: {0}")]
    Gpio(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("MCU answered {outcome}: {response}")]
    Mcu { outcome: Outcome, response: String },

    #[error("Malformed MCU response: {0}")]
    Malformed(String),

    #[error("Register map file `{file}', line {line} ({content}): {reason}")]
    RegisterMap {
        file: String,
        line: usize,
        content: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, HwError>;
