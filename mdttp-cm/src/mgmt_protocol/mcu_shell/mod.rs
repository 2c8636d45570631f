//! Text-shell protocol of the Command Module bridge MCU.
//!
//! The firmware accepts one command per line. The commands used here are:
//!
//! ```text
//! i2c     PORT SLV-ADR ACC NUM|DATA   I2C access (ACC bits: R/W, Sr, nP, Q)
//! i2c-det PORT [MODE]                 I2C detect devices (0 = auto, 1 = quick, 2 = read)
//! gpio    TYPE [VALUE]                get/set a GPIO type (bus switch resets: i2c-reset)
//! power   DOMAIN [MODE]               power domain control (0 = down, 1 = up)
//! ```
//!
//! All commands share one serial link, wrapped in a [`McuChannel`].

pub mod channel;
pub mod gpio;
pub mod i2c;

pub use channel::{McuChannel, McuReply};
pub use gpio::{GpioType, McuGpio};
pub use i2c::{DetectMode, McuI2c};

use std::ops::RangeInclusive;

/// I2C master ports the firmware drives.
pub const I2C_PORTS: RangeInclusive<u8> = 1..=8;

/// Parameter tokens the firmware parses for one `i2c` command.
const I2C_MAX_PARAMS: usize = 32;

/// Most bytes a single `i2c` read returns.
pub const I2C_MAX_READ: usize = 32;

/// Most data bytes a single `i2c` write carries. Port, address and access
/// mode take three of the parameter slots; tokens beyond the last slot are
/// silently ignored by the firmware.
pub const I2C_MAX_WRITE: usize = I2C_MAX_PARAMS - 3;

/// Access mode bits of the `i2c` command.
pub mod access {
    pub const WRITE: u8 = 0x0;
    pub const READ: u8 = 0x1;
    /// Sr: repeated start.
    pub const REPEATED_START: u8 = 0x2;
    /// nP: omit the stop condition.
    pub const NO_STOP: u8 = 0x4;
    /// Q: quick command.
    pub const QUICK: u8 = 0x8;
}
