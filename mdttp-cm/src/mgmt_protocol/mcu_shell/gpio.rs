//! GPIO access through the MCU shell.
//!
//! The firmware groups related pins into named GPIO types and reads or
//! writes all pins of a type as one value.

use std::fmt;
use std::str::FromStr;

use super::channel::McuChannel;
use crate::hw_trait::{HwError, Result};
use crate::tracing::prelude::*;
use crate::transport::parse_auto_int;

/// GPIO types known to the MCU firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpioType {
    /// Service Module power enable driven to the CM.
    SmPwrEn,
    /// CM ready signal driven to the Service Module.
    CmReady,
    SmPsRst,
    SmGpio,
    LedStatus,
    LedUser,
    PowerCtrl,
    PowerGood,
    PowerFault,
    PowerI2cAlert,
    PowerReservedCtrl,
    TempAlert,
    Fpga,
    I2cReset,
    I2cInt,
}

impl GpioType {
    pub const ALL: [GpioType; 15] = [
        GpioType::SmPwrEn,
        GpioType::CmReady,
        GpioType::SmPsRst,
        GpioType::SmGpio,
        GpioType::LedStatus,
        GpioType::LedUser,
        GpioType::PowerCtrl,
        GpioType::PowerGood,
        GpioType::PowerFault,
        GpioType::PowerI2cAlert,
        GpioType::PowerReservedCtrl,
        GpioType::TempAlert,
        GpioType::Fpga,
        GpioType::I2cReset,
        GpioType::I2cInt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GpioType::SmPwrEn => "sm-pwr-en",
            GpioType::CmReady => "cm-ready",
            GpioType::SmPsRst => "sm-ps-rst",
            GpioType::SmGpio => "sm-gpio",
            GpioType::LedStatus => "led-status",
            GpioType::LedUser => "led-user",
            GpioType::PowerCtrl => "power-ctrl",
            GpioType::PowerGood => "power-good",
            GpioType::PowerFault => "power-fault",
            GpioType::PowerI2cAlert => "power-i2c-alert",
            GpioType::PowerReservedCtrl => "power-reserved-ctrl",
            GpioType::TempAlert => "temp-alert",
            GpioType::Fpga => "fpga",
            GpioType::I2cReset => "i2c-reset",
            GpioType::I2cInt => "i2c-int",
        }
    }

    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            GpioType::SmPwrEn
                | GpioType::SmPsRst
                | GpioType::PowerGood
                | GpioType::PowerFault
                | GpioType::PowerI2cAlert
                | GpioType::TempAlert
                | GpioType::I2cInt
        )
    }
}

impl fmt::Display for GpioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GpioType {
    type Err = HwError;

    fn from_str(s: &str) -> Result<Self> {
        GpioType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| HwError::Gpio(format!("unknown GPIO type `{s}'")))
    }
}

/// GPIO accessor on the MCU.
#[derive(Clone)]
pub struct McuGpio {
    channel: McuChannel,
}

impl McuGpio {
    pub fn new(channel: McuChannel) -> Self {
        Self { channel }
    }

    /// Current value of all pins of `gpio`.
    ///
    /// Reads as 0 in simulated mode.
    pub async fn get(&self, gpio: GpioType) -> Result<u32> {
        let reply = self.channel.command(&format!("gpio {gpio}")).await?;
        if self.channel.is_simulated() {
            return Ok(0);
        }

        let marker = format!("Current GPIO {gpio} value:");
        let value = reply
            .full
            .split_once(marker.as_str())
            .and_then(|(_, rest)| parse_auto_int(rest))
            .ok_or_else(|| HwError::Malformed(format!("GPIO {gpio} reply {:?}", reply.full)))?;
        trace!(gpio = %gpio, value = %format!("0x{value:02x}"), "GPIO read");
        Ok(value)
    }

    /// Drive all pins of `gpio` to `value`.
    pub async fn set(&self, gpio: GpioType, value: u32) -> Result<()> {
        if gpio.is_read_only() {
            return Err(HwError::Gpio(format!("GPIO {gpio} is read-only")));
        }
        debug!(gpio = %gpio, value = %format!("0x{value:02x}"), "GPIO write");
        self.channel
            .command(&format!("gpio {gpio} 0x{value:02x}"))
            .await
            .map(|_| ())
    }

    /// Replace the bits selected by `mask` with those of `value`.
    pub async fn bits_mod(&self, gpio: GpioType, mask: u32, value: u32) -> Result<u32> {
        let current = self.get(gpio).await?;
        let new = (current & !mask) | (value & mask);
        self.set(gpio, new).await?;
        Ok(new)
    }

    pub async fn bits_set(&self, gpio: GpioType, bits: u32) -> Result<u32> {
        self.bits_mod(gpio, bits, bits).await
    }

    pub async fn bits_clr(&self, gpio: GpioType, bits: u32) -> Result<u32> {
        self.bits_mod(gpio, bits, 0).await
    }
}
