//! PCA9535 16-bit I/O expander driver.
//!
//! Two 8-bit ports, each with an input, output, polarity inversion and
//! configuration register. A configuration bit of 1 makes the pin an input.
//! Whole-device accesses read or write port 0 and port 1 in one transfer,
//! port 0 in the low byte.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use super::{Device, DeviceStatus};
use crate::{
    hw_trait::{HwError, Result, i2c::I2c},
    tracing::prelude::*,
};

pub const PORTS: std::ops::RangeInclusive<u8> = 0..=1;

/// Configuration bit value of an input pin.
pub const IO_INPUT: u8 = 1;
/// Configuration bit value of an output pin.
pub const IO_OUTPUT: u8 = 0;

/// Register kind; the register address is the kind's base plus the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegType {
    Input,
    Output,
    Polarity,
    Configuration,
}

impl RegType {
    fn base(self) -> u8 {
        match self {
            Self::Input => 0x0,
            Self::Output => 0x2,
            Self::Polarity => 0x4,
            Self::Configuration => 0x6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Polarity => "polarity",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for RegType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegType {
    type Err = HwError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "input" => Ok(Self::Input),
            "output" => Ok(Self::Output),
            "polarity" => Ok(Self::Polarity),
            "configuration" => Ok(Self::Configuration),
            _ => Err(HwError::InvalidParameter(format!(
                "invalid register type `{s}'"
            ))),
        }
    }
}

pub fn register_name(reg: u8) -> &'static str {
    match reg {
        0 | 1 => "input logic levels register",
        2 | 3 => "output port register",
        4 | 5 => "polarity inversion register",
        6 | 7 => "configuration register",
        _ => "*reserved*",
    }
}

pub struct Pca9535<I: I2c> {
    i2c: I,
    address: u8,
    name: String,
}

impl<I: I2c> Pca9535<I> {
    pub fn new(i2c: I, address: u8, name: impl Into<String>) -> Self {
        Self {
            i2c,
            address,
            name: name.into(),
        }
    }

    fn register(&self, ty: RegType, port: u8) -> Result<u8> {
        if !PORTS.contains(&port) {
            return Err(HwError::InvalidParameter(format!(
                "{}: port number {port} out of valid range {}..{}",
                self.name,
                PORTS.start(),
                PORTS.end()
            )));
        }
        Ok(ty.base() + port)
    }

    pub async fn read_reg_port(&mut self, ty: RegType, port: u8) -> Result<u8> {
        let reg = self.register(ty, port)?;
        let mut buf = [0u8; 1];
        if let Err(e) = self.i2c.write_read(self.address, &[reg], &mut buf).await {
            error!(device = %self.name, error = %e,
                "Error reading the {} of port {port}", register_name(reg));
            return Err(e);
        }
        trace!(device = %self.name, value = %format!("0x{:02x}", buf[0]),
            "Read the {} of port {port}", register_name(reg));
        Ok(buf[0])
    }

    pub async fn write_reg_port(&mut self, ty: RegType, port: u8, value: u8) -> Result<()> {
        let reg = self.register(ty, port)?;
        trace!(device = %self.name, value = %format!("0x{value:02x}"),
            "Writing the {} of port {port}", register_name(reg));
        if let Err(e) = self.i2c.write(self.address, &[reg, value]).await {
            error!(device = %self.name, error = %e,
                "Error writing the {} of port {port}", register_name(reg));
            return Err(e);
        }
        Ok(())
    }

    /// Read both ports of one register kind, port 0 in the low byte.
    pub async fn read_reg(&mut self, ty: RegType) -> Result<u16> {
        let reg = ty.base();
        let mut buf = [0u8; 2];
        if let Err(e) = self.i2c.write_read(self.address, &[reg], &mut buf).await {
            error!(device = %self.name, error = %e,
                "Error reading the {} of all ports", register_name(reg));
            return Err(e);
        }
        let value = u16::from_le_bytes(buf);
        trace!(device = %self.name, value = %format!("0x{value:04x}"),
            "Read the {} of all ports", register_name(reg));
        Ok(value)
    }

    pub async fn write_reg(&mut self, ty: RegType, value: u16) -> Result<()> {
        let reg = ty.base();
        let [lo, hi] = value.to_le_bytes();
        trace!(device = %self.name, value = %format!("0x{value:04x}"),
            "Writing the {} of all ports", register_name(reg));
        if let Err(e) = self.i2c.write(self.address, &[reg, lo, hi]).await {
            error!(device = %self.name, error = %e,
                "Error writing the {} of all ports", register_name(reg));
            return Err(e);
        }
        Ok(())
    }

    pub async fn read_input_port(&mut self, port: u8) -> Result<u8> {
        self.read_reg_port(RegType::Input, port).await
    }

    pub async fn read_output_port(&mut self, port: u8) -> Result<u8> {
        self.read_reg_port(RegType::Output, port).await
    }

    pub async fn read_polarity_port(&mut self, port: u8) -> Result<u8> {
        self.read_reg_port(RegType::Polarity, port).await
    }

    pub async fn read_config_port(&mut self, port: u8) -> Result<u8> {
        self.read_reg_port(RegType::Configuration, port).await
    }

    pub async fn write_output_port(&mut self, port: u8, value: u8) -> Result<()> {
        self.write_reg_port(RegType::Output, port, value).await
    }

    pub async fn write_polarity_port(&mut self, port: u8, value: u8) -> Result<()> {
        self.write_reg_port(RegType::Polarity, port, value).await
    }

    pub async fn write_config_port(&mut self, port: u8, value: u8) -> Result<()> {
        self.write_reg_port(RegType::Configuration, port, value).await
    }

    pub async fn read_input(&mut self) -> Result<u16> {
        self.read_reg(RegType::Input).await
    }

    pub async fn read_output(&mut self) -> Result<u16> {
        self.read_reg(RegType::Output).await
    }

    pub async fn read_polarity(&mut self) -> Result<u16> {
        self.read_reg(RegType::Polarity).await
    }

    pub async fn read_config(&mut self) -> Result<u16> {
        self.read_reg(RegType::Configuration).await
    }

    pub async fn write_output(&mut self, value: u16) -> Result<()> {
        self.write_reg(RegType::Output, value).await
    }

    pub async fn write_polarity(&mut self, value: u16) -> Result<()> {
        self.write_reg(RegType::Polarity, value).await
    }

    pub async fn write_config(&mut self, value: u16) -> Result<()> {
        self.write_reg(RegType::Configuration, value).await
    }
}

#[async_trait]
impl<I: I2c> Device for Pca9535<I> {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn bus_index(&self) -> u8 {
        self.i2c.bus_index()
    }

    fn address(&self) -> u8 {
        self.address
    }

    async fn read_status(&mut self) -> Result<DeviceStatus> {
        let mut status = DeviceStatus::new(&*self);
        for ty in [
            RegType::Input,
            RegType::Output,
            RegType::Polarity,
            RegType::Configuration,
        ] {
            let value = self.read_reg(ty).await?;
            status.push(ty.as_str(), format!("0x{value:04x}"));
        }
        Ok(status)
    }
}
