//! MCP9902 temperature sensor driver.
//!
//! The MCP9902 measures its own die temperature and one external diode.
//! Readings are 11 bits with 0.125 degC resolution, split into an integer
//! and a fractional register.
//!
//! Datasheet: <https://www.microchip.com/en-us/product/mcp9902>

use async_trait::async_trait;

use super::{Accumulated, Device, DeviceStatus, check_register};
use crate::{
    hw_trait::{Result, i2c::I2c},
    tracing::prelude::*,
};

/// Register addresses.
pub mod regs {
    pub const INT_TEMP: u8 = 0x00;
    pub const EXT_TEMP: u8 = 0x01;
    pub const STATUS: u8 = 0x02;
    pub const CONFIG_0: u8 = 0x03;
    pub const CONV_RATE_0: u8 = 0x04;
    pub const CONFIG_1: u8 = 0x09;
    pub const CONV_RATE_1: u8 = 0x0a;
    pub const EXT_TEMP_FRACT: u8 = 0x10;
    pub const INT_TEMP_FRACT: u8 = 0x29;
    pub const PRODUCT_ID: u8 = 0xfd;
    pub const MANUFACTURER_ID: u8 = 0xfe;
    pub const REVISION: u8 = 0xff;
}

const REG_RANGE: std::ops::RangeInclusive<u16> = 0x00..=0xff;

// The datasheet is not explicit about which configuration register governs
// which diode. Configuration 0 is taken to apply to the internal diode and
// configuration 1 to the external one.
const CONFIG_INT_DIODE: u8 = regs::CONFIG_0;
const CONFIG_EXT_DIODE: u8 = regs::CONFIG_1;

/// RANGE bit: extended range, readings offset by 64 degC.
const CONFIG_EXTENDED_RANGE: u8 = 0x04;

/// Temperature shown when a reading is not available.
pub const TEMP_READ_FAILED: f32 = -128.0;

pub fn register_name(reg: u8) -> &'static str {
    match reg {
        regs::INT_TEMP => "integer value of the internal diode temperature",
        regs::INT_TEMP_FRACT => "fractional portion of the internal diode temperature",
        regs::EXT_TEMP => "integer value of the external diode temperature",
        regs::EXT_TEMP_FRACT => "fractional portion of the external diode temperature",
        regs::STATUS => "status register",
        regs::CONFIG_0 => "configuration register 0",
        regs::CONFIG_1 => "configuration register 1",
        regs::CONV_RATE_0 => "temperature conversion rate register 0",
        regs::CONV_RATE_1 => "temperature conversion rate register 1",
        regs::PRODUCT_ID => "product ID",
        regs::MANUFACTURER_ID => "manufacturer ID",
        regs::REVISION => "revision register",
        _ => "other/unknown",
    }
}

fn raw_temperature(int: u8, fract: u8) -> u16 {
    (u16::from(int) << 3) | (u16::from(fract & 0xe0) >> 5)
}

/// Temperature in the default range (0 to 127.875 degC).
pub fn raw_to_temperature(int: u8, fract: u8) -> f32 {
    f32::from(raw_temperature(int, fract)) * 0.125
}

/// Temperature in the extended range (-64 to 191.875 degC).
pub fn raw_to_temperature_extended(int: u8, fract: u8) -> f32 {
    raw_to_temperature(int, fract) - 64.0
}

pub struct Mcp9902<I: I2c> {
    i2c: I,
    address: u8,
    name: String,
}

impl<I: I2c> Mcp9902<I> {
    pub fn new(i2c: I, address: u8, name: impl Into<String>) -> Self {
        Self {
            i2c,
            address,
            name: name.into(),
        }
    }

    pub async fn read_reg(&mut self, reg: u8) -> Result<u8> {
        check_register(&self.name, reg.into(), REG_RANGE)?;
        let mut buf = [0u8; 1];
        if let Err(e) = self.i2c.write_read(self.address, &[reg], &mut buf).await {
            error!(device = %self.name, error = %e, "Error reading the {}", register_name(reg));
            return Err(e);
        }
        trace!(device = %self.name, value = %format!("0x{:02x}", buf[0]), "Read the {}", register_name(reg));
        Ok(buf[0])
    }

    pub async fn write_reg(&mut self, reg: u8, value: u8) -> Result<()> {
        check_register(&self.name, reg.into(), REG_RANGE)?;
        trace!(device = %self.name, value = %format!("0x{value:02x}"), "Writing the {}", register_name(reg));
        if let Err(e) = self.i2c.write(self.address, &[reg, value]).await {
            error!(device = %self.name, error = %e, "Error writing the {}", register_name(reg));
            return Err(e);
        }
        Ok(())
    }

    /// Without the config register the range is unknown, so nothing else is
    /// read. Otherwise both temperature registers are read even if one fails.
    async fn read_temp(&mut self, config_reg: u8, int_reg: u8, fract_reg: u8) -> Result<f32> {
        let config = self.read_reg(config_reg).await?;
        let mut acc = Accumulated::new(());
        let int = self.read_reg(int_reg).await;
        let int = acc.record(int).unwrap_or(0);
        let fract = self.read_reg(fract_reg).await;
        let fract = acc.record(fract).unwrap_or(0);
        acc.into_result()?;
        Ok(if config & CONFIG_EXTENDED_RANGE != 0 {
            raw_to_temperature_extended(int, fract)
        } else {
            raw_to_temperature(int, fract)
        })
    }

    /// Die temperature in degC.
    pub async fn read_temp_int(&mut self) -> Result<f32> {
        self.read_temp(CONFIG_INT_DIODE, regs::INT_TEMP, regs::INT_TEMP_FRACT)
            .await
    }

    /// External diode temperature in degC.
    pub async fn read_temp_ext(&mut self) -> Result<f32> {
        self.read_temp(CONFIG_EXT_DIODE, regs::EXT_TEMP, regs::EXT_TEMP_FRACT)
            .await
    }

    pub async fn read_status_reg(&mut self) -> Result<u8> {
        self.read_reg(regs::STATUS).await
    }

    pub async fn read_config_0(&mut self) -> Result<u8> {
        self.read_reg(regs::CONFIG_0).await
    }

    pub async fn read_config_1(&mut self) -> Result<u8> {
        self.read_reg(regs::CONFIG_1).await
    }

    pub async fn write_config_0(&mut self, value: u8) -> Result<()> {
        self.write_reg(regs::CONFIG_0, value).await
    }

    pub async fn write_config_1(&mut self, value: u8) -> Result<()> {
        self.write_reg(regs::CONFIG_1, value).await
    }

    pub async fn read_temp_conv_0(&mut self) -> Result<u8> {
        self.read_reg(regs::CONV_RATE_0).await
    }

    pub async fn read_temp_conv_1(&mut self) -> Result<u8> {
        self.read_reg(regs::CONV_RATE_1).await
    }

    pub async fn write_temp_conv_0(&mut self, value: u8) -> Result<()> {
        self.write_reg(regs::CONV_RATE_0, value).await
    }

    pub async fn write_temp_conv_1(&mut self, value: u8) -> Result<()> {
        self.write_reg(regs::CONV_RATE_1, value).await
    }

    pub async fn read_product_id(&mut self) -> Result<u8> {
        self.read_reg(regs::PRODUCT_ID).await
    }

    pub async fn read_manufacturer_id(&mut self) -> Result<u8> {
        self.read_reg(regs::MANUFACTURER_ID).await
    }

    pub async fn read_revision(&mut self) -> Result<u8> {
        self.read_reg(regs::REVISION).await
    }
}

#[async_trait]
impl<I: I2c> Device for Mcp9902<I> {
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
        let int = self.read_temp_int().await?;
        let ext = self.read_temp_ext().await?;
        let status = self.read_status_reg().await?;
        Ok(DeviceStatus::new(&*self)
            .with("internal temperature", format!("{int:.3} degC"))
            .with("external temperature", format!("{ext:.3} degC"))
            .with("status", format!("0x{status:02x}")))
    }
}
