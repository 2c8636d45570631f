//! Si5341/40 and Si5345/44/42 clock generator driver.
//!
//! Register access is paged; page 0 holds the live and sticky status
//! registers read here. Full configuration is loaded from a ClockBuilder
//! Pro register map, see [`regmap`](super::regmap).

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::Path;

use super::{Accumulated, Device, DeviceStatus, check_register, regmap};
use crate::{
    hw_trait::{Result, i2c::I2c},
    tracing::prelude::*,
};

/// Register addresses on page 0.
pub mod regs {
    pub const STATUS: u8 = 0x0c;
    pub const LOSIN: u8 = 0x0d;
    pub const LOL: u8 = 0x0e;
    pub const STATUS_FLG: u8 = 0x11;
    pub const LOSIN_FLG: u8 = 0x12;
    pub const LOL_FLG: u8 = 0x13;
}

const REG_RANGE: std::ops::RangeInclusive<u16> = 0x0c..=0x13;

const STATUS_MASK: u8 = 0x2f;
const LOSIN_MASK: u8 = 0x0f;

/// Device calibration in progress.
pub const SYSINCAL: u8 = 0x01;
/// Loss of signal on the XA/XB crystal input.
pub const LOSXAXB: u8 = 0x02;
/// DSPLL loss of lock.
pub const LOL: u8 = 0x02;

pub fn register_name(reg: u8) -> &'static str {
    match reg {
        regs::STATUS => "Status regs 0xC",
        regs::LOSIN => "Status reg: LOSIN",
        regs::LOL => "Status reg: LOL",
        regs::STATUS_FLG => "Sticky Status regs _FLG",
        regs::LOSIN_FLG => "Sticky Status reg: LOSIN_FLG",
        regs::LOL_FLG => "Sticky Status reg: LOL_FLG",
        _ => "*other/unknown*",
    }
}

/// Masked contents of the three status registers, live or sticky.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Si53xxStatus {
    pub status: u8,
    /// Loss of signal per input: FB_IN, IN2, IN1, IN0.
    pub losin: u8,
    pub lol: u8,
}

impl Si53xxStatus {
    pub fn sysincal(&self) -> bool {
        self.status & SYSINCAL != 0
    }

    pub fn losxaxb(&self) -> bool {
        self.status & LOSXAXB != 0
    }

    pub fn loss_of_lock(&self) -> bool {
        self.lol & LOL != 0
    }
}

impl fmt::Display for Si53xxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SYSINCAL: {}, LOSXAXB: {}, LOL: {}, LOSIN: 0x{:x}",
            self.sysincal(),
            self.losxaxb(),
            self.loss_of_lock(),
            self.losin
        )
    }
}

pub struct Si53xx<I: I2c> {
    i2c: I,
    address: u8,
    name: String,
}

impl<I: I2c> Si53xx<I> {
    pub fn new(i2c: I, address: u8, name: impl Into<String>) -> Self {
        Self {
            i2c,
            address,
            name: name.into(),
        }
    }

    /// Read a page 0 register.
    pub async fn read_reg(&mut self, reg: u8) -> Result<u8> {
        check_register(&self.name, reg.into(), REG_RANGE)?;
        let mut buf = [0u8; 1];
        let result = match self.i2c.write(self.address, &[regmap::PAGE_REGISTER, 0x00]).await {
            Ok(()) => self.i2c.write_read(self.address, &[reg], &mut buf).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(device = %self.name, error = %e,
                "Error reading the value of the \"{}\", register address 0x{reg:02x}", register_name(reg));
            return Err(e);
        }
        trace!(device = %self.name, value = %format!("0x{:02x}", buf[0]),
            "Read the value of the \"{}\"", register_name(reg));
        Ok(buf[0])
    }

    async fn read_triplet(&mut self, status: u8, losin: u8, lol: u8) -> Accumulated<Si53xxStatus> {
        let mut acc = Accumulated::new(Si53xxStatus::default());
        let value = self.read_reg(status).await;
        acc.value.status = acc.record(value).unwrap_or(0) & STATUS_MASK;
        let value = self.read_reg(losin).await;
        acc.value.losin = acc.record(value).unwrap_or(0) & LOSIN_MASK;
        let value = self.read_reg(lol).await;
        acc.value.lol = acc.record(value).unwrap_or(0) & LOL;
        acc
    }

    /// Live status. All three registers are read even if one fails.
    pub async fn read_status_regs(&mut self) -> Accumulated<Si53xxStatus> {
        self.read_triplet(regs::STATUS, regs::LOSIN, regs::LOL).await
    }

    /// Sticky status flags.
    pub async fn read_sticky_status_regs(&mut self) -> Accumulated<Si53xxStatus> {
        self.read_triplet(regs::STATUS_FLG, regs::LOSIN_FLG, regs::LOL_FLG)
            .await
    }

    /// Load a ClockBuilder Pro register map file.
    pub async fn config_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = path.display().to_string();
        let text = regmap::read_file(path).await.inspect_err(|e| {
            error!(device = %self.name, error = %e, "Cannot load the register map file");
        })?;
        let writes = regmap::replay(&mut self.i2c, self.address, &self.name, &file, &text).await?;
        info!(device = %self.name, file = %file, writes, "Clock configuration loaded");
        Ok(())
    }
}

#[async_trait]
impl<I: I2c> Device for Si53xx<I> {
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
        let live = self.read_status_regs().await.into_result()?;
        let sticky = self.read_sticky_status_regs().await.into_result()?;
        Ok(DeviceStatus::new(&*self)
            .with("status", live)
            .with("sticky status", sticky))
    }
}
