//! Si598 I2C programmable XO driver.
//!
//! The output frequency is `fxtal * RFREQ / (HS_DIV * N1)`. The start-up
//! configuration of the part on the board gives 90 MHz with an internal
//! crystal of 39.17 MHz. Presets are precomputed register images for the
//! frequencies the trigger processor needs; each keeps the DCO between
//! 4.85 GHz and 5.67 GHz.
//!
//! Datasheet: <https://www.skyworksinc.com/-/media/Skyworks/SL/documents/public/data-sheets/si598-99.pdf>

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use super::{Device, DeviceStatus};
use crate::{
    hw_trait::{HwError, Result, i2c::I2c},
    tracing::prelude::*,
    types::Frequency,
};

/// Register addresses.
pub mod regs {
    /// HS_DIV, N1 and RFREQ occupy registers 7 to 12.
    pub const HS_DIV_N1: u8 = 0x07;
    pub const RESET_NEWFREQ: u8 = 0x87;
    pub const FREEZE_DCO: u8 = 0x89;
}

/// Nominal crystal frequency of the fitted part, in MHz.
pub const FXTAL_MHZ: f64 = 39.17;

const FREEZE: u8 = 0x10;
const NEW_FREQ: u8 = 0x40;

/// HS_DIV field to divider; field values 4 and 6 are reserved.
const HS_DIV_TABLE: [Option<u32>; 8] = [
    Some(4),
    Some(5),
    Some(6),
    Some(7),
    None,
    Some(9),
    None,
    Some(11),
];

/// Output frequencies with precomputed register images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Si598Preset {
    /// 240 MHz: HS_DIV 11, N1 2.
    Mhz240,
    /// 240.474 MHz: HS_DIV 11, N1 2.
    Mhz240_474,
}

impl Si598Preset {
    /// Register 7 to 12 contents.
    fn registers(self) -> [u8; 6] {
        match self {
            Self::Mhz240 => [0xe0, 0x48, 0x6c, 0xc0, 0xab, 0x7e],
            Self::Mhz240_474 => [0xe0, 0x48, 0x71, 0x03, 0x1f, 0xc0],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mhz240 => "240",
            Self::Mhz240_474 => "240.474",
        }
    }
}

impl fmt::Display for Si598Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} MHz", self.as_str())
    }
}

impl FromStr for Si598Preset {
    type Err = HwError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "240" => Ok(Self::Mhz240),
            "240.474" => Ok(Self::Mhz240_474),
            _ => Err(HwError::InvalidParameter(format!(
                "frequency `{s}' not recognized, use 240 or 240.474"
            ))),
        }
    }
}

/// Output frequency in MHz from the contents of registers 7 to 12.
pub fn decode_frequency(regs: [u8; 6]) -> Result<f64> {
    let [r7, r8, r9, r10, r11, r12] = regs;
    let n1 = (u32::from(r7 & 0x1f) << 2) + u32::from(r8 >> 6) + 1;
    let hs_div = HS_DIV_TABLE[usize::from(r7 >> 5)].ok_or_else(|| {
        HwError::Malformed(format!("reserved HS_DIV value {}", r7 >> 5))
    })?;
    let rfreq_raw = (u64::from(r8 & 0x3f) << 32)
        | (u64::from(r9) << 24)
        | (u64::from(r10) << 16)
        | (u64::from(r11) << 8)
        | u64::from(r12);
    let rfreq = rfreq_raw as f64 / f64::from(1u32 << 28);
    Ok(FXTAL_MHZ * rfreq / f64::from(hs_div) / f64::from(n1))
}

pub struct Si598<I: I2c> {
    i2c: I,
    address: u8,
    name: String,
}

impl<I: I2c> Si598<I> {
    pub fn new(i2c: I, address: u8, name: impl Into<String>) -> Self {
        Self {
            i2c,
            address,
            name: name.into(),
        }
    }

    /// Frequency in MHz as computed from the registers, before rounding.
    pub async fn get_freq_mhz(&mut self) -> Result<f64> {
        let mut data = [0u8; 6];
        if let Err(e) = self
            .i2c
            .write_read(self.address, &[regs::HS_DIV_N1], &mut data)
            .await
        {
            error!(device = %self.name, error = %e, "Error reading frequency");
            return Err(e);
        }
        trace!(device = %self.name, data = ?data, "Read frequency registers");
        decode_frequency(data)
    }

    pub async fn get_freq(&mut self) -> Result<Frequency> {
        Ok(Frequency::from_mhz(self.get_freq_mhz().await?))
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if let Err(e) = self.i2c.write(self.address, data).await {
            error!(device = %self.name, error = %e, "Error writing configuration to clock chip");
            return Err(e);
        }
        Ok(())
    }

    /// Program a preset: freeze the DCO, write the new configuration,
    /// unfreeze and assert NewFreq. The last two writes must follow each
    /// other within 10 ms.
    pub async fn prog(&mut self, preset: Si598Preset) -> Result<()> {
        info!(device = %self.name, "Programming {preset}");
        self.write(&[regs::FREEZE_DCO, FREEZE]).await?;

        let mut frame = [0u8; 7];
        frame[0] = regs::HS_DIV_N1;
        frame[1..].copy_from_slice(&preset.registers());
        self.write(&frame).await?;

        self.write(&[regs::FREEZE_DCO, 0x00]).await?;
        self.write(&[regs::RESET_NEWFREQ, NEW_FREQ]).await
    }
}

#[async_trait]
impl<I: I2c> Device for Si598<I> {
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
        let freq = self.get_freq().await?;
        Ok(DeviceStatus::new(&*self).with("frequency", freq))
    }
}
