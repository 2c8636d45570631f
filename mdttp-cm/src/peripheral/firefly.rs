//! Samtec FireFly optical transceiver driver.
//!
//! Receivers and transmitters have different register maps on the lower
//! page; the upper page is selected with register 127. Multi-byte values
//! are stored most significant byte first.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::{Accumulated, Device, DeviceStatus};
use crate::{
    hw_trait::{HwError, Result, i2c::I2c},
    tracing::prelude::*,
};

/// Register addresses common to both kinds.
pub mod regs {
    pub const TEMPERATURE: u8 = 22;
    pub const VCC: u8 = 26;
    pub const OPERATING_TIME: u8 = 38;
    pub const FIRMWARE_VERSION: u8 = 111;
    pub const PAGE_SELECT: u8 = 127;
}

/// Upper page holding vendor information.
pub const PAGE_VENDOR: u8 = 0x00;
/// Upper page holding the time-at-temperature histogram.
pub const PAGE_TIME_AT_TEMPERATURE: u8 = 0x0b;

const VENDOR_NAME: std::ops::RangeInclusive<u8> = 152..=161;
const VENDOR_PART_NUMBER: std::ops::RangeInclusive<u8> = 171..=186;
const VENDOR_SERIAL_NUMBER: std::ops::RangeInclusive<u8> = 189..=198;

/// Histogram slots; each is 3 bytes from register 128 on.
pub const TIME_AT_TEMPERATURE_SLOTS: std::ops::RangeInclusive<u8> = 0..=41;

/// Widest range `read_reg_range_int` can pack.
const RANGE_INT_MAX: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FireflyKind {
    Rx,
    Tx,
}

impl fmt::Display for FireflyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rx => "rx",
            Self::Tx => "tx",
        })
    }
}

impl FromStr for FireflyKind {
    type Err = HwError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rx" => Ok(Self::Rx),
            "tx" => Ok(Self::Tx),
            _ => Err(HwError::InvalidParameter(format!(
                "unknown FireFly type `{s}', use rx or tx"
            ))),
        }
    }
}

pub fn register_name(kind: FireflyKind, reg: u8) -> &'static str {
    // Registers shared by both kinds.
    match reg {
        2 => return "Status",
        6 => return "Status Summaries",
        17 => return "Latched Alarms- Temperature",
        18 => return "Latched Alarms- Vcc3.3",
        20..=21 => return "Latched CDR LOL Alarms",
        22 => return "Internal Temperature Monitor",
        26..=27 => return "Vcc Monitor",
        38..=39 => return "Elapsed Operating Time",
        51 => return "Reset",
        74..=75 => return "CDR Enable",
        105 => return "Mask Temperature Alarms",
        106 => return "Mask Vcc3.3 Alarms",
        108..=109 => return "Mask CDR LOL Alarms",
        111..=114 => return "Firmware Version",
        127 => return "Page Select Byte",
        _ => {}
    }
    match (kind, reg) {
        (FireflyKind::Rx, 7..=8) => "Latched LOS Alarms",
        (FireflyKind::Rx, 14..=16) => "Latched RX Power Alarms",
        (FireflyKind::Rx, 52..=53) => "Channel Disable",
        (FireflyKind::Rx, 54..=55) => "Output Disable",
        (FireflyKind::Rx, 58..=59) => "Rx Polarity Invert",
        (FireflyKind::Rx, 62..=67) => "Output Amplitude",
        (FireflyKind::Rx, 68..=73) => "De-emphasis",
        (FireflyKind::Rx, 95..=96) => "Mask LOS Flags",
        (FireflyKind::Rx, 102..=104) => "Mask RX Power Alarms",
        (FireflyKind::Tx, 7..=8) => "Latched TX LOS Alarms",
        (FireflyKind::Tx, 9..=10) => "Latched Alarm - Laser Fault",
        (FireflyKind::Tx, 52..=53) => "Transmit Channel Disable",
        (FireflyKind::Tx, 54..=55) => "Transmit Output Disable",
        (FireflyKind::Tx, 56..=57) => "Transmit Squelch Disable",
        (FireflyKind::Tx, 58..=59) => "Transmit Polarity Invert",
        (FireflyKind::Tx, 62..=67) => "Transmit Input Equalization",
        (FireflyKind::Tx, 95..=96) => "Mask TX LOS Alarms",
        (FireflyKind::Tx, 97..=98) => "Mask Fault Flags",
        _ => "*other/unknown*",
    }
}

/// Identification and monitor values of a module.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FireflyInfo {
    /// degC
    pub temperature: i8,
    /// V
    pub vcc: f64,
    /// h
    pub operating_time: u32,
    pub firmware_version: String,
    pub vendor_name: String,
    pub vendor_part_number: String,
    pub vendor_serial_number: String,
}

impl fmt::Display for FireflyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Temperature         : {} degC", self.temperature)?;
        writeln!(f, "Supply voltage      : {:.4} V", self.vcc)?;
        writeln!(f, "Operating time      : {} h", self.operating_time)?;
        writeln!(f, "Firmware version    : {}", self.firmware_version)?;
        writeln!(f, "Vendor name         : {}", self.vendor_name.trim_end())?;
        writeln!(f, "Vendor part number  : {}", self.vendor_part_number.trim_end())?;
        write!(f, "Vendor serial number: {}", self.vendor_serial_number.trim_end())
    }
}

fn format_firmware_version(raw: u64) -> String {
    let [_, _, _, _, a, b, c, d] = raw.to_be_bytes();
    format!("{a}.{b}.{c}.{d}")
}

pub struct Firefly<I: I2c> {
    i2c: I,
    address: u8,
    name: String,
    kind: FireflyKind,
}

impl<I: I2c> Firefly<I> {
    pub fn new(i2c: I, address: u8, name: impl Into<String>, kind: FireflyKind) -> Self {
        Self {
            i2c,
            address,
            name: name.into(),
            kind,
        }
    }

    pub fn kind(&self) -> FireflyKind {
        self.kind
    }

    pub async fn read_reg(&mut self, reg: u8) -> Result<u8> {
        let name = register_name(self.kind, reg);
        let mut buf = [0u8; 1];
        if let Err(e) = self.i2c.write_read(self.address, &[reg], &mut buf).await {
            error!(device = %self.name, error = %e,
                "Error reading the value of the \"{name}\", register address 0x{reg:02x}");
            return Err(e);
        }
        trace!(device = %self.name, value = %format!("0x{:02x}", buf[0]),
            "Read the value of the \"{name}\", register address 0x{reg:02x}");
        Ok(buf[0])
    }

    pub async fn write_reg(&mut self, reg: u8, value: u8) -> Result<()> {
        let name = register_name(self.kind, reg);
        trace!(device = %self.name, value = %format!("0x{value:02x}"),
            "Writing the \"{name}\" register, register address 0x{reg:02x}");
        if let Err(e) = self.i2c.write(self.address, &[reg, value]).await {
            error!(device = %self.name, error = %e,
                "Error writing 0x{value:02x} to the \"{name}\" register, register address 0x{reg:02x}");
            return Err(e);
        }
        Ok(())
    }

    fn check_range(&self, start: u8, end: u8) -> Result<()> {
        if start > end {
            return Err(HwError::InvalidParameter(format!(
                "{}: start address {start} larger than end address {end}",
                self.name
            )));
        }
        Ok(())
    }

    /// Registers `start..=end` as one big-endian integer. Every register is
    /// read; failed ones count as zero.
    pub async fn read_reg_range_int(&mut self, start: u8, end: u8) -> Result<Accumulated<u64>> {
        self.check_range(start, end)?;
        if usize::from(end - start) >= RANGE_INT_MAX {
            return Err(HwError::InvalidParameter(format!(
                "{}: register range {start}..{end} wider than {RANGE_INT_MAX} bytes",
                self.name
            )));
        }
        let mut acc = Accumulated::new(0u64);
        for reg in start..=end {
            let byte = self.read_reg(reg).await;
            let byte = acc.record(byte).unwrap_or(0);
            acc.value |= u64::from(byte) << (8 * u32::from(end - reg));
        }
        Ok(acc)
    }

    /// Registers `start..=end` as Latin-1 text.
    pub async fn read_reg_range_str(&mut self, start: u8, end: u8) -> Result<Accumulated<String>> {
        self.check_range(start, end)?;
        let mut acc = Accumulated::new(String::new());
        for reg in start..=end {
            let byte = self.read_reg(reg).await;
            let byte = acc.record(byte).unwrap_or(0);
            acc.value.push(char::from(byte));
        }
        Ok(acc)
    }

    /// Internal temperature in degC.
    pub async fn read_temperature(&mut self) -> Result<i8> {
        Ok(self.read_reg(regs::TEMPERATURE).await? as i8)
    }

    /// Supply voltage in V, 100 uV per LSB.
    pub async fn read_vcc(&mut self) -> Result<f64> {
        let raw = self.read_reg_range_int(regs::VCC, regs::VCC + 1).await?;
        Ok(raw.into_result()? as f64 * 0.0001)
    }

    /// Elapsed operating time in hours, 2 h per LSB.
    pub async fn read_operating_time(&mut self) -> Result<u32> {
        let raw = self
            .read_reg_range_int(regs::OPERATING_TIME, regs::OPERATING_TIME + 1)
            .await?;
        Ok(raw.into_result()? as u32 * 2)
    }

    /// Firmware version as `a.b.c.d`.
    pub async fn read_firmware_version(&mut self) -> Result<String> {
        let raw = self
            .read_reg_range_int(regs::FIRMWARE_VERSION, regs::FIRMWARE_VERSION + 3)
            .await?;
        Ok(format_firmware_version(raw.into_result()?))
    }

    async fn read_vendor_field(&mut self, range: std::ops::RangeInclusive<u8>) -> Result<String> {
        self.write_reg(regs::PAGE_SELECT, PAGE_VENDOR).await?;
        self.read_reg_range_str(*range.start(), *range.end())
            .await?
            .into_result()
    }

    pub async fn read_vendor_name(&mut self) -> Result<String> {
        self.read_vendor_field(VENDOR_NAME).await
    }

    pub async fn read_vendor_part_number(&mut self) -> Result<String> {
        self.read_vendor_field(VENDOR_PART_NUMBER).await
    }

    pub async fn read_vendor_serial_number(&mut self) -> Result<String> {
        self.read_vendor_field(VENDOR_SERIAL_NUMBER).await
    }

    /// Hours spent in temperature bin `slot`, 5 min per LSB.
    pub async fn read_time_at_temperature(&mut self, slot: u8) -> Result<f64> {
        if !TIME_AT_TEMPERATURE_SLOTS.contains(&slot) {
            return Err(HwError::InvalidParameter(format!(
                "{}: temperature slot {slot} out of valid range {}..{}",
                self.name,
                TIME_AT_TEMPERATURE_SLOTS.start(),
                TIME_AT_TEMPERATURE_SLOTS.end()
            )));
        }
        self.write_reg(regs::PAGE_SELECT, PAGE_TIME_AT_TEMPERATURE)
            .await?;
        let start = 128 + 3 * slot;
        let raw = self.read_reg_range_int(start, start + 2).await?.into_result()?;
        Ok(raw as f64 * 5.0 / 60.0)
    }

    /// Monitor values and vendor information. Every field is attempted.
    pub async fn read_info(&mut self) -> Accumulated<FireflyInfo> {
        let mut acc = Accumulated::new(FireflyInfo::default());

        let v = self.read_temperature().await;
        acc.value.temperature = acc.record(v).unwrap_or_default();
        let v = self.read_vcc().await;
        acc.value.vcc = acc.record(v).unwrap_or_default();
        let v = self.read_operating_time().await;
        acc.value.operating_time = acc.record(v).unwrap_or_default();
        let v = self.read_firmware_version().await;
        acc.value.firmware_version = acc.record(v).unwrap_or_default();
        let v = self.read_vendor_name().await;
        acc.value.vendor_name = acc.record(v).unwrap_or_default();
        let v = self.read_vendor_part_number().await;
        acc.value.vendor_part_number = acc.record(v).unwrap_or_default();
        let v = self.read_vendor_serial_number().await;
        acc.value.vendor_serial_number = acc.record(v).unwrap_or_default();

        acc
    }
}

#[async_trait]
impl<I: I2c> Device for Firefly<I> {
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
        let temperature = self.read_temperature().await?;
        let vcc = self.read_vcc().await?;
        let operating_time = self.read_operating_time().await?;
        Ok(DeviceStatus::new(&*self)
            .with("type", self.kind)
            .with("temperature", format!("{temperature} degC"))
            .with("supply voltage", format!("{vcc:.4} V"))
            .with("operating time", format!("{operating_time} h")))
    }
}
