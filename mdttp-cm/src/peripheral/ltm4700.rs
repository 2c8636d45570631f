//! LTM4700 dual 50 A / single 100 A uModule regulator driver.
//!
//! The LTM4700 speaks PMBus. Channel specific commands (output voltage and
//! current, MFR_CHAN_CONFIG) act on the channel selected with PAGE; page
//! 0xFF addresses both channels at once.
//!
//! Datasheet: <https://www.analog.com/en/products/ltm4700.html>

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use super::pmbus::{self, cmd, l11_to_float, l16_to_float};
use super::{Accumulated, Device, DeviceStatus};
use crate::{
    hw_trait::{HwError, Result, i2c::I2c},
    tracing::prelude::*,
};

/// Channel specific configuration register (MFR_CHAN_CONFIG).
pub const MFR_CHAN_CONFIG: u8 = 0xd0;

/// PAGE value addressing all channels.
pub const PAGE_ALL: u8 = 0xff;

/// Number of output channels.
pub const CHANNELS: u8 = 2;

const DATA_LEN: std::ops::RangeInclusive<usize> = 1..=2;
const PAGE_RANGE: std::ops::RangeInclusive<u8> = 0..=1;

/// WRITE_PROTECT levels.
pub mod wp {
    pub const CLEAR: u8 = 0x00;
    /// Only WRITE_PROTECT, PAGE, MFR_EE_UNLOCK and STORE_USER_ALL writable.
    pub const LEVEL_1: u8 = 0x80;
    /// Level 1 plus MFR_CLEAR_PEAKS, OPERATION and CLEAR_FAULTS.
    pub const LEVEL_2: u8 = 0x40;
    /// Level 2 plus ON_OFF_CONFIG and VOUT_COMMAND.
    pub const LEVEL_3: u8 = 0x20;
}

/// ON_OFF_CONFIG used by the power sequence: respond to OPERATION only,
/// turn off immediately.
const ON_OFF_CONFIG_OPERATION: u8 = 0x1e;

const OPERATION_ON: u8 = 0x80;
const OPERATION_OFF: u8 = 0x00;

pub fn command_name(code: u8) -> &'static str {
    match code {
        cmd::PAGE => "PAGE",
        cmd::OPERATION => "OPERATION",
        cmd::ON_OFF_CONFIG => "ON_OFF_CONFIG",
        cmd::CLEAR_FAULTS => "CLEAR_FAULTS",
        cmd::WRITE_PROTECT => "WRITE_PROTECT",
        cmd::READ_VIN => "READ_VIN",
        cmd::READ_IIN => "READ_IIN",
        cmd::READ_VOUT => "READ_VOUT",
        cmd::READ_IOUT => "READ_IOUT",
        cmd::READ_TEMPERATURE_1 => "READ_TEMPERATURE_1",
        cmd::READ_TEMPERATURE_2 => "READ_TEMPERATURE_2",
        MFR_CHAN_CONFIG => "MFR_CHAN_CONFIG",
        0xfe..=0xff => "*reserved*",
        _ => "unknown",
    }
}

/// Telemetry snapshot of one regulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Ltm4700Status {
    /// External sensor temperature in degC.
    pub temp_ext: f32,
    /// Die temperature in degC.
    pub temp_int: f32,
    pub vin: f32,
    pub iin: f32,
    pub vout: [f32; CHANNELS as usize],
    pub iout: [f32; CHANNELS as usize],
}

impl fmt::Display for Ltm4700Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T(ext) = {:.1} degC, T(int) = {:.1} degC, Vin = {:.3} V, Iin = {:.3} A",
            self.temp_ext, self.temp_int, self.vin, self.iin
        )?;
        for ch in 0..CHANNELS as usize {
            write!(
                f,
                ", Vout{ch} = {:.3} V, Iout{ch} = {:.3} A",
                self.vout[ch], self.iout[ch]
            )?;
        }
        Ok(())
    }
}

pub struct Ltm4700<I: I2c> {
    i2c: I,
    address: u8,
    name: String,
    /// Last page written or read.
    page: u8,
    error_count: u32,
}

impl<I: I2c> Ltm4700<I> {
    pub fn new(i2c: I, address: u8, name: impl Into<String>) -> Self {
        Self {
            i2c,
            address,
            name: name.into(),
            page: 0,
            error_count: 0,
        }
    }

    /// Failed accesses since construction.
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn page(&self) -> u8 {
        self.page
    }

    fn check_data_len(&mut self, len: usize) -> Result<()> {
        if DATA_LEN.contains(&len) {
            return Ok(());
        }
        self.error_count += 1;
        Err(HwError::InvalidParameter(format!(
            "{}: data length {len} out of valid range {}..{}",
            self.name,
            DATA_LEN.start(),
            DATA_LEN.end()
        )))
    }

    fn check_page(&mut self, page: u8) -> Result<()> {
        if PAGE_RANGE.contains(&page) || page == PAGE_ALL {
            return Ok(());
        }
        self.error_count += 1;
        Err(HwError::InvalidParameter(format!(
            "{}: page {page} out of valid range {}..{} or 0x{PAGE_ALL:02x}",
            self.name,
            PAGE_RANGE.start(),
            PAGE_RANGE.end()
        )))
    }

    /// Read `len` data bytes of a command.
    pub async fn read(&mut self, code: u8, len: usize) -> Result<Vec<u8>> {
        self.check_data_len(len)?;
        let mut data = vec![0u8; len];
        if let Err(e) = self.i2c.write_read(self.address, &[code], &mut data).await {
            self.error_count += 1;
            error!(device = %self.name, error = %e,
                "Error reading the command 0x{code:02x} ({}) data", command_name(code));
            return Err(e);
        }
        trace!(device = %self.name, data = ?data,
            "Read the command 0x{code:02x} ({}) data", command_name(code));
        Ok(data)
    }

    /// Write command data. Writing PAGE also checks and records the page.
    pub async fn write(&mut self, code: u8, data: &[u8]) -> Result<()> {
        self.check_data_len(data.len())?;
        if code == cmd::PAGE {
            self.check_page(data[0])?;
            self.page = data[0];
        }
        trace!(device = %self.name, data = ?data,
            "Writing command 0x{code:02x} ({}) data", command_name(code));

        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(code);
        frame.extend_from_slice(data);
        if let Err(e) = self.i2c.write(self.address, &frame).await {
            self.error_count += 1;
            error!(device = %self.name, error = %e,
                "Error writing command 0x{code:02x} ({}) data", command_name(code));
            return Err(e);
        }
        Ok(())
    }

    async fn read_word(&mut self, code: u8) -> Result<u16> {
        let data = self.read(code, 2).await?;
        Ok(pmbus::word([data[0], data[1]]))
    }

    pub async fn set_page(&mut self, page: u8) -> Result<()> {
        self.check_page(page)?;
        self.write(cmd::PAGE, &[page]).await
    }

    pub async fn get_page(&mut self) -> Result<u8> {
        let page = self.read(cmd::PAGE, 1).await?[0];
        self.check_page(page)?;
        self.page = page;
        Ok(page)
    }

    pub async fn read_wp(&mut self) -> Result<u8> {
        Ok(self.read(cmd::WRITE_PROTECT, 1).await?[0])
    }

    pub async fn wp_clear(&mut self) -> Result<()> {
        self.write(cmd::WRITE_PROTECT, &[wp::CLEAR]).await
    }

    pub async fn wp_level_1(&mut self) -> Result<()> {
        self.write(cmd::WRITE_PROTECT, &[wp::LEVEL_1]).await
    }

    pub async fn wp_level_2(&mut self) -> Result<()> {
        self.write(cmd::WRITE_PROTECT, &[wp::LEVEL_2]).await
    }

    pub async fn wp_level_3(&mut self) -> Result<()> {
        self.write(cmd::WRITE_PROTECT, &[wp::LEVEL_3]).await
    }

    /// Switch all channels with a single OPERATION write on page 0xFF.
    ///
    /// Every step is attempted even if an earlier one failed. The saved
    /// write protection level is restored only if it could be read.
    async fn power_all(&mut self, operation: u8) -> Accumulated<()> {
        let mut acc = Accumulated::new(());

        let saved = self.read_wp().await;
        let saved = acc.record(saved);

        // ON_OFF_CONFIG is only writable below level 3.
        let step = self.wp_level_3().await;
        acc.record(step);
        let step = self.write(cmd::PAGE, &[PAGE_ALL]).await;
        acc.record(step);
        let step = self.write(cmd::ON_OFF_CONFIG, &[ON_OFF_CONFIG_OPERATION]).await;
        acc.record(step);
        let step = self.write(cmd::OPERATION, &[operation]).await;
        acc.record(step);

        match saved {
            Some(level) => {
                let step = self.write(cmd::WRITE_PROTECT, &[level]).await;
                acc.record(step);
            }
            None => warn!(device = %self.name, "Write protection level unknown, left at level 3"),
        }
        acc
    }

    /// Switch on both channels simultaneously.
    pub async fn power_on_all(&mut self) -> Result<()> {
        debug!(device = %self.name, "Switching on all channels");
        self.power_all(OPERATION_ON).await.into_result()
    }

    /// Switch off both channels simultaneously.
    pub async fn power_off_all(&mut self) -> Result<()> {
        debug!(device = %self.name, "Switching off all channels");
        self.power_all(OPERATION_OFF).await.into_result()
    }

    /// Input supply voltage in V.
    pub async fn read_vin(&mut self) -> Result<f32> {
        Ok(l11_to_float(self.read_word(cmd::READ_VIN).await?))
    }

    /// Input supply current in A.
    pub async fn read_iin(&mut self) -> Result<f32> {
        Ok(l11_to_float(self.read_word(cmd::READ_IIN).await?))
    }

    /// Output voltage of `channel` in V.
    pub async fn read_vout(&mut self, channel: u8) -> Result<f32> {
        self.set_page(channel).await?;
        Ok(l16_to_float(self.read_word(cmd::READ_VOUT).await?))
    }

    /// Average output current of `channel` in A.
    pub async fn read_iout(&mut self, channel: u8) -> Result<f32> {
        self.set_page(channel).await?;
        Ok(l11_to_float(self.read_word(cmd::READ_IOUT).await?))
    }

    /// External sensor temperature in degC.
    pub async fn read_temp_ext(&mut self) -> Result<f32> {
        Ok(l11_to_float(self.read_word(cmd::READ_TEMPERATURE_1).await?))
    }

    /// Die temperature in degC.
    pub async fn read_temp_int(&mut self) -> Result<f32> {
        Ok(l11_to_float(self.read_word(cmd::READ_TEMPERATURE_2).await?))
    }

    pub async fn read_mfr_config(&mut self, channel: u8) -> Result<u16> {
        self.set_page(channel).await?;
        self.read_word(MFR_CHAN_CONFIG).await
    }

    /// Read all telemetry; the first failure aborts.
    pub async fn read_telemetry(&mut self) -> Result<Ltm4700Status> {
        let mut status = Ltm4700Status {
            temp_ext: self.read_temp_ext().await?,
            temp_int: self.read_temp_int().await?,
            vin: self.read_vin().await?,
            iin: self.read_iin().await?,
            ..Default::default()
        };
        for ch in 0..CHANNELS {
            status.vout[ch as usize] = self.read_vout(ch).await?;
        }
        for ch in 0..CHANNELS {
            status.iout[ch as usize] = self.read_iout(ch).await?;
        }
        Ok(status)
    }
}

#[async_trait]
impl<I: I2c> Device for Ltm4700<I> {
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
        let t = self.read_telemetry().await?;
        let mut status = DeviceStatus::new(&*self)
            .with("external temperature", format!("{:.1} degC", t.temp_ext))
            .with("internal temperature", format!("{:.1} degC", t.temp_int))
            .with("input voltage", format!("{:.3} V", t.vin))
            .with("input current", format!("{:.3} A", t.iin));
        for ch in 0..CHANNELS as usize {
            status.push(format!("output voltage {ch}"), format!("{:.3} V", t.vout[ch]));
            status.push(format!("output current {ch}"), format!("{:.3} A", t.iout[ch]));
        }
        Ok(status)
    }
}
