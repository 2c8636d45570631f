//! DS28CM00 silicon serial number driver.
//!
//! The DS28CM00 holds a factory-programmed 64-bit ROM: an 8-bit family
//! code, a 48-bit serial number and a CRC-8 over both.
//!
//! Datasheet: <https://www.analog.com/en/products/ds28cm00.html>

use async_trait::async_trait;
use crc_all::CrcAlgo;
use serde::Serialize;

use super::{Accumulated, Device, DeviceStatus, check_register};
use crate::{
    hw_trait::{Result, i2c::I2c},
    tracing::prelude::*,
};

/// Register addresses.
pub mod regs {
    pub const FAMILY_CODE: u8 = 0x00;
    /// First of six serial number bytes, least significant first.
    pub const SERIAL_NUMBER: u8 = 0x01;
    pub const CRC: u8 = 0x07;
    pub const CONTROL: u8 = 0x08;
}

const REG_RANGE: std::ops::RangeInclusive<u16> = 0x00..=0x08;

/// Dallas/Maxim 1-Wire CRC-8, x^8 + x^5 + x^4 + 1 processed LSB first.
const CRC8_MAXIM: CrcAlgo<u8> = CrcAlgo::<u8>::new(
    0x31, // polynomial (0x8c reflected)
    8,    // width
    0,    // init
    0,    // xorout
    true, // reflect
);

pub fn register_name(reg: u8) -> &'static str {
    match reg {
        0x00 => "device family code",
        0x01 => "serial number, bits 0 to 7",
        0x02 => "serial number, bits 8 to 15",
        0x03 => "serial number, bits 16 to 23",
        0x04 => "serial number, bits 24 to 31",
        0x05 => "serial number, bits 32 to 39",
        0x06 => "serial number, bits 40 to 47",
        0x07 => "CRC of family code and 48-bit serial number",
        0x08 => "control register",
        _ => "*other/unknown*",
    }
}

/// CRC over the family code and the 48-bit serial number, as stored in
/// register 0x07.
pub fn crc_calc(family_code: u8, serial_number: u64) -> u8 {
    let mut data = [0u8; 7];
    data[0] = family_code;
    data[1..].copy_from_slice(&serial_number.to_le_bytes()[..6]);

    let mut crc = 0u8;
    CRC8_MAXIM.update_crc(&mut crc, &data);
    CRC8_MAXIM.finish_crc(&crc)
}

/// Contents of the serial number ROM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SerialNumberInfo {
    pub family_code: u8,
    pub serial_number: u64,
    pub crc: u8,
    /// Stored CRC does not match the one computed over the read data.
    pub crc_error: bool,
}

pub struct Ds28cm00<I: I2c> {
    i2c: I,
    address: u8,
    name: String,
}

impl<I: I2c> Ds28cm00<I> {
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
            error!(device = %self.name, reg = %format!("0x{reg:02x}"), error = %e,
                "Error reading the {}", register_name(reg));
            return Err(e);
        }
        trace!(device = %self.name, reg = %format!("0x{reg:02x}"), value = %format!("0x{:02x}", buf[0]),
            "Read the {}", register_name(reg));
        Ok(buf[0])
    }

    pub async fn write_reg(&mut self, reg: u8, value: u8) -> Result<()> {
        check_register(&self.name, reg.into(), REG_RANGE)?;
        trace!(device = %self.name, reg = %format!("0x{reg:02x}"), value = %format!("0x{value:02x}"),
            "Writing the {}", register_name(reg));
        self.i2c.write(self.address, &[reg, value]).await
    }

    /// Read family code, serial number and CRC.
    ///
    /// All registers are read even if some fail; failed bytes count as zero
    /// and the errors are returned alongside.
    pub async fn read_all(&mut self) -> Accumulated<SerialNumberInfo> {
        let mut acc = Accumulated::new(SerialNumberInfo::default());

        let family_code = self.read_reg(regs::FAMILY_CODE).await;
        acc.value.family_code = acc.record(family_code).unwrap_or(0);

        for i in 0..6u8 {
            let byte = self.read_reg(regs::SERIAL_NUMBER + i).await;
            let byte = acc.record(byte).unwrap_or(0);
            acc.value.serial_number |= u64::from(byte) << (8 * i);
        }

        let crc = self.read_reg(regs::CRC).await;
        acc.value.crc = acc.record(crc).unwrap_or(0);
        acc.value.crc_error =
            acc.value.crc != crc_calc(acc.value.family_code, acc.value.serial_number);

        if acc.value.crc_error {
            warn!(device = %self.name, "CRC error detected on serial number");
        }
        acc
    }
}

#[async_trait]
impl<I: I2c> Device for Ds28cm00<I> {
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
        let info = self.read_all().await.into_result()?;
        Ok(DeviceStatus::new(&*self)
            .with("family code", format!("0x{:02x}", info.family_code))
            .with("serial number", format!("0x{:012x}", info.serial_number))
            .with("CRC", format!("0x{:02x}", info.crc))
            .with("CRC error", info.crc_error))
    }
}
