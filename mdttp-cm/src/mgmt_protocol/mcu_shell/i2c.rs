//! I2C bus access through the MCU shell.

use async_trait::async_trait;
use std::fmt::Write as _;

use super::channel::{McuChannel, McuReply, exchange_locked};
use super::{I2C_MAX_READ, I2C_MAX_WRITE, I2C_PORTS, access};
use crate::hw_trait::i2c::{I2c, I2cError};
use crate::hw_trait::{HwError, Result};
use crate::tracing::prelude::*;
use crate::transport::{McuSerial, parse_auto_int};

/// Read attempts allowed for a bus scan. The MCU prints found addresses as
/// it probes, so the reply line only completes after the whole scan.
const DETECT_READ_BUDGET: usize = 2000;

/// Probe method of `i2c-det`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DetectMode {
    #[default]
    Auto = 0,
    Quick = 1,
    Read = 2,
}

/// One MCU I2C master port, as an [`I2c`] bus.
#[derive(Clone)]
pub struct McuI2c {
    channel: McuChannel,
    port: u8,
}

impl McuI2c {
    /// Bus handle for `port`. The port is checked on every access, not
    /// here, so handles for unwired ports can exist.
    pub fn new(channel: McuChannel, port: u8) -> Self {
        Self { channel, port }
    }

    pub fn port(&self) -> u8 {
        self.port
    }

    fn check_port(&self) -> Result<()> {
        if I2C_PORTS.contains(&self.port) {
            Ok(())
        } else {
            Err(I2cError::InvalidPort(self.port).into())
        }
    }

    fn check_access(&self, addr: u8, len: usize, max: usize) -> Result<()> {
        self.check_port()?;
        if addr > 0x7f {
            return Err(HwError::InvalidParameter(format!(
                "I2C slave address 0x{addr:02x} is not a 7-bit address"
            )));
        }
        if len == 0 || len > max {
            return Err(I2cError::Length(format!("{len} bytes, must be 1 to {max}"))
            .into());
        }
        Ok(())
    }

    fn write_command(&self, addr: u8, acc: u8, data: &[u8]) -> String {
        let mut cmd = format!("i2c {} 0x{:02x} 0x{:x}", self.port, addr, acc);
        for byte in data {
            let _ = write!(cmd, " 0x{byte:02x}");
        }
        cmd
    }

    fn read_command(&self, addr: u8, acc: u8, len: usize) -> String {
        format!("i2c {} 0x{:02x} 0x{:x} {}", self.port, addr, acc, len)
    }

    fn bus_error(&self, reply: McuReply) -> HwError {
        error!(bus = self.port, response = %reply.full, "I2C access failed");
        I2cError::Bus {
            port: self.port,
            response: reply.full,
        }
        .into()
    }

    async fn transfer(&self, serial: &mut McuSerial, command: &str) -> Result<McuReply> {
        let reply = exchange_locked(serial, command, None).await?;
        if reply.outcome.is_ok() {
            Ok(reply)
        } else {
            Err(self.bus_error(reply))
        }
    }

    /// Copy the data bytes of a read reply into `buffer`.
    fn fill(&self, reply: &McuReply, buffer: &mut [u8]) -> Result<()> {
        if self.channel.is_simulated() {
            buffer.fill(0);
            return Ok(());
        }
        let data = parse_data(&reply.full)?;
        if data.len() != buffer.len() {
            return Err(I2cError::Malformed(format!(
                "expected {} data bytes, got {} in {:?}",
                buffer.len(),
                data.len(),
                reply.full
            ))
            .into());
        }
        buffer.copy_from_slice(&data);
        Ok(())
    }

    /// Scan the bus and return the addresses that answered.
    pub async fn detect_devices(&mut self, mode: DetectMode) -> Result<Vec<u8>> {
        self.check_port()?;
        let command = match mode {
            DetectMode::Auto => format!("i2c-det {}", self.port),
            _ => format!("i2c-det {} {}", self.port, mode as u8),
        };

        let mut serial = self.channel.lock().await;
        let reply = exchange_locked(&mut serial, &command, Some(DETECT_READ_BUDGET)).await?;
        if !reply.outcome.is_ok() {
            return Err(self.bus_error(reply));
        }
        if self.channel.is_simulated() {
            return Ok(Vec::new());
        }
        parse_detected(&reply.full)
    }
}

#[async_trait]
impl I2c for McuI2c {
    fn bus_index(&self) -> u8 {
        self.port
    }

    async fn write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        self.check_access(addr, data.len(), I2C_MAX_WRITE)?;
        let command = self.write_command(addr, access::WRITE, data);
        let mut serial = self.channel.lock().await;
        self.transfer(&mut serial, &command).await.map(|_| ())
    }

    async fn read(&mut self, addr: u8, buffer: &mut [u8]) -> Result<()> {
        self.check_access(addr, buffer.len(), I2C_MAX_READ)?;
        let command = self.read_command(addr, access::READ, buffer.len());
        let mut serial = self.channel.lock().await;
        let reply = self.transfer(&mut serial, &command).await?;
        self.fill(&reply, buffer)
    }

    async fn write_read(&mut self, addr: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.check_access(addr, write.len(), I2C_MAX_WRITE)?;
        self.check_access(addr, read.len(), I2C_MAX_READ)?;

        // The write leaves the bus claimed (no stop) and the read starts with
        // a repeated start. Nothing else may be sent in between.
        let write_cmd = self.write_command(addr, access::WRITE | access::NO_STOP, write);
        let read_cmd = self.read_command(
            addr,
            access::READ | access::REPEATED_START,
            read.len(),
        );

        let mut serial = self.channel.lock().await;
        self.transfer(&mut serial, &write_cmd).await?;
        let reply = self.transfer(&mut serial, &read_cmd).await?;
        self.fill(&reply, read)
    }
}

fn parse_byte(token: &str) -> Result<u8> {
    parse_auto_int(token)
        .and_then(|value| u8::try_from(value).ok())
        .ok_or_else(|| I2cError::Malformed(format!("invalid byte {token:?}")).into())
}

/// Bytes listed after `Data:` in an I2C read reply.
fn parse_data(reply: &str) -> Result<Vec<u8>> {
    let Some((_, data)) = reply.split_once("Data:") else {
        return Err(I2cError::Malformed(format!("no data in {reply:?}")).into());
    };
    data.split_whitespace().map(parse_byte).collect()
}

/// Addresses listed in an `i2c-det` reply.
fn parse_detected(reply: &str) -> Result<Vec<u8>> {
    let Some((_, found)) = reply.split_once("address:") else {
        return Err(I2cError::Malformed(format!("unexpected detect reply {reply:?}")).into());
    };
    found.split_whitespace().map(parse_byte).collect()
}
