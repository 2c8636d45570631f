//! PCA9545 4-channel I2C bus multiplexer driver.
//!
//! The device has a single control register, accessed without a register
//! pointer. Bits 3..0 enable the downstream channels, bits 7..4 reflect
//! the channels' interrupt inputs.

use async_trait::async_trait;

use super::{Device, DeviceStatus};
use crate::{
    hw_trait::{HwError, Result, i2c::I2c},
    tracing::prelude::*,
};

pub const CHANNELS: std::ops::RangeInclusive<u8> = 0..=3;

const CHANNEL_MASK: u8 = 0x0f;
const INTERRUPT_SHIFT: u8 = 4;

pub struct Pca9545<I: I2c> {
    i2c: I,
    address: u8,
    name: String,
}

impl<I: I2c> Pca9545<I> {
    pub fn new(i2c: I, address: u8, name: impl Into<String>) -> Self {
        Self {
            i2c,
            address,
            name: name.into(),
        }
    }

    async fn write_control(&mut self, control: u8) -> Result<()> {
        trace!(device = %self.name, value = %format!("0x{control:02x}"), "Setting the control register");
        if let Err(e) = self.i2c.write(self.address, &[control]).await {
            error!(device = %self.name, error = %e,
                "Error setting the control register to 0x{control:02x}");
            return Err(e);
        }
        Ok(())
    }

    async fn read_control(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        if let Err(e) = self.i2c.read(self.address, &mut buf).await {
            error!(device = %self.name, error = %e, "Error reading the control register");
            return Err(e);
        }
        Ok(buf[0])
    }

    /// Enable exactly `channels`; all others are disabled.
    pub async fn set_channels(&mut self, channels: &[u8]) -> Result<()> {
        let mut control = 0u8;
        for &ch in channels {
            if !CHANNELS.contains(&ch) {
                return Err(HwError::InvalidParameter(format!(
                    "{}: channel number {ch} out of valid range {}..{}",
                    self.name,
                    CHANNELS.start(),
                    CHANNELS.end()
                )));
            }
            control |= 1 << ch;
        }
        self.write_control(control & CHANNEL_MASK).await
    }

    pub async fn disable(&mut self) -> Result<()> {
        debug!(device = %self.name, "Disabling all channels");
        self.write_control(0x00).await
    }

    /// Currently enabled channels, ascending.
    pub async fn get_channels(&mut self) -> Result<Vec<u8>> {
        let control = self.read_control().await?;
        Ok(CHANNELS.filter(|ch| control & (1 << ch) != 0).collect())
    }

    /// Channels with a pending interrupt, ascending.
    pub async fn get_interrupts(&mut self) -> Result<Vec<u8>> {
        let control = self.read_control().await?;
        Ok(CHANNELS
            .filter(|ch| control & (1 << (ch + INTERRUPT_SHIFT)) != 0)
            .collect())
    }
}

#[async_trait]
impl<I: I2c> Device for Pca9545<I> {
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
        let channels = self.get_channels().await?;
        let interrupts = self.get_interrupts().await?;
        Ok(DeviceStatus::new(&*self)
            .with("enabled channels", format!("{channels:?}"))
            .with("interrupts", format!("{interrupts:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::testing::MockI2c;

    const ADDR: u8 = 0x70;

    fn mux() -> (MockI2c, Pca9545<MockI2c>) {
        let bus = MockI2c::new(3);
        bus.single_register(ADDR);
        (bus.clone(), Pca9545::new(bus, ADDR, "MUX"))
    }

    #[tokio::test]
    async fn set_and_get_channels() {
        let (bus, mut dev) = mux();
        dev.set_channels(&[3, 0, 3]).await.unwrap();
        assert_eq!(bus.writes(), vec![vec![0x09]]);
        assert_eq!(dev.get_channels().await.unwrap(), vec![0, 3]);
    }

    #[tokio::test]
    async fn disable_writes_zero() {
        let (bus, mut dev) = mux();
        dev.set_channels(&[1]).await.unwrap();
        dev.disable().await.unwrap();
        assert_eq!(bus.writes().last(), Some(&vec![0x00]));
        assert!(dev.get_channels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn interrupts_from_upper_nibble() {
        let (bus, mut dev) = mux();
        bus.set_reg(ADDR, 0, 0xa1);
        assert_eq!(dev.get_interrupts().await.unwrap(), vec![1, 3]);
        assert_eq!(dev.get_channels().await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn invalid_channel_never_reaches_bus() {
        let (bus, mut dev) = mux();
        assert!(matches!(
            dev.set_channels(&[0, 4]).await,
            Err(HwError::InvalidParameter(_))
        ));
        assert_eq!(bus.access_count(), 0);
    }

    #[tokio::test]
    async fn read_failure_is_reported() {
        let (bus, mut dev) = mux();
        bus.fail_device(ADDR);
        assert!(dev.get_channels().await.is_err());
    }
}
