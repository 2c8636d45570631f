//! Peripheral chip drivers.
//!
//! Drivers for the I2C devices on the Command Module and its plug-in
//! parts: serial number chip (DS28CM00), temperature sensors (MCP9902),
//! core power regulators (LTM4700), I/O expander (PCA9535), bus
//! multiplexer (PCA9545), clock generators (Si53xx, Si598) and FireFly
//! optical transceivers. All drivers are generic over [`I2c`], check
//! register addresses before touching the bus, and report failures as
//! [`HwError`].
//!
//! [`I2c`]: crate::hw_trait::I2c

pub mod ds28cm00;
pub mod firefly;
pub mod ltm4700;
pub mod mcp9902;
pub mod pca9535;
pub mod pca9545;
pub mod pmbus;
pub mod regmap;
pub mod si53xx;
pub mod si598;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::hw_trait::{HwError, Result};

/// Common view of a driver for board-level status collection.
#[async_trait]
pub trait Device: Send {
    /// Board designator, e.g. "IC22 (DS28CM00)".
    fn device_name(&self) -> &str;

    fn bus_index(&self) -> u8;

    fn address(&self) -> u8;

    /// Read the device's characteristic values.
    async fn read_status(&mut self) -> Result<DeviceStatus>;
}

/// One named value of a [`DeviceStatus`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    pub name: String,
    pub value: String,
}

/// Status snapshot of one device, as name/value pairs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub device: String,
    pub bus: u8,
    pub address: u8,
    pub entries: Vec<StatusEntry>,
}

impl DeviceStatus {
    pub fn new<D: Device + ?Sized>(device: &D) -> Self {
        Self {
            device: device.device_name().to_string(),
            bus: device.bus_index(),
            address: device.address(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        self.entries.push(StatusEntry {
            name: name.into(),
            value: value.to_string(),
        });
    }

    pub fn with(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.push(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (bus {}, address 0x{:02x})",
            self.device, self.bus, self.address
        )?;
        for entry in &self.entries {
            write!(f, "\n  {:<28}: {}", entry.name, entry.value)?;
        }
        Ok(())
    }
}

/// Result of a multi-step read that keeps going after a failed step.
///
/// `value` holds whatever could be read; steps that failed leave their
/// part at the fallback value and add to `errors`.
#[derive(Debug)]
pub struct Accumulated<T> {
    pub value: T,
    pub errors: Vec<HwError>,
}

impl<T> Accumulated<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            errors: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Keep the value of a successful step, or record its error.
    pub fn record<U>(&mut self, step: Result<U>) -> Option<U> {
        match step {
            Ok(v) => Some(v),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    /// The value if every step succeeded, otherwise the first error.
    pub fn into_result(self) -> Result<T> {
        match self.errors.into_iter().next() {
            None => Ok(self.value),
            Some(e) => Err(e),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Accumulated<U> {
        Accumulated {
            value: f(self.value),
            errors: self.errors,
        }
    }
}

/// Check `reg` against a closed register range.
pub(crate) fn check_register(
    device: &str,
    reg: u16,
    range: std::ops::RangeInclusive<u16>,
) -> Result<()> {
    if range.contains(&reg) {
        Ok(())
    } else {
        Err(HwError::InvalidParameter(format!(
            "{device}: register address 0x{reg:02x} out of valid range 0x{:02x}..0x{:02x}",
            range.start(),
            range.end()
        )))
    }
}
