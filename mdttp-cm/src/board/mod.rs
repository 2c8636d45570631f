//! Board-level view of the Command Module.
//!
//! [`MdtTpCm`] owns the MCU link, one bus proxy per I2C port and the drivers
//! of the devices fitted on the board. Its operations return typed reports
//! from [`report`] that print the way the bring-up tools always have and
//! serialise to JSON.

pub mod mdttp_cm;
pub mod report;

pub use mdttp_cm::{BusMapEntry, MdtTpCm};
