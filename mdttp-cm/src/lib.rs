//! Bring-up and diagnostics for the ATLAS MDT Trigger Processor Command
//! Module, driven through the shell of its bridge MCU.

pub mod board;
pub mod config;
pub mod error;
pub mod hw_trait;
pub mod mgmt_protocol;
pub mod peripheral;
pub mod tracing;
pub mod transport;
pub mod types;
