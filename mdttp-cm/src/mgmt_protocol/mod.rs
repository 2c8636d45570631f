//! Management protocols spoken to on-board controllers.
//!
//! The Command Module exposes its I2C buses and GPIOs only through the text
//! shell of its bridge MCU, so this is the one protocol implemented here.

pub mod mcu_shell;
