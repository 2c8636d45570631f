//! Serial link to the Command Module MCU.
//!
//! The MCU firmware runs a line-oriented shell on its UART. A command is a
//! line of text; the reply is a block of text lines terminated by the prompt
//! `"> "`. This module turns that byte stream into one response block per
//! command and classifies it by its leading status token.

pub mod codec;
pub mod response;
pub mod serial;

#[cfg(test)]
pub(crate) mod testing;

pub use codec::{McuLine, McuLineCodec, PROMPT};
pub use response::{Outcome, parse_auto_int, str2int, strip_status};
pub use serial::{McuSerial, SIMULATED_NOTICE, SIMULATED_RESPONSE, TransportError, TransportStats};
