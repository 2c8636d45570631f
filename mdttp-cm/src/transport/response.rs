//! Classification and parsing of MCU response blocks.

use serde::Serialize;
use std::fmt;

use crate::hw_trait::{HwError, Result};

/// Status of a response block, taken from its leading token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Warning,
    Error,
    Fatal,
    Unknown,
}

impl Outcome {
    /// Status tokens in the order they are tested.
    const TOKENS: [(&'static str, Outcome); 4] = [
        ("OK", Outcome::Ok),
        ("WARNING", Outcome::Warning),
        ("ERROR", Outcome::Error),
        ("FATAL", Outcome::Fatal),
    ];

    /// Classify a response block by prefix.
    pub fn classify(block: &str) -> Self {
        Self::TOKENS
            .iter()
            .find(|(token, _)| block.starts_with(token))
            .map(|(_, outcome)| *outcome)
            .unwrap_or(Outcome::Unknown)
    }

    /// Numeric code as printed by the command-line tool.
    pub fn code(self) -> i8 {
        match self {
            Outcome::Ok => 0,
            Outcome::Warning => 1,
            Outcome::Error => 2,
            Outcome::Fatal => 3,
            Outcome::Unknown => -1,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Outcome::Ok
    }

    /// The status token, if this outcome has one.
    pub fn token(self) -> Option<&'static str> {
        Self::TOKENS
            .iter()
            .find(|(_, outcome)| *outcome == self)
            .map(|(token, _)| *token)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token().unwrap_or("UNKNOWN"))
    }
}

/// Payload of a response block: the status token and the one character
/// after it are removed, then surrounding whitespace.
///
/// Blocks without a known status token are only trimmed.
pub fn strip_status(block: &str) -> &str {
    for (token, _) in Outcome::TOKENS {
        if let Some(rest) = block.strip_prefix(token) {
            let mut chars = rest.chars();
            chars.next();
            return chars.as_str().trim();
        }
    }
    block.trim()
}

/// Parse an integer with automatic base detection.
///
/// `0x` selects hex, `0o` or a bare leading `0` octal, `0b` binary, anything
/// else decimal. A leading `0` meaning octal is intended: the firmware
/// parses every numeric shell argument with `strtoul(.., 0)`, so `017` on
/// the command line is 15 to the MCU and must read back the same way.
pub fn parse_auto_int(token: &str) -> Option<u32> {
    let token = token.trim();
    let token = token.strip_prefix('+').unwrap_or(token);
    let lower = token.to_ascii_lowercase();

    let (digits, radix) = if let Some(hex) = lower.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (bin, 2)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (&lower[1..], 8)
    } else {
        (lower.as_str(), 10)
    };

    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}

/// Extract the trailing integer of a complete `OK` response block.
///
/// The block is split on spaces; the first token, with any colon removed,
/// must be `OK` and the last token is parsed with [`parse_auto_int`].
pub fn str2int(block: &str) -> Result<u32> {
    let malformed = || HwError::Malformed(format!("expected `OK ... <number>`, got {block:?}"));
    let tokens: Vec<&str> = block.trim().split(' ').filter(|t| !t.is_empty()).collect();
    if tokens.len() < 2 || tokens[0].replace(':', "") != "OK" {
        return Err(malformed());
    }
    tokens
        .last()
        .and_then(|last| parse_auto_int(last))
        .ok_or_else(malformed)
}
