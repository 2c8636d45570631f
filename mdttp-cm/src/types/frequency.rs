//! Frequency type for oscillator and clock generator outputs.
//!
//! Stored as whole Hz. Oscillator readouts are computed in floating point
//! and rounded to the nearest Hz on construction.
//!
//! # Example
//!
//! ```
//! use mdttp_cm::types::Frequency;
//!
//! let freq = Frequency::from_mhz(240.474);
//! assert_eq!(freq.hz(), 240_474_000);
//! assert_eq!(freq.to_string(), "240.474000 MHz");
//! ```

use serde::Serialize;
use std::fmt;

/// Frequency in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Frequency {
    hz: u64,
}

impl Frequency {
    pub fn from_hz(hz: u64) -> Self {
        Self { hz }
    }

    /// Frequency from MHz, rounded to the nearest Hz. Negative or non-finite
    /// input gives zero.
    pub fn from_mhz(mhz: f64) -> Self {
        let hz = (mhz * 1_000_000.0).round();
        Self {
            hz: if hz.is_finite() && hz > 0.0 { hz as u64 } else { 0 },
        }
    }

    pub fn hz(&self) -> u64 {
        self.hz
    }

    pub fn mhz(&self) -> f64 {
        self.hz as f64 / 1_000_000.0
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6} MHz", self.mhz())
    }
}
