//! Unit types shared by drivers and reports.

mod frequency;

pub use frequency::Frequency;
