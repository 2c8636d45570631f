//! ClockBuilder Pro register map files.
//!
//! The export is a CSV-like text file:
//!
//! ```text
//! # Si5345 register map
//! Address,Data
//! 0x0B24,0xC0
//! 0x0B25,0x00
//! # Delay 300 msec
//! 0x0540,0x01
//! ```
//!
//! Addresses are 16 bits: the high byte selects the page (written to
//! register 0x01), the low byte is the register within the page. Values may
//! also be written in assembler notation (`2Ah`). A `Delay` marker asks for
//! a 300 ms pause while the device calibrates.

use std::path::Path;
use std::time::Duration;

use crate::{
    hw_trait::{HwError, Result, i2c::I2c},
    tracing::prelude::*,
    transport::parse_auto_int,
};

/// Page select register, common to all pages.
pub const PAGE_REGISTER: u8 = 0x01;

/// Pause requested by a `Delay` marker.
pub const DELAY: Duration = Duration::from_millis(300);

const COMMENT: char = '#';

/// One actionable line of a register map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegMapEntry {
    Delay,
    Write { page: u8, reg: u8, data: u8 },
}

/// A line that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line number.
    pub line: usize,
    /// Line content without comment.
    pub content: String,
    pub reason: String,
}

fn parse_value(element: &str) -> std::result::Result<u32, String> {
    let parsed = if element.contains('h') {
        u32::from_str_radix(element.trim_matches('h'), 16).ok()
    } else {
        parse_auto_int(element)
    };
    parsed.ok_or_else(|| format!("invalid number `{element}'"))
}

/// Parse one line. Blank lines, comments and the `Address,Data` header
/// yield `None`.
pub fn parse_line(line: &str) -> std::result::Result<Option<RegMapEntry>, String> {
    if line.trim().find("Delay") == Some(2) {
        return Ok(Some(RegMapEntry::Delay));
    }
    let content = without_comment(line);

    let elements: Vec<&str> = content
        .split(',')
        .filter(|el| !el.is_empty())
        .map(str::trim)
        .collect();
    let Some(first) = elements.first() else {
        return Ok(None);
    };
    if first.eq_ignore_ascii_case("address") {
        return Ok(None);
    }
    if elements.len() < 2 {
        return Err("expected address and data".to_string());
    }

    let address = parse_value(elements[0])?;
    let data = parse_value(elements[1])?;
    Ok(Some(RegMapEntry::Write {
        page: ((address >> 8) & 0xff) as u8,
        reg: (address & 0xff) as u8,
        data: (data & 0xff) as u8,
    }))
}

fn without_comment(line: &str) -> &str {
    let stripped = line.trim();
    match stripped.find(COMMENT) {
        Some(pos) => stripped[..pos].trim(),
        None => stripped,
    }
}

/// Actionable entries of a register map with their line numbers. Parsing
/// stops at the first bad line.
pub fn entries(text: &str) -> impl Iterator<Item = std::result::Result<(usize, RegMapEntry), ParseError>> + '_ {
    let mut failed = false;
    text.lines()
        .enumerate()
        .filter_map(move |(index, line)| {
            if failed {
                return None;
            }
            match parse_line(line) {
                Ok(entry) => entry.map(|e| Ok((index + 1, e))),
                Err(reason) => {
                    failed = true;
                    Some(Err(ParseError {
                        line: index + 1,
                        content: without_comment(line).to_string(),
                        reason,
                    }))
                }
            }
        })
}

fn file_error(file: &str, reason: impl Into<String>) -> HwError {
    HwError::RegisterMap {
        file: file.to_string(),
        line: 0,
        content: String::new(),
        reason: reason.into(),
    }
}

/// Read a register map file.
pub async fn read_file(path: &Path) -> Result<String> {
    let file = path.display().to_string();
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| file_error(&file, "the register map file does not exist"))?;
    if !meta.is_file() {
        return Err(file_error(&file, "the register map file is not a file"));
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| file_error(&file, format!("cannot open the register map file: {e}")))
}

/// Write every entry of `text` to the device at `address`.
///
/// `file` only labels errors. The first failing line stops the replay.
pub async fn replay<I: I2c>(
    i2c: &mut I,
    address: u8,
    device: &str,
    file: &str,
    text: &str,
) -> Result<usize> {
    let mut writes = 0;
    for item in entries(text) {
        let (line, entry) = item.map_err(|e| {
            error!(device, file, line = e.line, "Invalid register map line `{}': {}", e.content, e.reason);
            HwError::RegisterMap {
                file: file.to_string(),
                line: e.line,
                content: e.content,
                reason: e.reason,
            }
        })?;

        match entry {
            RegMapEntry::Delay => {
                trace!(device, line, "Delay found, delaying {} ms", DELAY.as_millis());
                tokio::time::sleep(DELAY).await;
            }
            RegMapEntry::Write { page, reg, data } => {
                let result = match i2c.write(address, &[PAGE_REGISTER, page]).await {
                    Ok(()) => i2c.write(address, &[reg, data]).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    let content = text.lines().nth(line - 1).map(without_comment).unwrap_or_default();
                    error!(device, file, line, error = %e,
                        "Error sending data of register map file: {content}");
                    return Err(HwError::RegisterMap {
                        file: file.to_string(),
                        line,
                        content: content.to_string(),
                        reason: e.to_string(),
                    });
                }
                writes += 1;
            }
        }
    }
    debug!(device, file, writes, "Register map loaded");
    Ok(writes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::testing::MockI2c;
    use test_case::test_case;

    const ADDR: u8 = 0x68;

    #[test_case("0x0B24,0xC0", Some(RegMapEntry::Write { page: 0x0b, reg: 0x24, data: 0xc0 }); "hex")]
    #[test_case("100h,2Ah", Some(RegMapEntry::Write { page: 0x01, reg: 0x00, data: 0x2a }); "assembler hex")]
    #[test_case("  0x0001 , 5 # page", Some(RegMapEntry::Write { page: 0x00, reg: 0x01, data: 5 }); "spaces and comment")]
    #[test_case("0x0540,0x101", Some(RegMapEntry::Write { page: 0x05, reg: 0x40, data: 0x01 }); "data masked")]
    #[test_case("Address,Data", None; "header")]
    #[test_case("ADDRESS , DATA", None; "header upper case")]
    #[test_case("# Si5345 Rev D", None; "comment")]
    #[test_case("   ", None; "blank")]
    #[test_case(",,", None; "only separators")]
    #[test_case("# Delay 300 msec", Some(RegMapEntry::Delay); "delay")]
    fn lines(line: &str, expected: Option<RegMapEntry>) {
        assert_eq!(parse_line(line).unwrap(), expected);
    }

    #[test_case("0x0B24"; "missing data")]
    #[test_case("0x0B24,zz"; "bad number")]
    #[test_case("foo,bar"; "words")]
    fn bad_lines(line: &str) {
        assert!(parse_line(line).is_err());
    }

    #[test]
    fn delay_only_at_offset_two() {
        assert_eq!(parse_line("#Delay 300 msec").unwrap(), None);
    }

    #[test]
    fn entries_carry_line_numbers() {
        let text = "# header\nAddress,Data\n0x0001,0x00\n\n0x0B24,0xC0\n";
        let got: Vec<_> = entries(text).map(|e| e.unwrap().0).collect();
        assert_eq!(got, vec![3, 5]);
    }

    #[test]
    fn entries_stop_at_first_error() {
        let text = "0x0001,0x00\nbogus line\n0x0002,0x00\n";
        let got: Vec<_> = entries(text).collect();
        assert_eq!(got.len(), 2);
        let err = got[1].clone().unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.content, "bogus line");
    }

    #[tokio::test]
    async fn replay_writes_page_then_register() {
        let mut bus = MockI2c::new(6);
        let n = replay(&mut bus, ADDR, "IC85 (Si5345)", "test.txt", "100h,2Ah\n")
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(bus.writes(), vec![vec![0x01, 0x01], vec![0x00, 0x2a]]);
    }

    #[tokio::test]
    async fn replay_reports_failing_line() {
        let mut bus = MockI2c::new(6);
        // Second line, register write.
        bus.fail_access(3);
        let text = "0x0B24,0xC0\n0x0B25,0x00 # second\n0x0B26,0x00\n";
        match replay(&mut bus, ADDR, "IC85 (Si5345)", "map.txt", text).await {
            Err(HwError::RegisterMap { file, line, content, .. }) => {
                assert_eq!(file, "map.txt");
                assert_eq!(line, 2);
                assert_eq!(content, "0x0B25,0x00");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(bus.access_count(), 4);
    }

    #[tokio::test]
    async fn replay_reports_parse_error_before_writing_on() {
        let mut bus = MockI2c::new(6);
        let text = "0x0B24,0xC0\n0x0B25\n0x0B26,0x00\n";
        let err = replay(&mut bus, ADDR, "IC85", "map.txt", text).await.unwrap_err();
        assert!(matches!(err, HwError::RegisterMap { line: 2, .. }));
        assert_eq!(bus.access_count(), 2);
    }

    #[tokio::test]
    async fn replay_sleeps_on_delay() {
        let mut bus = MockI2c::new(6);
        let start = std::time::Instant::now();
        replay(&mut bus, ADDR, "IC85", "map.txt", "0x0001,0x00\n# Delay 300 msec\n0x0002,0x00\n")
            .await
            .unwrap();
        assert!(start.elapsed() >= DELAY);
        assert_eq!(bus.access_count(), 4);
    }

    #[tokio::test]
    async fn read_file_rejects_missing_and_directories() {
        assert!(matches!(
            read_file(Path::new("/nonexistent/regmap.txt")).await,
            Err(HwError::RegisterMap { .. })
        ));
        assert!(read_file(&std::env::temp_dir()).await.is_err());
    }
}
