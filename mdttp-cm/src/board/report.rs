//! Reports returned by the board operations.

use serde::Serialize;
use std::fmt;

use crate::peripheral::{DeviceStatus, ds28cm00::SerialNumberInfo, ltm4700::Ltm4700Status};
use crate::peripheral::mcp9902::TEMP_READ_FAILED;
use crate::transport::TransportStats;

/// Rails and power managers reported by `gpio power-good`, by bit.
pub const POWER_GOOD_RAILS: [(u32, &str); 10] = [
    (0x001, "P0V85 (FPGA core, 0.85 V)"),
    (0x002, "P1V8_FPGA (FPGA 1.8V)"),
    (0x004, "P1V8_MISC (Misc 1.8V)"),
    (0x008, "P0V9_MGT (MGT 0.9V)"),
    (0x010, "P1V2_MGT (MGT 1.2V)"),
    (0x020, "P3V3_MISC (Misc 3.3V)"),
    (0x040, "P3V3_FF (FireFly 3.3V)"),
    (0x080, "P5V_MISC (Misc 5.0V)"),
    (0x100, "LTC2977_1 (P1V8_FPGA, P1V2_MGT, P0V9_MGT)"),
    (0x200, "LTC2977_2 (P1V8_MISC, P3V3_MISC, P5V_MISC, P3V3_FF)"),
];

/// Write `title` underlined.
fn header(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "{title}")?;
    writeln!(f, "{}", "-".repeat(title.len()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerDomain {
    pub domain: String,
    /// Status text as printed by the MCU.
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RailStatus {
    pub rail: &'static str,
    pub good: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerStatus {
    pub domains: Vec<PowerDomain>,
    pub power_good: u32,
    pub rails: Vec<RailStatus>,
}

impl PowerStatus {
    pub fn new(domains: Vec<PowerDomain>, power_good: u32) -> Self {
        let rails = POWER_GOOD_RAILS
            .iter()
            .map(|&(bit, rail)| RailStatus {
                rail,
                good: power_good & bit != 0,
            })
            .collect();
        Self {
            domains,
            power_good,
            rails,
        }
    }

    pub fn all_good(&self) -> bool {
        self.rails.iter().all(|r| r.good)
    }
}

impl fmt::Display for PowerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for domain in &self.domains {
            writeln!(f, "{}", domain.status)?;
        }
        write!(f, "Power good: 0x{:03x}", self.power_good)?;
        let width = self.rails.iter().map(|r| r.rail.len()).max().unwrap_or(0);
        for rail in &self.rails {
            write!(
                f,
                "\n    {:<width$} : {}",
                rail.rail,
                if rail.good { "OK" } else { "-" }
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerialNumberReport {
    pub device: String,
    #[serde(flatten)]
    pub info: SerialNumberInfo,
    /// Registers that could not be read; their bytes count as zero.
    pub read_errors: usize,
}

impl fmt::Display for SerialNumberReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device family code: 0x{:02x}", self.info.family_code)?;
        writeln!(f, "Serial number: 0x{:012x}", self.info.serial_number)?;
        write!(f, "CRC: 0x{:02x}", self.info.crc)?;
        if self.read_errors > 0 {
            write!(
                f,
                "\n{} register(s) of {} could not be read!",
                self.read_errors, self.device
            )?;
        }
        if self.info.crc_error {
            write!(f, "\nCRC error detected!")?;
        }
        Ok(())
    }
}

/// One temperature reading. `None` if the sensor could not be read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureReading {
    pub label: String,
    pub device: String,
    pub temperature: Option<f32>,
}

/// Identification registers of a temperature sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SensorIds {
    pub product_id: Option<u8>,
    pub manufacturer_id: Option<u8>,
    pub revision: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorIdentity {
    pub device: String,
    #[serde(flatten)]
    pub ids: SensorIds,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemperatureReport {
    pub readings: Vec<TemperatureReading>,
    /// Only collected at verbosity 2 and above.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sensors: Vec<SensorIdentity>,
}

impl TemperatureReport {
    pub fn failed(&self) -> usize {
        self.readings.iter().filter(|r| r.temperature.is_none()).count()
    }
}

fn write_id(f: &mut fmt::Formatter<'_>, device: &str, what: &str, id: Option<u8>) -> fmt::Result {
    match id {
        Some(id) => writeln!(f, "{device} {what}: 0x{id:02x}"),
        None => writeln!(f, "{device} {what}: read failed"),
    }
}

impl fmt::Display for TemperatureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for sensor in &self.sensors {
            write_id(f, &sensor.device, "product ID", sensor.ids.product_id)?;
            write_id(f, &sensor.device, "manufacturer ID", sensor.ids.manufacturer_id)?;
            write_id(f, &sensor.device, "revision", sensor.ids.revision)?;
        }
        let mut first = true;
        for reading in &self.readings {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(
                f,
                "{:<24} - {:<15}: {:6.3} degC",
                reading.label,
                reading.device,
                reading.temperature.unwrap_or(TEMP_READ_FAILED)
            )?;
        }
        Ok(())
    }
}

/// Result of scanning one bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusScan {
    pub bus: u8,
    pub devices: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectReport {
    pub buses: Vec<BusScan>,
}

impl fmt::Display for DetectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Devices found on I2C busses:")?;
        for scan in &self.buses {
            write!(f, "\nBus {}: ", scan.bus)?;
            match &scan.error {
                Some(e) => write!(f, " scan failed: {e}")?,
                None => {
                    for addr in &scan.devices {
                        write!(f, " 0x{addr:02x}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Telemetry of one core power regulator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegulatorReading {
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Ltm4700Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorePowerReport {
    pub regulators: Vec<RegulatorReading>,
}

impl fmt::Display for CorePowerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for reg in &self.regulators {
            if !first {
                writeln!(f)?;
            }
            first = false;
            match (&reg.telemetry, &reg.error) {
                (Some(t), _) => write!(f, "{:<15}: {t}", reg.device)?,
                (None, Some(e)) => write!(f, "{:<15}: read failed: {e}", reg.device)?,
                (None, None) => write!(f, "{:<15}: no data", reg.device)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceFailure {
    pub device: String,
    pub error: String,
}

/// Status of every driver the board holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceReport {
    pub devices: Vec<DeviceStatus>,
    pub failures: Vec<DeviceFailure>,
}

impl fmt::Display for DeviceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for status in &self.devices {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "{status}")?;
        }
        for failure in &self.failures {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "{}: status read failed: {}", failure.device, failure.error)?;
        }
        Ok(())
    }
}

/// Serial device and traffic counters of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardDetails {
    pub device: String,
    pub simulated: bool,
    pub stats: TransportStats,
}

impl fmt::Display for BoardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.simulated {
            writeln!(f, "Command Module with simulated hardware access.")?;
        } else {
            writeln!(f, "Command Module on serial device `{}'.", self.device)?;
        }
        write!(f, "{}", self.stats)
    }
}

/// The three sections of the board overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardStatus {
    pub serial_number: SerialNumberReport,
    /// `None` if the MCU could not report the power state.
    pub power: Option<PowerStatus>,
    pub temperatures: TemperatureReport,
}

impl fmt::Display for BoardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        header(f, "Board Serial Number")?;
        writeln!(f, "{}", self.serial_number)?;
        writeln!(f)?;
        header(f, "Power Status")?;
        match &self.power {
            Some(power) => writeln!(f, "{power}")?,
            None => writeln!(f, "Power status not available!")?,
        }
        writeln!(f)?;
        header(f, "Temperatures")?;
        write!(f, "{}", self.temperatures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_good_bits() {
        let status = PowerStatus::new(Vec::new(), 0x101);
        assert!(status.rails[0].good);
        assert!(!status.rails[1].good);
        assert!(status.rails[8].good);
        assert!(!status.all_good());
        assert!(PowerStatus::new(Vec::new(), 0x3ff).all_good());
    }

    #[test]
    fn power_status_text() {
        let status = PowerStatus::new(
            vec![PowerDomain {
                domain: "clock".into(),
                status: "Clock power domain is ON.".into(),
            }],
            0x003,
        );
        let text = status.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Clock power domain is ON.");
        assert_eq!(lines[1], "Power good: 0x003");
        assert!(lines[2].starts_with("    P0V85 (FPGA core, 0.85 V) "));
        assert!(lines[2].ends_with(": OK"));
        assert!(lines[4].ends_with(": -"));
        assert_eq!(lines.len(), 12);
    }

    #[test]
    fn serial_number_text() {
        let report = SerialNumberReport {
            device: "IC22 (DS28CM00)".into(),
            info: SerialNumberInfo {
                family_code: 0x70,
                serial_number: 0x1234,
                crc: 0x00,
                crc_error: true,
            },
            read_errors: 0,
        };
        assert_eq!(
            report.to_string(),
            "Device family code: 0x70\nSerial number: 0x000000001234\nCRC: 0x00\nCRC error detected!"
        );
    }

    #[test]
    fn temperature_rows() {
        let report = TemperatureReport {
            readings: vec![
                TemperatureReading {
                    label: "VU13P FPGA".into(),
                    device: "IC60 (MCP9902)".into(),
                    temperature: Some(42.125),
                },
                TemperatureReading {
                    label: "Board 1".into(),
                    device: "IC60 (MCP9902)".into(),
                    temperature: None,
                },
            ],
            sensors: Vec::new(),
        };
        assert_eq!(
            report.to_string(),
            "VU13P FPGA               - IC60 (MCP9902) : 42.125 degC\n\
             Board 1                  - IC60 (MCP9902) : -128.000 degC"
        );
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn detect_text() {
        let report = DetectReport {
            buses: vec![
                BusScan { bus: 1, devices: vec![0x40, 0x41], error: None },
                BusScan { bus: 2, devices: Vec::new(), error: None },
            ],
        };
        assert_eq!(
            report.to_string(),
            "Devices found on I2C busses:\nBus 1:  0x40 0x41\nBus 2: "
        );
    }

    #[test]
    fn json_skips_missing_ids() {
        let report = TemperatureReport {
            readings: vec![TemperatureReading {
                label: "Board 2".into(),
                device: "IC61 (MCP9902)".into(),
                temperature: None,
            }],
            sensors: Vec::new(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("sensors").is_none());
        assert!(json["readings"][0]["temperature"].is_null());
    }

    #[test]
    fn status_sections() {
        let status = BoardStatus {
            serial_number: SerialNumberReport {
                device: "IC22 (DS28CM00)".into(),
                info: SerialNumberInfo::default(),
                read_errors: 0,
            },
            power: None,
            temperatures: TemperatureReport::default(),
        };
        let text = status.to_string();
        assert!(text.starts_with("Board Serial Number\n-------------------\n"));
        assert!(text.contains("Power Status\n------------\nPower status not available!"));
        assert!(text.contains("Temperatures\n------------"));
    }
}
