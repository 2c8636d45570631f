//! MDT-TP Command Module.
//!
//! The CM's I2C devices hang off the MCU's master ports:
//!
//! ```text
//! bus 1  IC58 LTC2977 0x5c   IC59 LTC2977 0x5d   IC26 LTM4700 0x40   IC27 LTM4700 0x41
//! bus 4  IC22 DS28CM00 0x50  IC60 MCP9902 0x3c   IC61 MCP9902 0x1c   IC62 MCP9902 0x7c
//! ```
//!
//! Clock chips, FireFly modules, multiplexers and I/O expanders depend on
//! the assembly variant and are created on demand with the ad-hoc
//! constructors.

use serde::Serialize;

use super::report::{
    BoardDetails, BoardStatus, BusScan, CorePowerReport, DetectReport, DeviceFailure,
    DeviceReport, PowerDomain, PowerStatus, RegulatorReading, SensorIdentity, SensorIds,
    SerialNumberReport, TemperatureReading, TemperatureReport,
};
use crate::{
    config::BoardConfig,
    error::{Error, Result},
    hw_trait::{self, HwError},
    mgmt_protocol::mcu_shell::{DetectMode, GpioType, McuChannel, McuGpio, McuI2c},
    peripheral::{
        Accumulated, Device,
        ds28cm00::Ds28cm00,
        firefly::{Firefly, FireflyKind},
        ltm4700::Ltm4700,
        mcp9902::Mcp9902,
        pca9535::Pca9535,
        pca9545::Pca9545,
        si53xx::Si53xx,
        si598::Si598,
    },
    tracing::prelude::*,
    transport::{TransportStats, str2int},
};

const BUS_POWER: u8 = 1;
const BUS_MONITOR: u8 = 4;

/// Power domains whose state `power_status` reports.
const POWER_DOMAINS: [&str; 3] = ["clock", "fpga", "firefly"];

/// A device fitted on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusMapEntry {
    pub designator: &'static str,
    pub part: &'static str,
    pub bus: u8,
    pub address: u8,
    pub function: &'static str,
    /// Whether this crate has a driver for the part.
    pub driver: bool,
}

const IC58: BusMapEntry = BusMapEntry {
    designator: "IC58",
    part: "LTC2977",
    bus: BUS_POWER,
    address: 0x5c,
    function: "power manager for 1.8 V FPGA, 1.2 V MGT, 0.9 V MGT",
    driver: false,
};

const IC59: BusMapEntry = BusMapEntry {
    designator: "IC59",
    part: "LTC2977",
    bus: BUS_POWER,
    address: 0x5d,
    function: "power manager for 1.8 V misc, 3.3 V misc, 5.0 V misc, 3.3 V FireFly",
    driver: false,
};

const IC26: BusMapEntry = BusMapEntry {
    designator: "IC26",
    part: "LTM4700",
    bus: BUS_POWER,
    address: 0x40,
    function: "VU13P core power 1",
    driver: true,
};

const IC27: BusMapEntry = BusMapEntry {
    designator: "IC27",
    part: "LTM4700",
    bus: BUS_POWER,
    address: 0x41,
    function: "VU13P core power 2",
    driver: true,
};

const IC22: BusMapEntry = BusMapEntry {
    designator: "IC22",
    part: "DS28CM00",
    bus: BUS_MONITOR,
    address: 0x50,
    function: "board serial number",
    driver: true,
};

const IC60: BusMapEntry = BusMapEntry {
    designator: "IC60",
    part: "MCP9902",
    bus: BUS_MONITOR,
    address: 0x3c,
    function: "VU13P temperature",
    driver: true,
};

const IC61: BusMapEntry = BusMapEntry {
    designator: "IC61",
    part: "MCP9902",
    bus: BUS_MONITOR,
    address: 0x1c,
    function: "MGT 0.9 V power temperature",
    driver: true,
};

const IC62: BusMapEntry = BusMapEntry {
    designator: "IC62",
    part: "MCP9902",
    bus: BUS_MONITOR,
    address: 0x7c,
    function: "MGT 1.2 V power temperature",
    driver: true,
};

static BUS_MAP: [BusMapEntry; 8] = [IC58, IC59, IC26, IC27, IC22, IC60, IC61, IC62];

impl BusMapEntry {
    /// Name used in logs and reports, e.g. "IC22 (DS28CM00)".
    pub fn name(&self) -> String {
        format!("{} ({})", self.designator, self.part)
    }
}

fn reading(label: impl Into<String>, device: &str, value: hw_trait::Result<f32>) -> TemperatureReading {
    TemperatureReading {
        label: label.into(),
        device: device.to_string(),
        temperature: value.ok(),
    }
}

async fn identify(sensor: &mut Mcp9902<McuI2c>) -> SensorIdentity {
    let ids = SensorIds {
        product_id: sensor.read_product_id().await.ok(),
        manufacturer_id: sensor.read_manufacturer_id().await.ok(),
        revision: sensor.read_revision().await.ok(),
    };
    SensorIdentity {
        device: sensor.device_name().to_string(),
        ids,
    }
}

pub struct MdtTpCm {
    config: BoardConfig,
    channel: McuChannel,
    gpio: McuGpio,
    /// One proxy per port, indexed by port number.
    buses: Vec<McuI2c>,
    ic22: Ds28cm00<McuI2c>,
    ic60: Mcp9902<McuI2c>,
    ic61: Mcp9902<McuI2c>,
    ic62: Mcp9902<McuI2c>,
    ic26: Ltm4700<McuI2c>,
    ic27: Ltm4700<McuI2c>,
}

impl MdtTpCm {
    /// Set up the board: create the bus proxies and drivers, reset the
    /// buses and configure the temperature sensors.
    ///
    /// Failures are logged and leave the affected device unconfigured; the
    /// board is usable regardless.
    pub async fn new(channel: McuChannel, config: BoardConfig) -> Self {
        let buses = (0..config.bus_count)
            .map(|port| McuI2c::new(channel.clone(), port))
            .collect();
        let driver_bus = |entry: &BusMapEntry| McuI2c::new(channel.clone(), entry.bus);
        let mcp9902 = |entry: BusMapEntry| Mcp9902::new(driver_bus(&entry), entry.address, entry.name());
        let ltm4700 = |entry: BusMapEntry| Ltm4700::new(driver_bus(&entry), entry.address, entry.name());

        let mut board = Self {
            gpio: McuGpio::new(channel.clone()),
            buses,
            ic22: Ds28cm00::new(driver_bus(&IC22), IC22.address, IC22.name()),
            ic60: mcp9902(IC60),
            ic61: mcp9902(IC61),
            ic62: mcp9902(IC62),
            ic26: ltm4700(IC26),
            ic27: ltm4700(IC27),
            channel,
            config,
        };

        if board.config.reset_i2c_on_init {
            if let Err(e) = board.i2c_reset().await {
                warn!(error = %e, "I2C bus switches could not be reset");
            }
        }
        board.init_temp_sensors().await;
        board
    }

    async fn init_temp_sensors(&mut self) {
        for sensor in [&mut self.ic60, &mut self.ic61, &mut self.ic62] {
            let mut acc = Accumulated::new(());
            let step = sensor.write_config_0(0x00).await;
            acc.record(step);
            let step = sensor.write_config_1(0x00).await;
            acc.record(step);
            if !acc.is_ok() {
                warn!(device = %sensor.device_name(), "Temperature sensor not configured");
            }
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn channel(&self) -> &McuChannel {
        &self.channel
    }

    pub fn gpio(&self) -> &McuGpio {
        &self.gpio
    }

    /// Devices fitted on the board.
    pub fn bus_map(&self) -> &'static [BusMapEntry] {
        &BUS_MAP
    }

    /// Reply value of a query that ends in a number.
    async fn query_value(&self, command: &str) -> Result<u32> {
        let reply = self.channel.command(command).await?;
        if self.channel.is_simulated() {
            return Ok(0);
        }
        Ok(str2int(&reply.full)?)
    }

    pub async fn power_up(&self) -> Result<()> {
        info!("Powering up the CM");
        self.channel
            .command("power all 1")
            .await
            .inspect_err(|e| error!(error = %e, "CM power up failed"))?;
        Ok(())
    }

    pub async fn power_down(&self) -> Result<()> {
        info!("Powering down the CM");
        self.channel
            .command("power all 0")
            .await
            .inspect_err(|e| error!(error = %e, "CM power down failed"))?;
        Ok(())
    }

    /// Power domain states and power-good signals.
    pub async fn power_status(&self) -> Result<PowerStatus> {
        debug!("Reading the power status of the CM");
        let mut domains = Vec::with_capacity(POWER_DOMAINS.len());
        for domain in POWER_DOMAINS {
            let reply = self.channel.command(&format!("power {domain}")).await?;
            domains.push(PowerDomain {
                domain: domain.to_string(),
                status: reply.payload,
            });
        }
        let power_good = self.query_value("gpio power-good").await?;
        Ok(PowerStatus::new(domains, power_good))
    }

    /// Board serial number from IC22. Unreadable bytes count as zero.
    pub async fn serial_number(&mut self) -> SerialNumberReport {
        debug!(device = %self.ic22.device_name(), "Reading the serial number");
        let acc = self.ic22.read_all().await;
        if !acc.is_ok() {
            error!(device = %self.ic22.device_name(), errors = acc.errors.len(),
                "Serial number read incomplete");
        }
        SerialNumberReport {
            device: self.ic22.device_name().to_string(),
            info: acc.value,
            read_errors: acc.errors.len(),
        }
    }

    /// All board temperatures. Readings that fail are reported as missing.
    pub async fn mon_temp(&mut self) -> TemperatureReport {
        let mut report = TemperatureReport::default();

        debug!("Reading the temperatures of the VU13P core power modules");
        for (n, regulator) in [&mut self.ic26, &mut self.ic27].into_iter().enumerate() {
            let t = regulator.read_temp_ext().await;
            report.readings.push(reading(
                format!("VU13P core power {} (ext)", n + 1),
                regulator.device_name(),
                t,
            ));
            let t = regulator.read_temp_int().await;
            report.readings.push(reading(
                format!("VU13P core power {} (int)", n + 1),
                regulator.device_name(),
                t,
            ));
        }

        let verbose = self.config.verbosity >= 2;
        debug!("Reading the MGT power and VU13P temperatures");
        for (label, sensor) in [
            ("MGT 0.9 V power", &mut self.ic61),
            ("MGT 1.2 V power", &mut self.ic62),
            ("VU13P FPGA", &mut self.ic60),
        ] {
            if verbose {
                report.sensors.push(identify(sensor).await);
            }
            let t = sensor.read_temp_ext().await;
            report.readings.push(reading(label, sensor.device_name(), t));
        }

        debug!("Reading the local board temperatures");
        for (n, sensor) in [&mut self.ic60, &mut self.ic61, &mut self.ic62]
            .into_iter()
            .enumerate()
        {
            let t = sensor.read_temp_int().await;
            report
                .readings
                .push(reading(format!("Board {}", n + 1), sensor.device_name(), t));
        }

        if report.failed() > 0 {
            warn!(failed = report.failed(), "Some temperatures could not be read");
        }
        report
    }

    /// Serial number, power status and temperatures.
    pub async fn status(&mut self) -> BoardStatus {
        let serial_number = self.serial_number().await;
        let power = self
            .power_status()
            .await
            .inspect_err(|e| error!(error = %e, "Power status not available"))
            .ok();
        let temperatures = self.mon_temp().await;
        BoardStatus {
            serial_number,
            power,
            temperatures,
        }
    }

    /// Send a command verbatim and return the reply without its status
    /// token.
    pub async fn mcu_cmd_raw(&self, command: &str) -> Result<String> {
        debug!(command, "Sending raw command to the MCU");
        let reply = self.channel.command(command).await?;
        trace!(response = %reply.full, "Raw command response");
        Ok(reply.payload)
    }

    pub async fn mcu_led_user_get(&self) -> Result<u32> {
        debug!("Reading the MCU user LEDs");
        self.query_value("gpio led-user").await
    }

    pub async fn mcu_led_user_set(&self, value: u32) -> Result<()> {
        debug!("Setting the MCU user LEDs to 0x{value:03x}");
        self.channel
            .command(&format!("gpio led-user 0x{value:03x}"))
            .await?;
        Ok(())
    }

    /// Reset the I2C bus switches.
    ///
    /// The firmware has no per-bus reset. The switches' RESET inputs are
    /// active low and exposed as the `i2c-reset` GPIO: all lines are driven
    /// low, then put back to the level read before the pulse. The release
    /// is attempted even if asserting failed.
    pub async fn i2c_reset(&mut self) -> Result<()> {
        let released = match self.gpio.get(GpioType::I2cReset).await {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "Cannot read the I2C bus switch reset lines");
                return Err(e.into());
            }
        };
        if released == 0 && !self.channel.is_simulated() {
            warn!("I2C bus switch reset lines were already asserted");
        }
        debug!(released = %format!("0x{released:02x}"), "Resetting the I2C bus switches");

        let mut acc = Accumulated::new(());
        let step = self.gpio.set(GpioType::I2cReset, 0x00).await;
        acc.record(step);
        let step = self.gpio.set(GpioType::I2cReset, released).await;
        acc.record(step);
        if !acc.is_ok() {
            error!("I2C bus switch reset failed");
        }
        Ok(acc.into_result()?)
    }

    /// Scan every active bus.
    pub async fn i2c_detect_devices(&mut self, mode: DetectMode) -> DetectReport {
        let config = &self.config;
        let mut report = DetectReport::default();
        for bus in self.buses.iter_mut().filter(|b| config.is_active(b.port())) {
            let scan = match bus.detect_devices(mode).await {
                Ok(devices) => BusScan {
                    bus: bus.port(),
                    devices,
                    error: None,
                },
                Err(e) => {
                    error!(bus = bus.port(), error = %e, "I2C device detection failed");
                    BusScan {
                        bus: bus.port(),
                        devices: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            report.buses.push(scan);
        }
        report
    }

    /// Telemetry of both core power regulators.
    pub async fn core_power_status(&mut self) -> CorePowerReport {
        let mut report = CorePowerReport::default();
        for regulator in [&mut self.ic26, &mut self.ic27] {
            let result = regulator.read_telemetry().await;
            report.regulators.push(RegulatorReading {
                device: regulator.device_name().to_string(),
                error: result.as_ref().err().map(ToString::to_string),
                telemetry: result.ok(),
            });
        }
        report
    }

    async fn core_power(&mut self, on: bool) -> Result<()> {
        info!("Switching the VU13P core power {}", if on { "on" } else { "off" });
        let mut acc = Accumulated::new(());
        for regulator in [&mut self.ic26, &mut self.ic27] {
            let step = if on {
                regulator.power_on_all().await
            } else {
                regulator.power_off_all().await
            };
            acc.record(step);
        }
        Ok(acc.into_result()?)
    }

    pub async fn core_power_on(&mut self) -> Result<()> {
        self.core_power(true).await
    }

    pub async fn core_power_off(&mut self) -> Result<()> {
        self.core_power(false).await
    }

    /// Status of every fitted device that has a driver.
    pub async fn device_statuses(&mut self) -> DeviceReport {
        let devices: [&mut dyn Device; 6] = [
            &mut self.ic22,
            &mut self.ic60,
            &mut self.ic61,
            &mut self.ic62,
            &mut self.ic26,
            &mut self.ic27,
        ];
        let mut report = DeviceReport::default();
        for device in devices {
            match device.read_status().await {
                Ok(status) => report.devices.push(status),
                Err(e) => {
                    warn!(device = %device.device_name(), error = %e, "Status read failed");
                    report.failures.push(DeviceFailure {
                        device: device.device_name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    pub async fn stats(&self) -> TransportStats {
        self.channel.stats().await
    }

    pub async fn details(&self) -> BoardDetails {
        let serial = self.channel.lock().await;
        BoardDetails {
            device: serial.device().to_string(),
            simulated: serial.is_simulated(),
            stats: serial.stats(),
        }
    }

    /// Proxy for an active bus.
    pub fn bus(&self, bus: u8) -> Result<McuI2c> {
        if !self.config.is_active(bus) {
            return Err(Error::InactiveBus(bus));
        }
        Ok(McuI2c::new(self.channel.clone(), bus))
    }

    fn adhoc_name(part: &str, bus: u8, address: u8) -> String {
        format!("{part} (bus {bus}, 0x{address:02x})")
    }

    fn check_address(address: u8) -> Result<()> {
        if address > 0x7f {
            return Err(HwError::InvalidParameter(format!(
                "I2C slave address 0x{address:02x} is not a 7-bit address"
            ))
            .into());
        }
        Ok(())
    }

    pub fn si53xx(&self, bus: u8, address: u8) -> Result<Si53xx<McuI2c>> {
        Self::check_address(address)?;
        Ok(Si53xx::new(self.bus(bus)?, address, Self::adhoc_name("Si53xx", bus, address)))
    }

    pub fn si598(&self, bus: u8, address: u8) -> Result<Si598<McuI2c>> {
        Self::check_address(address)?;
        Ok(Si598::new(self.bus(bus)?, address, Self::adhoc_name("Si598", bus, address)))
    }

    pub fn firefly(&self, bus: u8, address: u8, kind: FireflyKind) -> Result<Firefly<McuI2c>> {
        Self::check_address(address)?;
        let name = Self::adhoc_name(&format!("FireFly {kind}"), bus, address);
        Ok(Firefly::new(self.bus(bus)?, address, name, kind))
    }

    pub fn pca9545(&self, bus: u8, address: u8) -> Result<Pca9545<McuI2c>> {
        Self::check_address(address)?;
        Ok(Pca9545::new(self.bus(bus)?, address, Self::adhoc_name("PCA9545", bus, address)))
    }

    pub fn pca9535(&self, bus: u8, address: u8) -> Result<Pca9535<McuI2c>> {
        Self::check_address(address)?;
        Ok(Pca9535::new(self.bus(bus)?, address, Self::adhoc_name("PCA9535", bus, address)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::peripheral::ds28cm00::crc_calc;
    use crate::transport::testing::FakeMcu;
    use crate::transport::{McuSerial, parse_auto_int};
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};

    /// MCU shell with register-file devices behind its I2C ports.
    #[derive(Default)]
    struct Sim {
        regs: HashMap<(u8, u8), [u8; 256]>,
        pointer: HashMap<(u8, u8), u8>,
        /// Fixed read data per (port, address, register).
        responses: HashMap<(u8, u8, u8), Vec<u8>>,
        absent: HashSet<(u8, u8)>,
        power_good: u32,
        led_user: u32,
        i2c_reset: u32,
        /// Firmware build without the `gpio` command.
        no_gpio: bool,
        /// Writes of the `i2c-reset` GPIO do not take effect.
        i2c_reset_stuck: bool,
    }

    impl Sim {
        fn set_regs(&mut self, port: u8, addr: u8, start: u8, data: &[u8]) {
            let regs = self.regs.entry((port, addr)).or_insert([0; 256]);
            for (i, b) in data.iter().enumerate() {
                regs[start as usize + i] = *b;
            }
        }

        fn reg(&self, port: u8, addr: u8, reg: u8) -> u8 {
            self.regs.get(&(port, addr)).map_or(0, |r| r[reg as usize])
        }

        fn i2c(&mut self, port: u8, addr: u8, acc: u32, rest: &[&str]) -> String {
            if self.absent.contains(&(port, addr)) {
                return format!(
                    "ERROR: Error flags from I2C the master {port}: 0x00000004\nERROR: NACK received."
                );
            }
            let key = (port, addr);
            if acc & 0x1 == 0 {
                let data: Vec<u8> = rest.iter().map(|w| parse_auto_int(w).unwrap() as u8).collect();
                self.pointer.insert(key, data[0]);
                let start = data[0];
                self.set_regs(port, addr, start, &data[1..]);
                return "OK.".into();
            }

            let len: usize = rest[0].parse().unwrap();
            let pointer = self.pointer.get(&key).copied().unwrap_or(0);
            let data = match self.responses.get(&(port, addr, pointer)) {
                Some(fixed) => fixed.clone(),
                None => (0..len)
                    .map(|i| self.reg(port, addr, pointer.wrapping_add(i as u8)))
                    .collect(),
            };
            let words: Vec<String> = data.iter().map(|b| format!("0x{b:02x}")).collect();
            format!("OK. Data: {}", words.join(" "))
        }

        fn handle(&mut self, cmd: &str) -> String {
            let words: Vec<&str> = cmd.split_whitespace().collect();
            let reply = match words.as_slice() {
                ["power", "all", _] => "OK: All power domains switched.".to_string(),
                ["power", domain] => format!("OK: Power domain {domain} is ON."),
                ["gpio", "power-good"] => format!(
                    "OK: Current GPIO power-good value: 0x{:03x}",
                    self.power_good
                ),
                ["gpio", "led-user"] => format!(
                    "OK: Current GPIO led-user value: 0x{:03x}",
                    self.led_user
                ),
                ["gpio", "led-user", value] => {
                    self.led_user = parse_auto_int(value).unwrap();
                    "OK.".to_string()
                }
                ["gpio", ..] if self.no_gpio => "ERROR: Unknown command `gpio'.".to_string(),
                ["gpio", "i2c-reset"] => format!(
                    "OK: Current GPIO i2c-reset value: 0x{:02x}",
                    self.i2c_reset
                ),
                ["gpio", "i2c-reset", value] => {
                    let value = parse_auto_int(value).unwrap();
                    if self.i2c_reset_stuck {
                        format!(
                            "ERROR: Setting GPIO i2c-reset to 0x{value:02x} failed! It was set to 0x{:02x} instead.",
                            self.i2c_reset
                        )
                    } else {
                        self.i2c_reset = value;
                        format!("OK: GPIO i2c-reset set to 0x{value:02x}.")
                    }
                }
                ["i2c-det", port] => {
                    let port: u8 = port.parse().unwrap();
                    let mut found: Vec<u8> = self
                        .regs
                        .keys()
                        .filter(|(p, _)| *p == port)
                        .map(|(_, a)| *a)
                        .collect();
                    found.sort();
                    let found: Vec<String> = found.iter().map(|a| format!(" 0x{a:02x}")).collect();
                    format!("OK. I2C device(s) found at slave address:{}", found.concat())
                }
                ["i2c", port, addr, acc, rest @ ..] => self.i2c(
                    port.parse().unwrap(),
                    parse_auto_int(addr).unwrap() as u8,
                    parse_auto_int(acc).unwrap(),
                    rest,
                ),
                _ => "ERROR: Unknown command.".to_string(),
            };
            format!("{reply}\n> ")
        }
    }

    fn sim() -> Sim {
        let mut sim = Sim::default();
        // IC22: family code, serial number, CRC.
        let serial: u64 = 0x0000_1234_5678;
        let mut rom = vec![0x70];
        rom.extend_from_slice(&serial.to_le_bytes()[..6]);
        rom.push(crc_calc(0x70, serial));
        sim.set_regs(4, 0x50, 0x00, &rom);
        // IC60/61/62: external and internal temperature, 0.5 degC fraction.
        for (addr, ext, int) in [(0x3c, 55, 30), (0x1c, 45, 31), (0x7c, 46, 32)] {
            sim.set_regs(4, addr, 0x00, &[int, ext]);
            sim.set_regs(4, addr, 0x10, &[0x80]);
            sim.set_regs(4, addr, 0x29, &[0x80]);
            sim.set_regs(4, addr, 0xfd, &[0x04, 0x5d, 0x01]);
        }
        // IC26/27: 37.5 and 40.0 degC in Linear11.
        for addr in [0x40, 0x41] {
            sim.set_regs(1, addr, 0x10, &[0x80]);
            sim.responses.insert((1, addr, 0x8d), vec![0x96, 0xf0]);
            sim.responses.insert((1, addr, 0x8e), vec![0xa0, 0xf0]);
        }
        sim.power_good = 0x3ff;
        sim.i2c_reset = 0x0f;
        sim
    }

    async fn board_with(sim: Sim, verbosity: u8) -> (MdtTpCm, FakeMcu, Arc<Mutex<Sim>>) {
        let sim = Arc::new(Mutex::new(sim));
        let state = sim.clone();
        let (serial, fake) = FakeMcu::spawn(move |cmd| state.lock().unwrap().handle(cmd));
        let config = BoardConfig {
            verbosity,
            ..Default::default()
        };
        let board = MdtTpCm::new(McuChannel::new(serial), config).await;
        (board, fake, sim)
    }

    #[tokio::test]
    async fn init_pulses_switch_resets_and_configures_sensors() {
        let (_board, fake, sim) = board_with(sim(), 1).await;
        let commands = fake.commands();
        let resets: Vec<&String> = commands
            .iter()
            .filter(|c| c.starts_with("gpio i2c-reset"))
            .collect();
        assert_eq!(
            resets,
            vec!["gpio i2c-reset", "gpio i2c-reset 0x00", "gpio i2c-reset 0x0f"]
        );
        assert_eq!(sim.lock().unwrap().i2c_reset, 0x0f);
        assert!(commands.contains(&"i2c 4 0x3c 0x0 0x03 0x00".to_string()));
        assert!(commands.contains(&"i2c 4 0x7c 0x0 0x09 0x00".to_string()));
        assert_eq!(sim.lock().unwrap().reg(4, 0x1c, 0x03), 0x00);
    }

    #[tokio::test]
    async fn init_survives_missing_devices() {
        let mut s = sim();
        s.absent.insert((4, 0x3c));
        let (mut board, _fake, _sim) = board_with(s, 1).await;
        let report = board.mon_temp().await;
        // VU13P FPGA and Board 1 come from the missing IC60.
        assert_eq!(report.failed(), 2);
        assert_eq!(report.readings[6].label, "VU13P FPGA");
        assert_eq!(report.readings[6].temperature, None);
    }

    #[tokio::test]
    async fn power_commands() {
        let (board, fake, _sim) = board_with(sim(), 1).await;
        board.power_up().await.unwrap();
        board.power_down().await.unwrap();
        let commands = fake.commands();
        assert_eq!(&commands[commands.len() - 2..], ["power all 1", "power all 0"]);
    }

    #[tokio::test]
    async fn power_status_decodes_power_good() {
        let mut s = sim();
        s.power_good = 0x101;
        let (board, _fake, _sim) = board_with(s, 1).await;
        let status = board.power_status().await.unwrap();
        assert_eq!(status.domains.len(), 3);
        assert_eq!(status.domains[1].status, "Power domain fpga is ON.");
        assert_eq!(status.power_good, 0x101);
        assert!(status.rails[0].good);
        assert!(!status.rails[1].good);
        assert!(status.rails[8].good);
    }

    #[tokio::test]
    async fn serial_number_with_valid_crc() {
        let (mut board, _fake, _sim) = board_with(sim(), 1).await;
        let report = board.serial_number().await;
        assert_eq!(report.info.family_code, 0x70);
        assert_eq!(report.info.serial_number, 0x1234_5678);
        assert!(!report.info.crc_error);
        assert_eq!(report.read_errors, 0);
        assert_eq!(report.device, "IC22 (DS28CM00)");
    }

    #[tokio::test]
    async fn temperatures_in_order() {
        let (mut board, _fake, _sim) = board_with(sim(), 1).await;
        let report = board.mon_temp().await;
        let got: Vec<(&str, f32)> = report
            .readings
            .iter()
            .map(|r| (r.label.as_str(), r.temperature.unwrap()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("VU13P core power 1 (ext)", 37.5),
                ("VU13P core power 1 (int)", 40.0),
                ("VU13P core power 2 (ext)", 37.5),
                ("VU13P core power 2 (int)", 40.0),
                ("MGT 0.9 V power", 45.5),
                ("MGT 1.2 V power", 46.5),
                ("VU13P FPGA", 55.5),
                ("Board 1", 30.5),
                ("Board 2", 31.5),
                ("Board 3", 32.5),
            ]
        );
        assert!(report.sensors.is_empty());
    }

    #[tokio::test]
    async fn sensor_ids_at_high_verbosity() {
        let (mut board, _fake, _sim) = board_with(sim(), 2).await;
        let report = board.mon_temp().await;
        assert_eq!(report.sensors.len(), 3);
        assert_eq!(report.sensors[0].device, "IC61 (MCP9902)");
        assert_eq!(report.sensors[0].ids.product_id, Some(0x04));
        assert_eq!(report.sensors[0].ids.manufacturer_id, Some(0x5d));
    }

    #[tokio::test]
    async fn led_user() {
        let (board, fake, sim) = board_with(sim(), 1).await;
        board.mcu_led_user_set(0x5).await.unwrap();
        assert_eq!(fake.commands().last().unwrap(), "gpio led-user 0x005");
        assert_eq!(sim.lock().unwrap().led_user, 5);
        assert_eq!(board.mcu_led_user_get().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn raw_command_returns_payload() {
        let (board, _fake, _sim) = board_with(sim(), 1).await;
        assert_eq!(
            board.mcu_cmd_raw("power clock").await.unwrap(),
            "Power domain clock is ON."
        );
        assert!(board.mcu_cmd_raw("bogus").await.is_err());
    }

    #[tokio::test]
    async fn reset_still_releases_after_failed_assert() {
        let mut s = sim();
        s.i2c_reset_stuck = true;
        let (mut board, fake, _sim) = board_with(s, 1).await;
        let before = fake.commands().len();
        let err = board.i2c_reset().await.unwrap_err();
        assert!(matches!(err, Error::Hardware(HwError::Mcu { .. })), "{err:?}");
        assert_eq!(
            fake.commands()[before..],
            ["gpio i2c-reset", "gpio i2c-reset 0x00", "gpio i2c-reset 0x0f"]
        );
    }

    #[tokio::test]
    async fn reset_unknown_command_is_reported() {
        let mut s = sim();
        s.no_gpio = true;
        let (mut board, fake, _sim) = board_with(s, 1).await;
        let before = fake.commands().len();
        let err = board.i2c_reset().await.unwrap_err();
        match err {
            Error::Hardware(HwError::Mcu { response, .. }) => {
                assert!(response.contains("Unknown command"), "{response}");
            }
            other => panic!("unexpected error {other:?}"),
        }
        // Nothing is driven when the current level is unknown.
        assert_eq!(fake.commands()[before..], ["gpio i2c-reset"]);
    }

    #[tokio::test]
    async fn detect_covers_active_buses() {
        let (mut board, _fake, _sim) = board_with(sim(), 1).await;
        let report = board.i2c_detect_devices(DetectMode::Auto).await;
        let buses: Vec<u8> = report.buses.iter().map(|s| s.bus).collect();
        assert_eq!(buses, (1..=8).collect::<Vec<u8>>());
        assert_eq!(report.buses[0].devices, vec![0x40, 0x41]);
        assert_eq!(report.buses[3].devices, vec![0x1c, 0x3c, 0x50, 0x7c]);
    }

    #[tokio::test]
    async fn core_power_switches_both_regulators() {
        let (mut board, fake, _sim) = board_with(sim(), 1).await;
        let before = fake.commands().len();
        board.core_power_on().await.unwrap();
        let commands = fake.commands()[before..].to_vec();
        assert!(commands.contains(&"i2c 1 0x40 0x0 0x01 0x80".to_string()));
        assert!(commands.contains(&"i2c 1 0x41 0x0 0x01 0x80".to_string()));
    }

    #[tokio::test]
    async fn core_power_status_reports_failures() {
        let mut s = sim();
        s.absent.insert((1, 0x41));
        let (mut board, _fake, _sim) = board_with(s, 1).await;
        let report = board.core_power_status().await;
        assert_eq!(report.regulators.len(), 2);
        assert_eq!(report.regulators[0].telemetry.unwrap().temp_ext, 37.5);
        assert!(report.regulators[1].telemetry.is_none());
        assert!(report.regulators[1].error.is_some());
    }

    #[tokio::test]
    async fn device_statuses_cover_all_drivers() {
        let mut s = sim();
        s.absent.insert((4, 0x50));
        let (mut board, _fake, _sim) = board_with(s, 1).await;
        let report = board.device_statuses().await;
        assert_eq!(report.devices.len() + report.failures.len(), 6);
        assert_eq!(report.failures[0].device, "IC22 (DS28CM00)");
    }

    #[tokio::test]
    async fn adhoc_devices_need_active_bus() {
        let (board, _fake, _sim) = board_with(sim(), 1).await;
        assert!(matches!(board.si598(9, 0x55), Err(Error::InactiveBus(9))));
        assert!(matches!(board.pca9545(0, 0x70), Err(Error::InactiveBus(0))));
        assert!(board.si53xx(6, 0x80).is_err());
        let ff = board.firefly(2, 0x50, FireflyKind::Rx).unwrap();
        assert_eq!(ff.bus_index(), 2);
        assert_eq!(ff.device_name(), "FireFly rx (bus 2, 0x50)");
    }

    #[tokio::test]
    async fn simulated_board() {
        let serial = McuSerial::simulated(TransportConfig::with_device(""));
        let mut board = MdtTpCm::new(McuChannel::new(serial), BoardConfig::default()).await;
        assert_eq!(board.power_status().await.unwrap().power_good, 0);
        assert_eq!(board.mcu_led_user_get().await.unwrap(), 0);
        let status = board.status().await;
        assert!(status.power.is_some());
        assert_eq!(status.temperatures.failed(), 0);
        assert!(board.details().await.simulated);
    }

    #[test]
    fn bus_map_names() {
        assert_eq!(IC27.name(), "IC27 (LTM4700)");
        assert_eq!(BUS_MAP.iter().filter(|e| !e.driver).count(), 2);
    }
}
