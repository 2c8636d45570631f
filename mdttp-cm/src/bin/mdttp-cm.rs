//! Command-line tool for the MDT-TP Command Module.
//!
//! Talks to the CM's bridge MCU over its serial shell. Without a subcommand
//! it prints the board overview.

use std::fmt::Display;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;

use mdttp_cm::{
    board::MdtTpCm,
    config::{Config, DEFAULT_DEVICE},
    mgmt_protocol::mcu_shell::{DetectMode, GpioType, McuChannel},
    peripheral::{Device, firefly::FireflyKind, si598::Si598Preset},
    tracing::{self, prelude::*},
    transport::{McuSerial, parse_auto_int},
};

/// Bring-up and diagnostics for the MDT-TP Command Module
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial device of the MCU UART (empty for simulated hardware access)
    #[arg(short, long, global = true, default_value = DEFAULT_DEVICE)]
    device: String,

    /// Verbosity level, 0 (quiet) to 4 (all MCU traffic)
    #[arg(short, long, global = true, default_value_t = 1,
        value_parser = clap::value_parser!(u8).range(0..=4))]
    verbosity: u8,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Location of an ad-hoc device.
#[derive(clap::Args, Debug)]
struct Target {
    /// I2C bus (MCU master port 1 to 8)
    #[arg(short, long)]
    bus: u8,

    /// 7-bit slave address, decimal or 0x-prefixed hex
    #[arg(short, long, value_parser = parse_address)]
    address: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Power up the CM
    PowerUp,
    /// Power down the CM
    PowerDown,
    /// Read the board serial number
    Sn,
    /// Serial number, power status and temperatures
    Status,
    /// Power domain states and power-good signals
    PowerStatus,
    /// Read all board temperatures
    MonTemp,
    /// Send a raw command to the MCU and print its reply
    McuCmdRaw {
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },
    /// Read, or set, the MCU user LEDs
    McuLedUser {
        #[arg(value_parser = parse_number)]
        value: Option<u32>,
    },
    /// Pulse the reset lines of the I2C bus switches
    I2cReset,
    /// Scan all active I2C buses for devices
    I2cDetect {
        #[arg(short, long, value_enum, default_value_t = ScanMode::Auto)]
        mode: ScanMode,
    },
    /// Read, or set, an MCU GPIO type
    Gpio {
        gpio: GpioType,
        #[arg(value_parser = parse_number)]
        value: Option<u32>,
    },
    /// VU13P core power regulators
    CorePower {
        #[arg(value_enum, default_value_t = CorePowerAction::Status)]
        action: CorePowerAction,
    },
    /// Status of all on-board devices with a driver
    Devices,
    /// Load a ClockBuilder Pro register map into an Si53xx clock generator
    ClockConfig {
        #[command(flatten)]
        target: Target,
        file: PathBuf,
    },
    /// Read the output frequency of an Si598 oscillator
    Si598Freq {
        #[command(flatten)]
        target: Target,
    },
    /// Program an Si598 oscillator to a preset frequency (240 or 240.474)
    Si598Prog {
        #[command(flatten)]
        target: Target,
        preset: Si598Preset,
    },
    /// Read identification and monitoring values of a FireFly module
    FireflyInfo {
        #[command(flatten)]
        target: Target,
        #[arg(short, long)]
        kind: FireflyKind,
    },
    /// Show, or select, the channels of a PCA9545 multiplexer
    Mux {
        #[command(flatten)]
        target: Target,
        /// Channels to enable (0 to 3); all others are disabled
        channels: Vec<u8>,
        /// Disable all channels
        #[arg(long, conflicts_with = "channels")]
        off: bool,
    },
    /// Show, or set, the registers of a PCA9535 I/O expander
    IoExpander {
        #[command(flatten)]
        target: Target,
        /// New output register value
        #[arg(long, value_parser = parse_number)]
        output: Option<u32>,
        /// New configuration register value (1 = input)
        #[arg(long, value_parser = parse_number)]
        config: Option<u32>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ScanMode {
    Auto,
    Quick,
    Read,
}

impl From<ScanMode> for DetectMode {
    fn from(mode: ScanMode) -> Self {
        match mode {
            ScanMode::Auto => DetectMode::Auto,
            ScanMode::Quick => DetectMode::Quick,
            ScanMode::Read => DetectMode::Read,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CorePowerAction {
    Status,
    On,
    Off,
}

fn parse_number(s: &str) -> Result<u32, String> {
    parse_auto_int(s).ok_or_else(|| format!("`{s}' is not a number"))
}

fn parse_address(s: &str) -> Result<u8, String> {
    let value = parse_number(s)?;
    u8::try_from(value)
        .ok()
        .filter(|a| *a <= 0x7f)
        .ok_or_else(|| format!("0x{value:x} is not a 7-bit I2C address"))
}

fn emit<T: Serialize + Display>(json: bool, report: &T) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

async fn run(board: &mut MdtTpCm, command: Command, json: bool) -> Result<()> {
    match command {
        Command::PowerUp => board.power_up().await.context("CM power up failed")?,
        Command::PowerDown => board.power_down().await.context("CM power down failed")?,
        Command::Sn => emit(json, &board.serial_number().await)?,
        Command::Status => emit(json, &board.status().await)?,
        Command::PowerStatus => emit(json, &board.power_status().await?)?,
        Command::MonTemp => emit(json, &board.mon_temp().await)?,
        Command::McuCmdRaw { words } => {
            let command = words.join(" ");
            let reply = board
                .mcu_cmd_raw(&command)
                .await
                .with_context(|| format!("Error sending command `{command}' to the MCU"))?;
            if json {
                println!("{}", json!({ "command": command, "response": reply }));
            } else {
                println!("{reply}");
            }
        }
        Command::McuLedUser { value } => {
            if let Some(value) = value {
                board.mcu_led_user_set(value).await?;
            }
            let value = board.mcu_led_user_get().await?;
            if json {
                println!("{}", json!({ "led_user": value }));
            } else {
                println!("MCU user LED value: 0x{value:03x}");
            }
        }
        Command::I2cReset => board.i2c_reset().await?,
        Command::I2cDetect { mode } => emit(json, &board.i2c_detect_devices(mode.into()).await)?,
        Command::Gpio { gpio, value } => {
            let gpio_ctl = board.gpio();
            if let Some(value) = value {
                gpio_ctl.set(gpio, value).await?;
            }
            let value = gpio_ctl.get(gpio).await?;
            if json {
                println!("{}", json!({ "gpio": gpio.as_str(), "value": value }));
            } else {
                println!("GPIO {gpio} value: 0x{value:03x}");
            }
        }
        Command::CorePower { action } => match action {
            CorePowerAction::Status => emit(json, &board.core_power_status().await)?,
            CorePowerAction::On => board.core_power_on().await?,
            CorePowerAction::Off => board.core_power_off().await?,
        },
        Command::Devices => emit(json, &board.device_statuses().await)?,
        Command::ClockConfig { target, file } => {
            let mut clock = board.si53xx(target.bus, target.address)?;
            clock
                .config_file(&file)
                .await
                .with_context(|| format!("Failed to load {}", file.display()))?;
            emit(json, &clock.read_status().await?)?;
        }
        Command::Si598Freq { target } => {
            let mut osc = board.si598(target.bus, target.address)?;
            let freq = osc.get_freq().await?;
            if json {
                println!("{}", json!({ "device": osc.device_name(), "frequency_hz": freq }));
            } else {
                println!("{}: {freq}", osc.device_name());
            }
        }
        Command::Si598Prog { target, preset } => {
            let mut osc = board.si598(target.bus, target.address)?;
            osc.prog(preset).await?;
            emit(json, &osc.read_status().await?)?;
        }
        Command::FireflyInfo { target, kind } => {
            let mut module = board.firefly(target.bus, target.address, kind)?;
            let info = module.read_info().await;
            if !info.is_ok() {
                warn!(device = %module.device_name(), errors = info.errors.len(),
                    "Some FireFly values could not be read");
            }
            emit(json, &info.value)?;
        }
        Command::Mux {
            target,
            channels,
            off,
        } => {
            let mut mux = board.pca9545(target.bus, target.address)?;
            if off {
                mux.disable().await?;
            } else if !channels.is_empty() {
                mux.set_channels(&channels).await?;
            }
            emit(json, &mux.read_status().await?)?;
        }
        Command::IoExpander {
            target,
            output,
            config,
        } => {
            let mut expander = board.pca9535(target.bus, target.address)?;
            if let Some(value) = output {
                let value = u16::try_from(value).context("output value exceeds 16 bits")?;
                expander.write_output(value).await?;
            }
            if let Some(value) = config {
                let value = u16::try_from(value).context("configuration value exceeds 16 bits")?;
                expander.write_config(value).await?;
            }
            emit(json, &expander.read_status().await?)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing::init_stdout(args.verbosity);

    let config = Config::new(&args.device, args.verbosity);
    let serial = McuSerial::open(config.transport.clone())
        .with_context(|| format!("Failed to open the MCU serial device `{}'", args.device))?;
    let mut board = MdtTpCm::new(McuChannel::new(serial), config.board).await;

    let command = args.command.unwrap_or(Command::Status);
    let result = run(&mut board, command, args.json).await;

    if !args.json {
        if args.verbosity >= 2 {
            println!("\n{}", board.details().await);
        }
        println!("\nBye-bye!");
    }
    result
}
