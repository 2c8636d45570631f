//! Command/response exchange with the MCU shell over a serial port.
//!
//! One [`McuSerial`] owns the port. Each [`McuSerial::send`] writes a
//! command, discards the echoed command line and collects the reply block
//! up to the prompt. The block stays available through [`McuSerial::get`]
//! and friends until the next command.
//!
//! An empty device path selects simulated hardware access: nothing is
//! opened and every command succeeds with a fixed notice.

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::{McuLine, McuLineCodec};
use super::response::{Outcome, strip_status};
use crate::config::TransportConfig;
use crate::tracing::prelude::*;

/// Response block recorded for every command in simulated mode.
pub const SIMULATED_RESPONSE: &str = "OK (simulated hardware access)";

/// What [`McuSerial::get`] and [`McuSerial::get_full`] return in simulated
/// mode.
pub const SIMULATED_NOTICE: &str = "Simulated hardware access!";

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open serial device {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serial device closed")]
    Closed,

    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),

    #[error("no prompt after {lines} read attempts")]
    IncompleteResponse { lines: usize, partial: String },
}

/// Access counters of one transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub error_count: u64,
    pub access_read: u64,
    pub access_write: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl fmt::Display for TransportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error count       : {}", self.error_count)?;
        writeln!(f, "Read accesses     : {}", self.access_read)?;
        writeln!(f, "Write accesses    : {}", self.access_write)?;
        writeln!(f, "Bytes read        : {}", self.bytes_read)?;
        write!(f, "Bytes written     : {}", self.bytes_written)
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct McuIo {
    reader: FramedRead<BoxedReader, McuLineCodec>,
    writer: FramedWrite<BoxedWriter, McuLineCodec>,
}

/// Serial transport to the MCU shell.
pub struct McuSerial {
    config: TransportConfig,
    /// `None` in simulated mode.
    io: Option<McuIo>,
    response: String,
    stats: TransportStats,
}

impl fmt::Debug for McuSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McuSerial")
            .field("device", &self.config.device)
            .field("simulated", &self.is_simulated())
            .field("stats", &self.stats)
            .finish()
    }
}

impl McuSerial {
    /// Open the configured serial device.
    ///
    /// Must be called from within a tokio runtime. An empty device path
    /// yields a simulated transport.
    pub fn open(config: TransportConfig) -> Result<Self, TransportError> {
        if config.is_simulated() {
            info!("No serial device given, using simulated hardware access only");
            return Ok(Self::simulated(config));
        }

        let port = tokio_serial::new(&config.device, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.write_timeout)
            .open_native_async()
            .map_err(|source| TransportError::Open {
                device: config.device.clone(),
                source,
            })?;

        debug!(device = %config.device, baud = config.baud_rate, "Opened MCU serial port");
        let (reader, writer) = tokio::io::split(port);
        Ok(Self::from_stream(reader, writer, config))
    }

    /// Transport over an already open byte stream.
    pub fn from_stream<R, W>(reader: R, writer: W, config: TransportConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        Self {
            config,
            io: Some(McuIo {
                reader: FramedRead::new(reader, McuLineCodec),
                writer: FramedWrite::new(writer, McuLineCodec),
            }),
            response: String::new(),
            stats: TransportStats::default(),
        }
    }

    /// Transport that never touches hardware.
    pub fn simulated(config: TransportConfig) -> Self {
        Self {
            config,
            io: None,
            response: String::new(),
            stats: TransportStats::default(),
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.io.is_none()
    }

    pub fn device(&self) -> &str {
        &self.config.device
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// Send a command and collect its response block.
    ///
    /// The returned outcome is the classification of the block. Transport
    /// failures are counted in [`TransportStats::error_count`] and never
    /// retried here.
    pub async fn send(&mut self, command: &str) -> Result<Outcome, TransportError> {
        self.send_with_budget(command, self.config.max_lines).await
    }

    /// Like [`send`](Self::send), with an explicit bound on read attempts.
    ///
    /// Commands whose reply takes long to produce, such as a bus scan, need
    /// a larger budget than the default.
    pub async fn send_with_budget(
        &mut self,
        command: &str,
        max_lines: usize,
    ) -> Result<Outcome, TransportError> {
        self.response.clear();

        if self.is_simulated() {
            debug!(command, "Simulated hardware access, command not sent");
            self.response.push_str(SIMULATED_RESPONSE);
            return Ok(Outcome::Ok);
        }

        debug!(command, "MCU command");
        if let Err(e) = self.write_command(command).await {
            self.stats.error_count += 1;
            error!(command, error = %e, "Failed to send MCU command");
            return Err(e);
        }
        self.stats.access_write += 1;
        self.stats.bytes_written += command.len() as u64 + 1;

        self.stats.access_read += 1;
        match self.read_response(max_lines).await {
            Ok(()) => {
                let outcome = self.eval();
                trace!(command, %outcome, response = ?self.response, "MCU response");
                Ok(outcome)
            }
            Err(e) => {
                self.stats.error_count += 1;
                error!(command, error = %e, "Failed to read MCU response");
                Err(e)
            }
        }
    }

    /// Status of the last response block.
    pub fn eval(&self) -> Outcome {
        if self.is_simulated() {
            return Outcome::Ok;
        }
        Outcome::classify(&self.response)
    }

    /// Last response block with its status token removed.
    pub fn get(&self) -> String {
        if self.is_simulated() {
            return SIMULATED_NOTICE.to_string();
        }
        strip_status(&self.response).to_string()
    }

    /// Last response block including its status token.
    pub fn get_full(&self) -> String {
        if self.is_simulated() {
            return SIMULATED_NOTICE.to_string();
        }
        self.response.trim_end_matches(['\n', '\r']).to_string()
    }

    /// Discard pending input, for example after an incomplete response.
    pub async fn clear(&mut self) -> Result<(), TransportError> {
        let poll = self.config.poll_timeout;
        let mut discarded = 0;
        for _ in 0..self.config.max_lines {
            match self.read_line(poll).await? {
                Some(_) => discarded += 1,
                None => break,
            }
        }
        if let Some(io) = self.io.as_mut() {
            io.reader.read_buffer_mut().clear();
        }
        self.response.clear();
        trace!(discarded, "Cleared MCU input");
        Ok(())
    }

    async fn write_command(&mut self, command: &str) -> Result<(), TransportError> {
        let write_timeout = self.config.write_timeout;
        let Some(io) = self.io.as_mut() else {
            return Ok(());
        };

        // The carriage return goes out as its own write. Sending command and
        // terminator in one burst loses characters on this link.
        for chunk in [command, "\r"] {
            tokio::time::timeout(write_timeout, io.writer.send(chunk))
                .await
                .map_err(|_| TransportError::WriteTimeout(write_timeout))??;
        }
        Ok(())
    }

    /// Read one line, or `None` if nothing complete arrived in time.
    async fn read_line(&mut self, wait: Duration) -> Result<Option<McuLine>, TransportError> {
        let Some(io) = self.io.as_mut() else {
            return Ok(None);
        };

        match tokio::time::timeout(wait, io.reader.next()).await {
            Err(_) => Ok(None),
            Ok(None) => Err(TransportError::Closed),
            Ok(Some(Err(e))) => Err(TransportError::Io(e)),
            Ok(Some(Ok(line))) => {
                self.stats.bytes_read += line.len() as u64;
                Ok(Some(line))
            }
        }
    }

    /// Skip the echoed command, then collect lines until the prompt.
    ///
    /// One attempt counter covers both phases; a timeout counts as an
    /// attempt.
    async fn read_response(&mut self, max_lines: usize) -> Result<(), TransportError> {
        let echo_timeout = self.config.echo_timeout;
        let poll_timeout = self.config.poll_timeout;
        let mut attempts = 0usize;

        loop {
            attempts += 1;
            if let Some(McuLine::Text(echo)) = self.read_line(echo_timeout).await? {
                trace!(echo = ?echo, "MCU echo");
                break;
            }
            if attempts > max_lines {
                break;
            }
        }

        loop {
            attempts += 1;
            let line = self.read_line(poll_timeout).await?;
            if line == Some(McuLine::Prompt) {
                return Ok(());
            }
            if attempts > max_lines {
                return Err(TransportError::IncompleteResponse {
                    lines: attempts,
                    partial: self.response.clone(),
                });
            }
            if let Some(McuLine::Text(text)) = line {
                self.response.push_str(text.trim_end_matches(['\n', '\r']));
                // A line that was only a line break adds nothing.
                if text.find('\n').is_some_and(|pos| pos > 0) {
                    self.response.push('\n');
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{FakeMcu, fast_config};

    #[tokio::test]
    async fn ok_response() {
        let (mut serial, fake) = FakeMcu::spawn(|_| "OK: 0x42\n> ".to_string());

        let outcome = serial.send("gpio led-user").await.unwrap();
        assert_eq!(outcome, Outcome::Ok);
        assert_eq!(serial.eval(), Outcome::Ok);
        assert_eq!(serial.get(), "0x42");
        assert_eq!(serial.get_full(), "OK: 0x42");
        assert_eq!(fake.commands(), vec!["gpio led-user"]);
    }

    #[tokio::test]
    async fn multi_line_block() {
        let (mut serial, _fake) = FakeMcu::spawn(|_| {
            "ERROR: Error flags from I2C the master 3: 0x00000004\r\n\
             - Address acknowledge error.\r\n\r\n> "
                .to_string()
        });

        let outcome = serial.send("i2c 3 0x50 0x1 1").await.unwrap();
        assert_eq!(outcome, Outcome::Error);
        assert_eq!(
            serial.get_full(),
            "ERROR: Error flags from I2C the master 3: 0x00000004\n- Address acknowledge error."
        );
        assert_eq!(
            serial.get(),
            "Error flags from I2C the master 3: 0x00000004\n- Address acknowledge error."
        );
    }

    #[tokio::test]
    async fn echo_is_not_part_of_response() {
        let (mut serial, _fake) = FakeMcu::spawn(|cmd| format!("OK: echoed {cmd}\n> "));
        serial.send("power all").await.unwrap();
        assert_eq!(serial.get_full(), "OK: echoed power all");
    }

    #[tokio::test]
    async fn unknown_reply() {
        let (mut serial, _fake) = FakeMcu::spawn(|_| "Command not recognized.\n> ".to_string());
        assert_eq!(serial.send("bogus").await.unwrap(), Outcome::Unknown);
        assert_eq!(serial.get(), "Command not recognized.");
    }

    #[tokio::test]
    async fn missing_prompt_is_incomplete() {
        let mut config = fast_config();
        config.max_lines = 5;
        let (mut serial, _fake) =
            FakeMcu::spawn_with_config(config, |_| "OK: still talking\n".to_string());

        let err = serial.send("power all").await.unwrap_err();
        assert!(matches!(err, TransportError::IncompleteResponse { .. }));
        assert_eq!(serial.stats().error_count, 1);
    }

    #[tokio::test]
    async fn counters() {
        let (mut serial, _fake) = FakeMcu::spawn(|_| "OK.\n> ".to_string());
        serial.send("abc").await.unwrap();
        serial.send("de").await.unwrap();

        let stats = serial.stats();
        assert_eq!(stats.access_write, 2);
        assert_eq!(stats.access_read, 2);
        assert_eq!(stats.bytes_written, 4 + 3);
        // echo "abc\r\n" + "OK.\n" + "> ", then "de\r\n" + "OK.\n" + "> "
        assert_eq!(stats.bytes_read, (5 + 4 + 2) + (4 + 4 + 2));
        assert_eq!(stats.error_count, 0);
    }

    #[tokio::test]
    async fn closed_stream() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let (reader, writer) = tokio::io::split(client);
        let mut serial = McuSerial::from_stream(reader, writer, fast_config());
        assert!(serial.send("power all").await.is_err());
        assert_eq!(serial.stats().error_count, 1);
    }

    #[tokio::test]
    async fn simulated_mode() {
        let mut serial = McuSerial::simulated(TransportConfig::with_device(""));
        assert!(serial.is_simulated());
        assert_eq!(serial.send("power all 1").await.unwrap(), Outcome::Ok);
        assert_eq!(serial.eval(), Outcome::Ok);
        assert_eq!(serial.get(), SIMULATED_NOTICE);
        assert_eq!(serial.get_full(), SIMULATED_NOTICE);
        assert_eq!(serial.stats(), TransportStats::default());
    }

    #[tokio::test]
    async fn open_empty_device_is_simulated() {
        let serial = McuSerial::open(TransportConfig::with_device("")).unwrap();
        assert!(serial.is_simulated());
    }

    #[tokio::test]
    async fn open_missing_device_fails() {
        let err = McuSerial::open(TransportConfig::with_device("/dev/does-not-exist-mcu")).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }
}
