//! Shared, serialised access to the MCU serial link.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::hw_trait::{HwError, Result};
use crate::tracing::prelude::*;
use crate::transport::{McuSerial, Outcome, TransportStats};

/// One command's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McuReply {
    pub outcome: Outcome,
    /// Block including the status token.
    pub full: String,
    /// Block with the status token removed.
    pub payload: String,
}

impl McuReply {
    fn capture(serial: &McuSerial, outcome: Outcome) -> Self {
        Self {
            outcome,
            full: serial.get_full(),
            payload: serial.get(),
        }
    }

    /// Turn a non-OK reply into [`HwError::Mcu`].
    pub fn into_ok(self) -> Result<Self> {
        if self.outcome.is_ok() {
            Ok(self)
        } else {
            Err(HwError::Mcu {
                outcome: self.outcome,
                response: self.full,
            })
        }
    }
}

/// Handle to the MCU link, cheap to clone.
///
/// Every clone refers to the same transport; the mutex keeps one command in
/// flight at a time.
#[derive(Clone)]
pub struct McuChannel {
    serial: Arc<Mutex<McuSerial>>,
    simulated: bool,
}

impl McuChannel {
    pub fn new(serial: McuSerial) -> Self {
        let simulated = serial.is_simulated();
        Self {
            serial: Arc::new(Mutex::new(serial)),
            simulated,
        }
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    /// Exclusive access to the transport, for sequences of commands that
    /// must not be interleaved with others.
    pub async fn lock(&self) -> MutexGuard<'_, McuSerial> {
        self.serial.lock().await
    }

    /// Send a command and return its reply whatever the outcome.
    pub async fn exchange(&self, command: &str) -> Result<McuReply> {
        let mut serial = self.lock().await;
        exchange_locked(&mut serial, command, None).await
    }

    /// Send a command; anything but an OK reply is an error.
    pub async fn command(&self, command: &str) -> Result<McuReply> {
        let reply = self.exchange(command).await?;
        if !reply.outcome.is_ok() {
            warn!(command, outcome = %reply.outcome, response = %reply.full, "MCU command failed");
        }
        reply.into_ok()
    }

    pub async fn stats(&self) -> TransportStats {
        self.lock().await.stats()
    }
}

/// Send one command on an already locked transport.
///
/// `budget` overrides the transport's read-attempt bound.
pub(crate) async fn exchange_locked(
    serial: &mut McuSerial,
    command: &str,
    budget: Option<usize>,
) -> Result<McuReply> {
    let outcome = match budget {
        Some(max_lines) => serial.send_with_budget(command, max_lines).await?,
        None => serial.send(command).await?,
    };
    Ok(McuReply::capture(serial, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::transport::testing::FakeMcu;
    use crate::transport::SIMULATED_NOTICE;

    #[tokio::test]
    async fn command_ok() {
        let (serial, fake) = FakeMcu::spawn(|_| "OK: All power domains are completely ON.\n> ".into());
        let channel = McuChannel::new(serial);

        let reply = channel.command("power all").await.unwrap();
        assert_eq!(reply.outcome, Outcome::Ok);
        assert_eq!(reply.payload, "All power domains are completely ON.");
        assert_eq!(fake.commands(), vec!["power all"]);
        assert_eq!(channel.stats().await.access_write, 1);
    }

    #[tokio::test]
    async fn command_rejects_warning() {
        let (serial, _fake) = FakeMcu::spawn(|_| "WARNING: GPIO power-good is read-only!\n> ".into());
        let channel = McuChannel::new(serial);

        let err = channel.command("gpio power-good 0x1").await.unwrap_err();
        match err {
            HwError::Mcu { outcome, response } => {
                assert_eq!(outcome, Outcome::Warning);
                assert_eq!(response, "WARNING: GPIO power-good is read-only!");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn exchange_keeps_any_outcome() {
        let (serial, _fake) = FakeMcu::spawn(|_| "Unknown command.\n> ".into());
        let channel = McuChannel::new(serial);
        let reply = channel.exchange("bogus").await.unwrap();
        assert_eq!(reply.outcome, Outcome::Unknown);
        assert_eq!(reply.payload, "Unknown command.");
    }

    #[tokio::test]
    async fn simulated_channel() {
        let channel = McuChannel::new(McuSerial::simulated(TransportConfig::with_device("")));
        assert!(channel.is_simulated());
        let reply = channel.command("power all 1").await.unwrap();
        assert_eq!(reply.full, SIMULATED_NOTICE);
    }
}
