//! Scripted stand-in for the MCU shell, for tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use super::McuSerial;
use crate::config::TransportConfig;

/// Transport settings with timeouts short enough for tests.
pub(crate) fn fast_config() -> TransportConfig {
    TransportConfig {
        device: "fake".into(),
        poll_timeout: Duration::from_millis(2),
        echo_timeout: Duration::from_millis(50),
        max_lines: 20,
        ..Default::default()
    }
}

/// Records every command it receives and answers with whatever the handler
/// returns. The handler's text is sent after the echoed command line and
/// must include the prompt if the reply is to complete.
#[derive(Clone, Default)]
pub(crate) struct FakeMcu {
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeMcu {
    pub(crate) fn spawn<F>(handler: F) -> (McuSerial, FakeMcu)
    where
        F: FnMut(&str) -> String + Send + 'static,
    {
        Self::spawn_with_config(fast_config(), handler)
    }

    pub(crate) fn spawn_with_config<F>(config: TransportConfig, handler: F) -> (McuSerial, FakeMcu)
    where
        F: FnMut(&str) -> String + Send + 'static,
    {
        let (client, server) = tokio::io::duplex(4096);
        let fake = FakeMcu::default();
        tokio::spawn(fake.clone().serve(server, handler));

        let (reader, writer) = tokio::io::split(client);
        (McuSerial::from_stream(reader, writer, config), fake)
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    async fn serve<F>(self, mut stream: DuplexStream, mut handler: F)
    where
        F: FnMut(&str) -> String,
    {
        let mut command = Vec::new();
        let mut byte = [0u8; 1];
        while stream.read_exact(&mut byte).await.is_ok() {
            if byte[0] != b'\r' {
                command.push(byte[0]);
                continue;
            }

            let text = String::from_utf8_lossy(&command).into_owned();
            command.clear();
            self.commands.lock().unwrap().push(text.clone());

            let reply = format!("{text}\r\n{}", handler(&text));
            if stream.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }
}
