//! Line framing for the MCU shell.
//!
//! The shell ends every reply with a prompt that has no trailing newline, so
//! a plain line codec would never yield it. This decoder emits complete
//! lines as they arrive and the prompt once the buffer holds exactly the
//! prompt text.

use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::tracing::prelude::*;

/// Prompt printed by the MCU shell when it is ready for the next command.
pub const PROMPT: &str = "> ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McuLine {
    /// A line including its terminating newline.
    Text(String),
    Prompt,
}

impl McuLine {
    /// Number of bytes the line occupied on the wire.
    pub fn len(&self) -> usize {
        match self {
            McuLine::Text(text) => text.len(),
            McuLine::Prompt => PROMPT.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decoder for MCU output and encoder for command text.
#[derive(Debug, Clone, Default)]
pub struct McuLineCodec;

impl Decoder for McuLineCodec {
    type Item = McuLine;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(pos) = src.iter().position(|b| *b == b'\n') {
            let line = src.split_to(pos + 1);
            let text = String::from_utf8_lossy(&line).into_owned();
            trace!(line = ?text, "MCU rx");
            return Ok(Some(McuLine::Text(text)));
        }

        if &src[..] == PROMPT.as_bytes() {
            src.clear();
            trace!("MCU prompt");
            return Ok(Some(McuLine::Prompt));
        }

        Ok(None)
    }
}

impl<'a> Encoder<&'a str> for McuLineCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &'a str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        trace!(text = ?item, "MCU tx");
        dst.reserve(item.len());
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}
