//! Manager wire protocol parsing
//!
//! Packets are blocks of `Name: value` lines terminated by an empty line.
//! A packet whose first field has the value `Follows` embeds a raw sub-block
//! that runs until a line starting with `--END `.

use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::{
    constants::{END_SENTINEL, FIELD_DATA},
    error::{AmiError, AmiResult},
    packet::{Packet, ResponseStatus},
};

/// One line pulled off the socket.
#[derive(Debug, PartialEq, Eq)]
enum Line {
    /// Line content with the `\r\n` / `\n` terminator removed.
    Text(String),
    /// The read timeout elapsed before a full line arrived.
    TimedOut,
}

/// Split a field line on its first colon.
///
/// The value is everything after the colon minus one separating space.
/// Returns `None` for lines that carry no field.
pub(crate) fn split_field(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    Some((name, value.strip_prefix(' ').unwrap_or(value)))
}

/// Reads manager packets from a buffered byte stream.
///
/// Holds no packet state between calls; only a partially received line
/// survives a read timeout so no bytes are lost.
pub struct PacketReader<R> {
    inner: R,
    line: Vec<u8>,
    read_timeout: Option<Duration>,
}

impl<R: AsyncBufRead + Unpin> PacketReader<R> {
    /// Wrap a buffered reader. Reads block until data or EOF.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: Vec::new(),
            read_timeout: None,
        }
    }

    /// Wrap a buffered reader, giving up on a line after `read_timeout`.
    pub fn with_timeout(inner: R, read_timeout: Option<Duration>) -> Self {
        Self {
            inner,
            line: Vec::new(),
            read_timeout,
        }
    }

    /// Read a single line, terminator stripped.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    async fn next_line(&mut self) -> AmiResult<Line> {
        let read = self
            .inner
            .read_until(b'\n', &mut self.line);

        let bytes_read = match self.read_timeout {
            Some(limit) => match timeout(limit, read).await {
                Ok(result) => result?,
                Err(_) => return Ok(Line::TimedOut),
            },
            None => read.await?,
        };

        if bytes_read == 0 {
            return Err(AmiError::ConnectionClosed);
        }

        let text = String::from_utf8_lossy(&self.line)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        self.line
            .clear();
        trace!("[RECV] {}", text);
        Ok(Line::Text(text))
    }

    /// Read one raw line outside of packet framing (the manager greeting).
    ///
    /// Returns `None` if the read timeout elapsed first.
    pub async fn read_line(&mut self) -> AmiResult<Option<String>> {
        match self
            .next_line()
            .await?
        {
            Line::Text(text) => Ok(Some(text)),
            Line::TimedOut => Ok(None),
        }
    }

    /// Read the next complete packet.
    ///
    /// An empty packet means nothing arrived before the blank line (or the
    /// read timeout). A closed connection is an error, never an empty packet.
    pub async fn read_packet(&mut self) -> AmiResult<Packet> {
        let mut packet = Packet::new();

        loop {
            let raw = match self
                .next_line()
                .await?
            {
                Line::Text(raw) => raw,
                Line::TimedOut => {
                    if !packet.is_empty() {
                        debug!("[RECV] Read timed out mid-packet, returning partial packet");
                    }
                    return Ok(packet);
                }
            };

            let line = raw.trim_end();
            if line.is_empty() {
                return Ok(packet);
            }

            let Some((name, value)) = split_field(line) else {
                trace!("[RECV] Ignoring line without field separator: {:?}", line);
                continue;
            };

            let first = packet.is_empty();
            packet.set(name, value);

            if first && ResponseStatus::from_wire(value) == Some(ResponseStatus::Follows) {
                let (data, complete) = self
                    .read_follows_block()
                    .await?;
                packet.set(FIELD_DATA, data);
                if !complete {
                    return Ok(packet);
                }
            }
        }
    }

    /// Collect raw lines up to the `--END ` sentinel, which is consumed.
    ///
    /// Returns the data and whether the sentinel was seen before a timeout.
    async fn read_follows_block(&mut self) -> AmiResult<(String, bool)> {
        let mut data = String::new();
        loop {
            match self
                .next_line()
                .await?
            {
                Line::Text(raw) if raw.starts_with(END_SENTINEL) => return Ok((data, true)),
                Line::Text(raw) => {
                    data.push_str(&raw);
                    data.push('\n');
                }
                Line::TimedOut => {
                    debug!("[RECV] Read timed out inside Follows block");
                    return Ok((data, false));
                }
            }
        }
    }
}
