//! Newline delimited JSON framing
//!
//! Each message is serialized to a single line of JSON followed by `\n`.
//! JSON string escaping guarantees the payload never contains a raw newline,
//! so no length prefix is needed.

use std::io::{BufRead, Read, Write};

use crate::Message;
use crate::error::TransportError;

/// Default upper bound on the length of a single line
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024 * 1024;

/// Encode a message as one newline terminated line
pub fn encode(message: &Message) -> Result<Vec<u8>, TransportError> {
    let mut line = serde_json::to_vec(message).map_err(TransportError::Encode)?;
    line.push(b'\n');
    Ok(line)
}

/// Decode a single line (without its terminator)
pub fn decode(line: &[u8]) -> Result<Message, TransportError> {
    serde_json::from_slice(line).map_err(|source| TransportError::Decode {
        line: String::from_utf8_lossy(line).into_owned(),
        source,
    })
}

/// Reads newline delimited messages from a buffered source
pub struct MessageReader<R> {
    input: R,
    buffer: Vec<u8>,
    max_line_length: usize,
}

impl<R> MessageReader<R>
where
    R: BufRead,
{
    pub fn new(input: R) -> Self {
        Self {
            input,
            buffer: Vec::new(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// Block until a full line is available and decode it
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the stream ends before
    /// a complete line was read.
    pub fn read_message(&mut self) -> Result<Message, TransportError> {
        self.buffer.clear();
        let limit = self.max_line_length as u64 + 1;
        let read_size = (&mut self.input)
            .take(limit)
            .read_until(b'\n', &mut self.buffer)?;

        if read_size == 0 {
            return Err(TransportError::ConnectionClosed);
        }

        if self.buffer.last() != Some(&b'\n') {
            if self.buffer.len() > self.max_line_length {
                return Err(TransportError::MessageTooLarge {
                    max: self.max_line_length,
                });
            }
            tracing::debug!(
                partial_len = self.buffer.len(),
                "stream ended in the middle of a line"
            );
            return Err(TransportError::ConnectionClosed);
        }

        let mut line = &self.buffer[..self.buffer.len() - 1];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        tracing::trace!(content = %String::from_utf8_lossy(line), "received raw message");
        decode(line)
    }
}

/// Writes newline delimited messages, flushing after each one
pub struct MessageWriter<W> {
    output: W,
}

impl<W> MessageWriter<W>
where
    W: Write,
{
    pub fn new(output: W) -> Self {
        Self { output }
    }

    pub fn write_message(&mut self, message: &Message) -> Result<(), TransportError> {
        let line = encode(message)?;
        self.output.write_all(&line)?;
        self.output.flush()?;
        Ok(())
    }
}
