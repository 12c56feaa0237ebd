//! In-memory transport implementation for testing

use std::io::{self, BufRead, Cursor, Read, Write};

use crossbeam_channel::{Receiver, Sender};

use super::Transport;

/// In-memory transport for testing
///
/// This transport uses channels for bidirectional communication without
/// requiring actual network connections. It's primarily intended for tests
/// where you want to drive both ends of a session from one process.
///
/// # Examples
///
/// ```
/// use transport::io::InMemoryTransport;
/// use transport::Connection;
///
/// // Create a connected pair of transports
/// let (client_transport, server_transport) = InMemoryTransport::pair();
///
/// let client = Connection::with_transport(client_transport)?;
/// // Use server_transport to play the other side of the session
/// # Ok::<(), eyre::Error>(())
/// ```
pub struct InMemoryTransport {
    reader: InMemoryReader,
    writer: InMemoryWriter,
}

/// Reader half of in-memory transport
///
/// Implements [`BufRead`] by reading from a channel and maintaining an
/// internal buffer. When the channel is empty it blocks until the peer
/// writes; once the peer is dropped it reports end of stream.
pub struct InMemoryReader {
    buffer: Cursor<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

/// Writer half of in-memory transport
///
/// Implements [`Write`] by sending data through a channel
pub struct InMemoryWriter {
    tx: Sender<Vec<u8>>,
}

impl InMemoryTransport {
    /// Create a connected pair of in-memory transports
    ///
    /// Returns `(client_transport, server_transport)` where data written to
    /// one can be read from the other.
    pub fn pair() -> (Self, Self) {
        let (client_tx, server_rx) = crossbeam_channel::unbounded();
        let (server_tx, client_rx) = crossbeam_channel::unbounded();

        let client = Self {
            reader: InMemoryReader {
                buffer: Cursor::new(Vec::new()),
                rx: client_rx,
            },
            writer: InMemoryWriter { tx: client_tx },
        };

        let server = Self {
            reader: InMemoryReader {
                buffer: Cursor::new(Vec::new()),
                rx: server_rx,
            },
            writer: InMemoryWriter { tx: server_tx },
        };

        (client, server)
    }
}

impl Transport for InMemoryTransport {
    type Reader = InMemoryReader;
    type Writer = InMemoryWriter;

    fn split(self) -> io::Result<(Self::Reader, Self::Writer)> {
        Ok((self.reader, self.writer))
    }
}

impl BufRead for InMemoryReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        // If current buffer is exhausted, wait for more data
        if self.buffer.position() >= self.buffer.get_ref().len() as u64 {
            match self.rx.recv() {
                Ok(data) => {
                    self.buffer = Cursor::new(data);
                }
                Err(_) => {
                    // Channel closed, return EOF
                    return Ok(&[]);
                }
            }
        }

        self.buffer.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.buffer.consume(amt)
    }
}

impl Read for InMemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let len = std::cmp::min(available.len(), buf.len());
        buf[..len].copy_from_slice(&available[..len]);
        self.consume(len);
        Ok(len)
    }
}

impl Write for InMemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel disconnected"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // No-op for channels (always immediately flushed)
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_bidirectional_communication() -> io::Result<()> {
        let (client, server) = InMemoryTransport::pair();
        let (mut client_reader, mut client_writer) = client.split()?;
        let (mut server_reader, mut server_writer) = server.split()?;

        let msg = b"Hello from client";
        client_writer.write_all(msg)?;

        let mut buf = vec![0u8; msg.len()];
        server_reader.read_exact(&mut buf)?;
        assert_eq!(&buf, msg);

        let response = b"Hello from server";
        server_writer.write_all(response)?;

        let mut buf = vec![0u8; response.len()];
        client_reader.read_exact(&mut buf)?;
        assert_eq!(&buf, response);

        Ok(())
    }

    #[test]
    fn test_eof_on_disconnect() -> io::Result<()> {
        let (client, server) = InMemoryTransport::pair();
        let (mut reader, _writer) = client.split()?;

        drop(server);

        let buf = reader.fill_buf()?;
        assert_eq!(buf.len(), 0);

        Ok(())
    }

    #[test]
    fn test_lines_span_writes() -> io::Result<()> {
        let (client, server) = InMemoryTransport::pair();
        let (mut client_reader, _client_writer) = client.split()?;
        let (_server_reader, mut server_writer) = server.split()?;

        server_writer.write_all(b"{\"a\":")?;
        server_writer.write_all(b"1}\n{\"b\"")?;
        server_writer.write_all(b":2}\n")?;

        let mut line = String::new();
        client_reader.read_line(&mut line)?;
        assert_eq!(line, "{\"a\":1}\n");

        line.clear();
        client_reader.read_line(&mut line)?;
        assert_eq!(line, "{\"b\":2}\n");

        Ok(())
    }

    #[test]
    fn test_write_after_peer_dropped_is_broken_pipe() {
        let (client, server) = InMemoryTransport::pair();
        let (_reader, mut writer) = client.split().unwrap();
        drop(server);

        let err = writer.write_all(b"late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
