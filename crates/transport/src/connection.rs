use std::io::{BufRead, Write};
use std::net::ToSocketAddrs;

use crate::Message;
use crate::codec::{MessageReader, MessageWriter};
use crate::error::TransportError;
use crate::io::{TcpTransport, Transport};

/// A framed, bidirectional message stream
///
/// Both the client and the server side of a session talk through a
/// `Connection`: [`send`](Connection::send) writes one line and flushes,
/// [`receive`](Connection::receive) blocks until one full line is available.
///
/// # Example
///
/// ```no_run
/// use transport::{Connection, Message};
///
/// let mut conn = Connection::connect("127.0.0.1:9001")?;
/// conn.send(&Message::Init { binary_path: "/bin/true".into() })?;
/// let reply = conn.receive()?;
/// # Ok::<(), transport::TransportError>(())
/// ```
pub struct Connection {
    reader: MessageReader<Box<dyn BufRead + Send>>,
    writer: MessageWriter<Box<dyn Write + Send>>,
}

impl Connection {
    /// Create a connection from any [`Transport`]
    pub fn with_transport<T>(transport: T) -> Result<Self, TransportError>
    where
        T: Transport,
    {
        let (input, output) = transport.split()?;
        Ok(Self {
            reader: MessageReader::new(Box::new(input) as Box<dyn BufRead + Send>),
            writer: MessageWriter::new(Box::new(output) as Box<dyn Write + Send>),
        })
    }

    /// Connect over TCP
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let transport = TcpTransport::connect(addr)?;
        Self::with_transport(transport)
    }

    #[tracing::instrument(skip_all, level = "trace", fields(kind = message.kind()))]
    pub fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        tracing::trace!(?message, "sending message");
        self.writer.write_message(message)
    }

    pub fn receive(&mut self) -> Result<Message, TransportError> {
        let message = self.reader.read_message()?;
        tracing::trace!(?message, "received message");
        Ok(message)
    }
}
