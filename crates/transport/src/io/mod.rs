//! IO abstraction layer for the message transport
//!
//! This module provides an abstraction over the byte streams a session can
//! run over. The core trait [`Transport`] allows plugging in different IO
//! implementations such as TCP sockets or in-memory channels.
//!
//! # Examples
//!
//! ## Using TCP Transport
//!
//! ```no_run
//! use transport::io::TcpTransport;
//! use transport::Connection;
//!
//! let transport = TcpTransport::connect("127.0.0.1:9001")?;
//! let connection = Connection::with_transport(transport)?;
//! # Ok::<(), eyre::Error>(())
//! ```
//!
//! ## Using In-Memory Transport for Testing
//!
//! ```
//! use transport::io::InMemoryTransport;
//! use transport::Connection;
//!
//! let (client_transport, server_transport) = InMemoryTransport::pair();
//! let client = Connection::with_transport(client_transport)?;
//! let server = Connection::with_transport(server_transport)?;
//! # Ok::<(), eyre::Error>(())
//! ```

use std::io::{self, BufRead, Write};

mod memory;
mod tcp;


pub use memory::{InMemoryReader, InMemoryTransport, InMemoryWriter};
pub use tcp::{TcpTransport, is_reachable};

/// Trait for a bidirectional byte stream carrying messages
///
/// Implementations provide a way to split the transport into separate reader
/// and writer halves.
///
/// # Requirements
///
/// - The reader must implement [`BufRead`] for line based parsing
/// - The writer must implement [`Write`] for sending messages
/// - Reads block until data is available or the peer goes away; a closed
///   peer is reported as end of stream
pub trait Transport: Send + 'static {
    /// The reader type that implements BufRead
    type Reader: BufRead + Send + 'static;

    /// The writer type that implements Write
    type Writer: Write + Send + 'static;

    /// Split the transport into separate reader and writer halves
    ///
    /// - For TCP: Creates cloned handles to the same underlying socket
    /// - For in-memory: Returns the two ends of a bidirectional channel
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be split (e.g., socket cloning fails)
    fn split(self) -> io::Result<(Self::Reader, Self::Writer)>;
}
