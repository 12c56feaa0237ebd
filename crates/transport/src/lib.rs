//! Wire protocol between a debugger client and an analysis server
//!
//! This crate contains the message types exchanged over a session and the
//! newline delimited JSON framing that carries them.
pub mod bindings;
pub mod codec;
mod connection;
mod error;
pub mod events;
pub mod io;
mod message;
pub mod results;

pub use connection::Connection;
pub use error::TransportError;
pub use events::{ArgumentType, EventRequest, EventResponse, MethodArgument, MethodCallResult};
pub use io::{InMemoryTransport, TcpTransport, Transport};
pub use message::{Command, CommandKind, Message};

/// The default host the analysis server listens on
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default port the analysis server listens on
pub const DEFAULT_PORT: u16 = 9001;
