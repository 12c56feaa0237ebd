//! Error types for the client side of a session.

use std::io;

use transport::TransportError;

use crate::backend::BackendError;

/// Reasons an event handler cannot satisfy a request
///
/// Every variant is reported back to the server as an `EventResponse` with
/// `event = "Error"`; the display string is the message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DelegateError {
    #[error("No target selected")]
    NoTarget,

    #[error("No process")]
    NoProcess,

    #[error("No selected thread")]
    NoThread,

    #[error("No selected frame")]
    NoFrame,

    #[error("Register '{0}' not found")]
    RegisterNotFound(String),

    #[error("Register index {index} not found (only have {count} registers)")]
    RegisterIndexOutOfRange { index: usize, count: usize },

    #[error("No modules loaded")]
    NoModules,

    #[error("Memory read failed: {0}")]
    MemoryRead(#[source] BackendError),

    #[error("Memory write failed: {0}")]
    MemoryWrite(#[source] BackendError),

    #[error("Memory write failed: wrote {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },

    #[error("Expression evaluation failed: {0}")]
    Evaluation(#[source] BackendError),

    #[error("Memory allocation failed: {0}")]
    Allocation(String),

    #[error("Invalid {kind} argument {value:?}")]
    InvalidArgument { kind: &'static str, value: String },

    #[error("Return type size must be non-zero")]
    ZeroSizedReturn,

    #[error("{kind} call failed: {message}")]
    CallFailed { kind: &'static str, message: String },

    #[error("Could not get address of complex return value")]
    NoReturnAddress,

    #[error("Unknown event type")]
    UnknownEvent,

    #[error("Event handling error: {0}")]
    Panicked(String),
}

/// Errors that end a session
///
/// A session that returned any of these is no longer usable; the caller
/// must establish a new one.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server went away while a reply was outstanding
    #[error("server closed the connection")]
    ConnectionClosed,

    #[error(transparent)]
    Transport(TransportError),

    /// The peer sent something the protocol does not allow at this point
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("server rejected binary: {0}")]
    InitRejected(String),

    #[error("session is no longer usable after an earlier failure")]
    Broken,
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionClosed => SessionError::ConnectionClosed,
            other => SessionError::Transport(other),
        }
    }
}

/// Errors from the connection manager
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("No target selected")]
    NoTarget,

    #[error("No executable in target")]
    NoExecutable,

    #[error("failed to start server: {0}")]
    Launch(#[source] io::Error),

    #[error("server at {addr} not reachable after {attempts} attempts")]
    ServerUnavailable { addr: String, attempts: u32 },

    #[error("connecting to server at {addr}")]
    Connect {
        addr: String,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Session(#[from] SessionError),
}
