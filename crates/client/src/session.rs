//! Client side of the command exchange
//!
//! A [`Session`] is one connection bound to one binary. Each call to
//! [`Session::execute`] sends a single command and then services events until
//! the server terminates the command:
//!
//! ```text
//! Idle --Command--> AwaitingResponse
//! AwaitingResponse --Event--> (dispatch, reply) --> AwaitingResponse
//! AwaitingResponse --Complete | Error--> Idle
//! AwaitingResponse --anything else / closed--> Broken
//! ```
use std::path::{Path, PathBuf};

use serde_json::Value;
use transport::{Command, Connection, Message, Transport};

use crate::backend::DebuggerSession;
use crate::dispatch::dispatch;
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    AwaitingResponse,
    Broken,
}

/// How a command terminated
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Complete(Value),
    /// The server failed the command; the session stays usable
    Failed(String),
}

pub struct Session {
    connection: Connection,
    binary_path: PathBuf,
    state: State,
}

impl Session {
    /// Bind a new connection to `binary_path`
    ///
    /// Sends `Init` and waits for the server to accept the binary.
    #[tracing::instrument(skip_all, fields(binary = %binary_path.as_ref().display()))]
    pub fn open<T>(transport: T, binary_path: impl AsRef<Path>) -> Result<Self, SessionError>
    where
        T: Transport,
    {
        let binary_path = binary_path.as_ref().to_path_buf();
        let connection = Connection::with_transport(transport)?;
        Self::handshake(connection, binary_path)
    }

    fn handshake(
        mut connection: Connection,
        binary_path: PathBuf,
    ) -> Result<Self, SessionError> {
        connection.send(&Message::Init {
            binary_path: binary_path.to_string_lossy().into_owned(),
        })?;

        match connection.receive()? {
            Message::InitAck => {
                tracing::debug!("session established");
                Ok(Self {
                    connection,
                    binary_path,
                    state: State::Idle,
                })
            }
            Message::Error { error } => Err(SessionError::InitRejected(error)),
            other => Err(SessionError::Protocol(format!(
                "expected InitAck, got {}",
                other.kind()
            ))),
        }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Whether the session can still carry commands
    pub fn is_usable(&self) -> bool {
        self.state != State::Broken
    }

    /// Run one command to completion, answering events with `debugger`
    ///
    /// An `Err` means the session is broken and must be replaced.
    #[tracing::instrument(skip(self, debugger), fields(cmd = %command.cmd))]
    pub fn execute(
        &mut self,
        command: Command,
        debugger: &mut dyn DebuggerSession,
    ) -> Result<CommandOutcome, SessionError> {
        if self.state == State::Broken {
            return Err(SessionError::Broken);
        }

        let result = self.exchange(command, debugger);
        self.state = match result {
            Ok(_) => State::Idle,
            Err(ref e) => {
                tracing::warn!(error = %e, "session failed");
                State::Broken
            }
        };
        result
    }

    fn exchange(
        &mut self,
        command: Command,
        debugger: &mut dyn DebuggerSession,
    ) -> Result<CommandOutcome, SessionError> {
        self.connection.send(&Message::Command(command))?;
        self.state = State::AwaitingResponse;

        let mut events = 0usize;
        loop {
            match self.connection.receive()? {
                Message::Event { event } => {
                    events += 1;
                    let data = dispatch(debugger, &event);
                    tracing::trace!(request = event.name(), response = data.name(), "answering event");
                    self.connection.send(&Message::EventResponse { data })?;
                }
                Message::Complete { result } => {
                    tracing::debug!(events, "command complete");
                    return Ok(CommandOutcome::Complete(result));
                }
                Message::Error { error } => {
                    tracing::debug!(events, %error, "command failed");
                    return Ok(CommandOutcome::Failed(error));
                }
                other => {
                    return Err(SessionError::Protocol(format!(
                        "unexpected {} while awaiting a response",
                        other.kind()
                    )));
                }
            }
        }
    }
}
