//! Top level wire messages
//!
//! Every line on the wire decodes to exactly one [`Message`]. The `type` field
//! selects the variant; the remaining fields belong to that variant.
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{EventRequest, EventResponse};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Binds the connection to the binary the server should analyse
    Init { binary_path: String },
    /// The server loaded the binary named in `Init`
    InitAck,
    /// A top level request, answered by `Complete` or `Error`
    Command(Command),
    /// Server-to-client sub-request issued while a command is running
    Event {
        #[serde(flatten)]
        event: EventRequest,
    },
    /// Client answer to the most recent `Event`
    EventResponse {
        #[serde(flatten)]
        data: EventResponse,
    },
    /// Terminal success answer to a `Command`
    Complete { result: Value },
    /// Terminal failure answer to a `Command` (or a rejected `Init`)
    Error { error: String },
}

impl Message {
    pub fn command(cmd: CommandKind, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Message::Command(Command::new(cmd, args))
    }

    pub fn error(error: impl fmt::Display) -> Self {
        Message::Error {
            error: error.to_string(),
        }
    }

    /// The `type` discriminator of this message
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Init { .. } => "Init",
            Message::InitAck => "InitAck",
            Message::Command(_) => "Command",
            Message::Event { .. } => "Event",
            Message::EventResponse { .. } => "EventResponse",
            Message::Complete { .. } => "Complete",
            Message::Error { .. } => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub cmd: CommandKind,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Command {
    pub fn new(cmd: CommandKind, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            cmd,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// First argument, which is the expression for the expression taking commands
    pub fn expression(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

/// The closed set of commands a server understands
///
/// Unknown command names fail at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Eval,
    Print,
    Methods,
    Functions,
    Shutdown,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Eval => "eval",
            CommandKind::Print => "print",
            CommandKind::Methods => "methods",
            CommandKind::Functions => "functions",
            CommandKind::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
