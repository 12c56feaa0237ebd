//! Server side of one session
use std::path::Path;
use std::sync::Arc;

use eyre::WrapErr;
use serde_json::Value;
use transport::{Command, CommandKind, Connection, Message, TransportError};

use crate::delegate::Delegate;
use crate::engine::{Engine, EngineFactory};

/// Why a session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The client went away
    Disconnected,
    /// The engine refused the binary named in `Init`
    Rejected,
    /// The client asked the server to stop
    Shutdown,
}

/// Drives one client connection: the `Init` handshake, then commands until
/// the client disconnects
pub struct ServerConnection {
    connection: Connection,
    factory: Arc<dyn EngineFactory>,
    session: u64,
}

impl ServerConnection {
    pub fn new(connection: Connection, factory: Arc<dyn EngineFactory>, session: u64) -> Self {
        Self {
            connection,
            factory,
            session,
        }
    }

    /// Serve the connection to completion
    ///
    /// An `Err` is a protocol or transport failure; the connection must be
    /// dropped.
    #[tracing::instrument(skip(self), fields(session = self.session))]
    pub fn run(mut self) -> eyre::Result<Exit> {
        let mut engine = match self.handshake()? {
            Handshake::Bound(engine) => engine,
            Handshake::Finished(exit) => return Ok(exit),
        };

        loop {
            let Some(command) = self.next_message("a command")? else {
                tracing::debug!("client disconnected");
                return Ok(Exit::Disconnected);
            };

            let command = match command {
                Message::Command(command) => command,
                other => eyre::bail!(
                    "protocol violation: unexpected {} while awaiting a command",
                    other.kind()
                ),
            };

            if command.cmd == CommandKind::Shutdown {
                self.acknowledge_shutdown()?;
                return Ok(Exit::Shutdown);
            }

            self.run_command(engine.as_mut(), &command)?;
        }
    }

    fn handshake(&mut self) -> eyre::Result<Handshake> {
        let Some(first) = self.next_message("Init")? else {
            // reachability probes connect and leave without a word
            tracing::debug!("client disconnected before Init");
            return Ok(Handshake::Finished(Exit::Disconnected));
        };

        match first {
            Message::Init { binary_path } => {
                let span = tracing::debug_span!("init", binary = %binary_path);
                let _guard = span.enter();

                match self.factory.open(Path::new(&binary_path)) {
                    Ok(engine) => {
                        self.connection.send(&Message::InitAck)?;
                        tracing::info!(binary = %binary_path, "session bound");
                        Ok(Handshake::Bound(engine))
                    }
                    Err(e) => {
                        tracing::warn!(error = %format!("{e:#}"), "rejecting binary");
                        self.connection.send(&Message::error(format!("{e:#}")))?;
                        Ok(Handshake::Finished(Exit::Rejected))
                    }
                }
            }
            Message::Command(command) if command.cmd == CommandKind::Shutdown => {
                self.acknowledge_shutdown()?;
                Ok(Handshake::Finished(Exit::Shutdown))
            }
            other => {
                let message = format!(
                    "protocol violation: expected Init, got {}",
                    other.kind()
                );
                // best effort, the connection is dropped either way
                let _ = self.connection.send(&Message::error(&message));
                Err(eyre::eyre!(message))
            }
        }
    }

    /// Next decodable message, `None` once the client hangs up
    ///
    /// Lines that fail to decode are answered with `Error` and skipped.
    fn next_message(&mut self, expecting: &str) -> eyre::Result<Option<Message>> {
        loop {
            match self.connection.receive() {
                Ok(message) => return Ok(Some(message)),
                Err(TransportError::ConnectionClosed) => return Ok(None),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(error = %e, "malformed message while awaiting {expecting}");
                    self.connection
                        .send(&Message::error(format!("malformed message: {e}")))?;
                }
                Err(e) => return Err(e).wrap_err_with(|| format!("awaiting {expecting}")),
            }
        }
    }

    #[tracing::instrument(skip(self, engine), fields(cmd = %command.cmd))]
    fn run_command(&mut self, engine: &mut dyn Engine, command: &Command) -> eyre::Result<()> {
        let mut delegate = Delegate::new(&mut self.connection);
        let result = engine.handle(command, &mut delegate);
        let events = delegate.events();

        if delegate.is_broken() {
            let err = match result {
                Err(e) => e,
                Ok(_) => eyre::eyre!("engine ignored a failed event exchange"),
            };
            return Err(err.wrap_err(format!("running {}", command.cmd)));
        }

        let reply = match result {
            Ok(result) => {
                tracing::debug!(events, "command complete");
                Message::Complete { result }
            }
            Err(e) => {
                tracing::debug!(events, error = %format!("{e:#}"), "command failed");
                Message::error(format!("{e:#}"))
            }
        };
        self.connection.send(&reply)?;
        Ok(())
    }

    fn acknowledge_shutdown(&mut self) -> eyre::Result<()> {
        tracing::info!("shutdown requested");
        self.connection.send(&Message::Complete {
            result: Value::Null,
        })?;
        Ok(())
    }
}

enum Handshake {
    Bound(Box<dyn Engine>),
    Finished(Exit),
}

#[cfg(test)]
mod tests {
    use std::thread;

    use serde_json::json;
    use transport::{EventRequest, EventResponse, InMemoryTransport};

    use super::*;

    /// Answers every command by reading the `pc` register
    struct PcEngine;

    impl Engine for PcEngine {
        fn handle(&mut self, command: &Command, delegate: &mut Delegate<'_>) -> eyre::Result<Value> {
            match command.cmd {
                CommandKind::Eval => Ok(json!(delegate.read_register("pc")?)),
                _ => eyre::bail!("unsupported"),
            }
        }
    }

    fn factory() -> Arc<dyn EngineFactory> {
        Arc::new(|path: &Path| -> eyre::Result<Box<dyn Engine>> {
            if path == Path::new("/missing") {
                eyre::bail!("no such binary");
            }
            Ok(Box::new(PcEngine))
        })
    }

    fn start() -> (Connection, thread::JoinHandle<eyre::Result<Exit>>) {
        let (client, server) = InMemoryTransport::pair();
        let server = Connection::with_transport(server).unwrap();
        let handle = thread::spawn(move || ServerConnection::new(server, factory(), 1).run());
        (Connection::with_transport(client).unwrap(), handle)
    }

    fn init(conn: &mut Connection, path: &str) -> Message {
        conn.send(&Message::Init {
            binary_path: path.to_string(),
        })
        .unwrap();
        conn.receive().unwrap()
    }

    #[test]
    fn command_with_event() {
        let (mut conn, handle) = start();
        assert_eq!(init(&mut conn, "/bin/prog"), Message::InitAck);

        conn.send(&Message::command(CommandKind::Eval, ["$pc"]))
            .unwrap();
        assert_eq!(
            conn.receive().unwrap(),
            Message::Event {
                event: EventRequest::ReadRegister {
                    name: "pc".to_string()
                }
            }
        );
        conn.send(&Message::EventResponse {
            data: EventResponse::RegisterData { value: 7 },
        })
        .unwrap();
        assert_eq!(conn.receive().unwrap(), Message::Complete { result: json!(7) });

        drop(conn);
        assert_eq!(handle.join().unwrap().unwrap(), Exit::Disconnected);
    }

    #[test]
    fn delegate_error_fails_only_the_command() {
        let (mut conn, handle) = start();
        init(&mut conn, "/bin/prog");

        conn.send(&Message::command(CommandKind::Eval, ["$pc"]))
            .unwrap();
        conn.receive().unwrap();
        conn.send(&Message::EventResponse {
            data: EventResponse::error("No selected frame"),
        })
        .unwrap();
        assert_eq!(conn.receive().unwrap(), Message::error("No selected frame"));

        conn.send(&Message::command(CommandKind::Print, ["x"]))
            .unwrap();
        assert_eq!(conn.receive().unwrap(), Message::error("unsupported"));

        drop(conn);
        assert_eq!(handle.join().unwrap().unwrap(), Exit::Disconnected);
    }

    #[test]
    fn mismatched_response_is_fatal() {
        let (mut conn, handle) = start();
        init(&mut conn, "/bin/prog");

        conn.send(&Message::command(CommandKind::Eval, ["$pc"]))
            .unwrap();
        conn.receive().unwrap();
        conn.send(&Message::EventResponse {
            data: EventResponse::MemoryWritten,
        })
        .unwrap();

        let err = handle.join().unwrap().unwrap_err();
        assert!(format!("{err:#}").contains("does not answer"), "{err:#}");
        assert!(matches!(
            conn.receive(),
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[test]
    fn rejected_binary() {
        let (mut conn, handle) = start();
        assert_eq!(init(&mut conn, "/missing"), Message::error("no such binary"));
        assert_eq!(handle.join().unwrap().unwrap(), Exit::Rejected);
    }

    #[test]
    fn command_before_init_is_fatal() {
        let (mut conn, handle) = start();
        conn.send(&Message::command(CommandKind::Eval, ["x"]))
            .unwrap();
        assert!(matches!(conn.receive().unwrap(), Message::Error { .. }));
        assert!(handle.join().unwrap().is_err());
    }

    #[test]
    fn shutdown_without_init() {
        let (mut conn, handle) = start();
        conn.send(&Message::command(CommandKind::Shutdown, Vec::<String>::new()))
            .unwrap();
        assert_eq!(
            conn.receive().unwrap(),
            Message::Complete {
                result: Value::Null
            }
        );
        assert_eq!(handle.join().unwrap().unwrap(), Exit::Shutdown);
    }

    #[test]
    fn second_init_is_fatal() {
        let (mut conn, handle) = start();
        init(&mut conn, "/bin/prog");
        conn.send(&Message::Init {
            binary_path: "/bin/other".to_string(),
        })
        .unwrap();
        assert!(handle.join().unwrap().is_err());
    }
}
