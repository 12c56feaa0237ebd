use std::io::{IsTerminal, Write};
use std::net::TcpStream;
use std::path::Path;

use eyre::WrapErr;
use serde_json::{Value, json};
use server::{Delegate, Engine, ProbeFactory, Server, ServerHandle};
use tracing_subscriber::EnvFilter;
use transport::{
    Command, CommandKind, Connection, EventRequest, EventResponse, Message, MethodCallResult,
    TcpTransport, TransportError,
};

fn init_test_logger() {
    let in_ci = std::env::var("CI")
        .map(|val| val == "true")
        .unwrap_or(false);

    if std::io::stderr().is_terminal() || in_ci {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .json()
            .try_init();
    }
}

fn start() -> eyre::Result<ServerHandle> {
    init_test_logger();
    Server::bind("127.0.0.1:0", ProbeFactory)?.spawn()
}

/// Writes the command's byte arguments to a fixed address and reads them back
struct PatchEngine;

const PATCH_ADDRESS: u64 = 0x2000;

impl Engine for PatchEngine {
    fn handle(&mut self, command: &Command, delegate: &mut Delegate<'_>) -> eyre::Result<Value> {
        let data = command
            .args
            .iter()
            .map(|arg| arg.parse::<u8>())
            .collect::<Result<Vec<_>, _>>()?;
        delegate.write_memory(PATCH_ADDRESS, data.clone())?;
        let bytes = delegate.read_memory(PATCH_ADDRESS, data.len())?;
        Ok(json!({"written": data.len(), "bytes": bytes}))
    }
}

fn open_patch_engine(_binary_path: &Path) -> eyre::Result<Box<dyn Engine>> {
    Ok(Box::new(PatchEngine))
}

fn existing_binary() -> String {
    std::env::current_exe()
        .unwrap()
        .to_string_lossy()
        .into_owned()
}

fn bound_connection(server: &ServerHandle) -> eyre::Result<Connection> {
    let mut conn = Connection::connect(server.addr()).wrap_err("connecting to server")?;
    conn.send(&Message::Init {
        binary_path: existing_binary(),
    })?;
    assert_eq!(conn.receive()?, Message::InitAck);
    Ok(conn)
}

#[test]
fn test_eval_register_through_event() -> eyre::Result<()> {
    let server = start()?;
    let mut conn = bound_connection(&server)?;

    conn.send(&Message::command(CommandKind::Eval, ["$sp"]))?;
    assert_eq!(
        conn.receive()?,
        Message::Event {
            event: EventRequest::ReadRegister {
                name: "sp".to_string()
            }
        }
    );
    conn.send(&Message::EventResponse {
        data: EventResponse::RegisterData { value: 0x7ff0 },
    })?;
    assert_eq!(
        conn.receive()?,
        Message::Complete {
            result: json!({"register": "sp", "value": 0x7ff0})
        }
    );

    drop(conn);
    server.shutdown()
}

#[test]
fn test_aggregate_call_reads_back_buffer() -> eyre::Result<()> {
    let server = start()?;
    let mut conn = bound_connection(&server)?;

    conn.send(&Message::command(
        CommandKind::Print,
        ["call 0x1000 int:2 -> 4"],
    ))?;

    let Message::Event {
        event: EventRequest::ExecuteFunction {
            function_address,
            args,
            return_type_size,
        },
    } = conn.receive()?
    else {
        eyre::bail!("expected ExecuteFunction");
    };
    assert_eq!(function_address, 0x1000);
    assert_eq!(args.len(), 1);
    assert_eq!(return_type_size, Some(4));

    conn.send(&Message::EventResponse {
        data: EventResponse::FunctionResult {
            result: MethodCallResult::complex(0x9000, 4),
        },
    })?;
    assert_eq!(
        conn.receive()?,
        Message::Event {
            event: EventRequest::ReadMemory {
                address: 0x9000,
                size: 4
            }
        }
    );
    conn.send(&Message::EventResponse {
        data: EventResponse::MemoryData {
            data: vec![1, 2, 3, 4],
        },
    })?;
    assert_eq!(
        conn.receive()?,
        Message::Complete {
            result: json!({"bytes": [1, 2, 3, 4]})
        }
    );

    drop(conn);
    server.shutdown()
}

#[test]
fn test_unknown_binary_is_rejected() -> eyre::Result<()> {
    let server = start()?;
    let mut conn = Connection::connect(server.addr())?;
    conn.send(&Message::Init {
        binary_path: "/no/such/binary".to_string(),
    })?;

    let Message::Error { error } = conn.receive()? else {
        eyre::bail!("expected Error");
    };
    assert!(error.contains("/no/such/binary"), "{error}");

    drop(conn);
    server.shutdown()
}

#[test]
fn test_malformed_line_is_answered_and_skipped() -> eyre::Result<()> {
    let server = start()?;

    let stream = TcpStream::connect(server.addr())?;
    let mut raw = stream.try_clone()?;
    let mut conn = Connection::with_transport(TcpTransport::new(stream)?)?;

    raw.write_all(b"{not json\n")?;
    let Message::Error { error } = conn.receive()? else {
        eyre::bail!("expected Error");
    };
    assert!(error.starts_with("malformed message"), "{error}");

    conn.send(&Message::Init {
        binary_path: existing_binary(),
    })?;
    assert_eq!(conn.receive()?, Message::InitAck);

    conn.send(&Message::command(CommandKind::Functions, ["main"]))?;
    assert_eq!(conn.receive()?, Message::Complete { result: json!([]) });

    drop(conn);
    drop(raw);
    server.shutdown()
}

#[test]
fn test_wrong_response_kind_drops_connection() -> eyre::Result<()> {
    let server = start()?;
    let mut conn = bound_connection(&server)?;

    conn.send(&Message::command(CommandKind::Eval, ["frame"]))?;
    assert_eq!(
        conn.receive()?,
        Message::Event {
            event: EventRequest::GetFrameInfo
        }
    );
    conn.send(&Message::EventResponse {
        data: EventResponse::BaseAddress { address: 0 },
    })?;
    assert!(matches!(
        conn.receive(),
        Err(TransportError::ConnectionClosed)
    ));

    server.shutdown()
}

#[test]
fn test_sessions_are_independent() -> eyre::Result<()> {
    let server = start()?;
    let mut first = bound_connection(&server)?;
    let mut second = bound_connection(&server)?;

    second.send(&Message::command(CommandKind::Methods, ["point"]))?;
    assert!(matches!(second.receive()?, Message::Error { .. }));

    first.send(&Message::command(CommandKind::Functions, Vec::<String>::new()))?;
    assert_eq!(first.receive()?, Message::Complete { result: json!([]) });

    drop(first);
    drop(second);
    server.shutdown()
}

#[test]
fn test_engine_writes_memory_through_the_client() -> eyre::Result<()> {
    init_test_logger();
    let server = Server::bind("127.0.0.1:0", open_patch_engine)?.spawn()?;
    let mut conn = bound_connection(&server)?;

    conn.send(&Message::command(CommandKind::Eval, ["7", "8"]))?;
    assert_eq!(
        conn.receive()?,
        Message::Event {
            event: EventRequest::WriteMemory {
                address: PATCH_ADDRESS,
                data: vec![7, 8]
            }
        }
    );
    conn.send(&Message::EventResponse {
        data: EventResponse::MemoryWritten,
    })?;
    assert_eq!(
        conn.receive()?,
        Message::Event {
            event: EventRequest::ReadMemory {
                address: PATCH_ADDRESS,
                size: 2
            }
        }
    );
    conn.send(&Message::EventResponse {
        data: EventResponse::MemoryData { data: vec![7, 8] },
    })?;
    assert_eq!(
        conn.receive()?,
        Message::Complete {
            result: json!({"written": 2, "bytes": [7, 8]})
        }
    );

    // a failed write fails the command but keeps the session
    conn.send(&Message::command(CommandKind::Eval, ["1"]))?;
    assert!(matches!(
        conn.receive()?,
        Message::Event {
            event: EventRequest::WriteMemory { .. }
        }
    ));
    conn.send(&Message::EventResponse {
        data: EventResponse::error("Memory write failed: memory at 0x2000 is not writable"),
    })?;
    let Message::Error { error } = conn.receive()? else {
        eyre::bail!("expected Error");
    };
    assert!(error.contains("not writable"), "{error}");

    conn.send(&Message::command(CommandKind::Eval, Vec::<String>::new()))?;
    assert!(matches!(
        conn.receive()?,
        Message::Event {
            event: EventRequest::WriteMemory { .. }
        }
    ));

    drop(conn);
    server.shutdown()
}
