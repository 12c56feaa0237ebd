use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use eyre::WrapErr;
use transport::{CommandKind, Connection, Message, TcpTransport};

use crate::connection::{Exit, ServerConnection};
use crate::engine::EngineFactory;

/// Accepts client connections and serves each on its own thread
pub struct Server {
    listener: TcpListener,
    factory: Arc<dyn EngineFactory>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(addr: impl ToSocketAddrs, factory: impl EngineFactory) -> eyre::Result<Self> {
        let listener = TcpListener::bind(addr).wrap_err("binding server socket")?;
        Ok(Self {
            listener,
            factory: Arc::new(factory),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> eyre::Result<SocketAddr> {
        self.listener
            .local_addr()
            .wrap_err("getting server address")
    }

    /// Accept connections until a client sends `shutdown`
    pub fn serve(self) -> eyre::Result<()> {
        let local_addr = self.local_addr()?;
        tracing::info!(addr = %local_addr, "listening");

        let mut next_session = 0u64;
        for stream in self.listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "accepting connection");
                    continue;
                }
            };

            next_session += 1;
            let session = next_session;
            let factory = Arc::clone(&self.factory);
            let shutdown = Arc::clone(&self.shutdown);
            thread::Builder::new()
                .name(format!("session-{session}"))
                .spawn(move || {
                    match serve_stream(stream, factory, session) {
                        Ok(Exit::Shutdown) => {
                            shutdown.store(true, Ordering::SeqCst);
                            wake(local_addr);
                        }
                        Ok(exit) => tracing::debug!(session, ?exit, "session ended"),
                        Err(e) => {
                            tracing::warn!(session, error = %format!("{e:#}"), "session failed")
                        }
                    }
                })
                .wrap_err("spawning session thread")?;
        }

        tracing::info!("server stopped");
        Ok(())
    }

    /// Serve on a background thread
    pub fn spawn(self) -> eyre::Result<ServerHandle> {
        let addr = self.local_addr()?;
        let thread = thread::Builder::new()
            .name("tether-server".to_string())
            .spawn(move || self.serve())
            .wrap_err("spawning server thread")?;
        Ok(ServerHandle { addr, thread })
    }
}

fn serve_stream(
    stream: TcpStream,
    factory: Arc<dyn EngineFactory>,
    session: u64,
) -> eyre::Result<Exit> {
    let peer = stream.peer_addr().ok();
    tracing::debug!(session, ?peer, "accepted connection");
    let transport = TcpTransport::new(stream)?;
    let connection = Connection::with_transport(transport)?;
    ServerConnection::new(connection, factory, session).run()
}

/// Unblock the accept loop so it can observe the shutdown flag
fn wake(addr: SocketAddr) {
    let addr = if addr.ip().is_unspecified() {
        SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port())
    } else {
        addr
    };
    if let Err(e) = TcpStream::connect(addr) {
        tracing::warn!(error = %e, "waking accept loop");
    }
}

/// A server running on a background thread
pub struct ServerHandle {
    addr: SocketAddr,
    thread: thread::JoinHandle<eyre::Result<()>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Ask the server to stop and wait for the accept loop to finish
    pub fn shutdown(self) -> eyre::Result<()> {
        request_shutdown(self.addr)?;
        self.thread
            .join()
            .map_err(|_| eyre::eyre!("server thread panicked"))?
    }
}

/// Send `shutdown` to the server at `addr` and wait for it to be acknowledged
pub fn request_shutdown(addr: impl ToSocketAddrs) -> eyre::Result<()> {
    let mut connection = Connection::connect(addr).wrap_err("connecting to server")?;
    connection.send(&Message::command(CommandKind::Shutdown, Vec::<String>::new()))?;
    match connection.receive()? {
        Message::Complete { .. } => Ok(()),
        Message::Error { error } => eyre::bail!("server refused shutdown: {error}"),
        other => eyre::bail!("unexpected {} in reply to shutdown", other.kind()),
    }
}
