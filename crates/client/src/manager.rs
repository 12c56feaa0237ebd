//! Owns the session for one debugger and starts the server when needed
use std::fmt;
use std::io;
use std::path::Path;

use retry::{delay::Fixed, retry};
use transport::io::is_reachable;
use transport::{Command, TcpTransport, TransportError};

use crate::backend::DebuggerSession;
use crate::config::BridgeConfig;
use crate::error::ManagerError;
use crate::launch;
use crate::session::{CommandOutcome, Session};

/// Starts a server process
pub trait Launcher {
    fn launch(&self, config: &BridgeConfig) -> io::Result<()>;
}

/// Runs the configured server program in the background
///
/// The child is waited on from a detached thread, so a server that stops is
/// reaped instead of lingering as a zombie of the debugger process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, config: &BridgeConfig) -> io::Result<()> {
        let child = launch::spawn_detached(&config.server_program, &config.host, config.port)?;
        launch::reap(child).map(drop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerStatus {
    Running { addr: String },
    NotRunning { addr: String },
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Running { addr } => write!(f, "Server is running at {addr}"),
            ServerStatus::NotRunning { addr } => write!(f, "Server is not running at {addr}"),
        }
    }
}

/// Lazily connected session, rebound whenever the target binary changes
pub struct SessionManager {
    config: BridgeConfig,
    launcher: Box<dyn Launcher>,
    session: Option<Session>,
}

impl SessionManager {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_launcher(config, ProcessLauncher)
    }

    pub fn with_launcher(config: BridgeConfig, launcher: impl Launcher + 'static) -> Self {
        Self {
            config,
            launcher: Box::new(launcher),
            session: None,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Probe the server without opening a session
    pub fn server_status(&self) -> ServerStatus {
        let addr = self.config.address();
        if is_reachable(&addr, self.config.probe_timeout) {
            ServerStatus::Running { addr }
        } else {
            ServerStatus::NotRunning { addr }
        }
    }

    /// Make sure a server accepts connections, starting one if necessary
    ///
    /// After launching, reachability is polled a bounded number of times.
    pub fn ensure_server(&self) -> Result<(), ManagerError> {
        let addr = self.config.address();
        if is_reachable(&addr, self.config.probe_timeout) {
            return Ok(());
        }

        tracing::info!(%addr, program = %self.config.server_program, "server not reachable, starting it");
        self.launcher
            .launch(&self.config)
            .map_err(ManagerError::Launch)?;

        let attempts = self.config.startup_attempts.max(1);
        let backoff = Fixed::from_millis(self.config.startup_backoff.as_millis() as u64)
            .take(attempts as usize - 1);
        let mut poll = 0;
        retry(backoff, || {
            poll += 1;
            if is_reachable(&addr, self.config.probe_timeout) {
                tracing::debug!(poll, "server is up");
                Ok(())
            } else {
                tracing::debug!(poll, "server not reachable yet");
                Err(())
            }
        })
        .map_err(|_| ManagerError::ServerUnavailable {
            addr: addr.clone(),
            attempts,
        })
    }

    /// The session for `binary_path`, connecting or rebinding as needed
    pub fn session(&mut self, binary_path: &Path) -> Result<&mut Session, ManagerError> {
        let session = match self.session.take() {
            Some(session) if session.is_usable() && session.binary_path() == binary_path => {
                session
            }
            previous => {
                if let Some(previous) = previous {
                    tracing::debug!(
                        binary = %previous.binary_path().display(),
                        "dropping previous session"
                    );
                }
                self.connect(binary_path)?
            }
        };
        Ok(self.session.insert(session))
    }

    fn connect(&self, binary_path: &Path) -> Result<Session, ManagerError> {
        self.ensure_server()?;

        let addr = self.config.address();
        let transport = TcpTransport::connect(&addr).map_err(|e| ManagerError::Connect {
            addr: addr.clone(),
            source: TransportError::from(e),
        })?;
        Ok(Session::open(transport, binary_path)?)
    }

    /// Run a command for the debugger's selected target
    ///
    /// A fatal session error discards the session so the next command
    /// reconnects.
    pub fn execute(
        &mut self,
        debugger: &mut dyn DebuggerSession,
        command: Command,
    ) -> Result<CommandOutcome, ManagerError> {
        let binary = debugger
            .selected_target()
            .ok_or(ManagerError::NoTarget)?
            .executable()
            .ok_or(ManagerError::NoExecutable)?;

        let session = self.session(&binary)?;
        match session.execute(command, debugger) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.session = None;
                Err(e.into())
            }
        }
    }

    /// Drop the session, closing its connection
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            tracing::debug!("session closed");
        }
    }
}
