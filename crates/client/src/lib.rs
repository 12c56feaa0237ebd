//! Client side of a tether session
//!
//! The client owns the live debugger. It sends commands to the analysis
//! server and, while a command runs, answers the server's events using the
//! debugger's selected target, process, thread and frame.
//!
//! ```no_run
//! use client::{BridgeConfig, SessionManager, surface};
//! # fn debugger() -> client::testing::FakeDebugger { client::testing::FakeDebugger::new() }
//!
//! let mut manager = SessionManager::new(BridgeConfig::from_env()?);
//! let mut debugger = debugger();
//! println!("{}", surface::run(&mut manager, &mut debugger, "print point"));
//! # Ok::<(), eyre::Report>(())
//! ```
pub mod backend;
pub mod call;
pub mod config;
pub mod dispatch;
mod error;
pub mod launch;
mod manager;
mod session;
pub mod surface;
pub mod testing;

pub use config::BridgeConfig;
pub use error::{DelegateError, ManagerError, SessionError};
pub use manager::{Launcher, ProcessLauncher, ServerStatus, SessionManager};
pub use session::{CommandOutcome, Session};
