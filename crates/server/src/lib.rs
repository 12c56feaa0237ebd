//! Server side of a tether session
//!
//! A [`Server`] accepts connections and hands each to a [`ServerConnection`],
//! which binds it to one binary through an [`EngineFactory`] and then runs
//! commands against the resulting [`Engine`]. Engines reach into the client's
//! debugger through a [`Delegate`].
mod connection;
mod delegate;
mod engine;
mod listener;
pub mod probe;

pub use connection::{Exit, ServerConnection};
pub use delegate::{CallReturn, Delegate, FrameInfo, ThreadInfo};
pub use engine::{Engine, EngineFactory};
pub use listener::{Server, ServerHandle, request_shutdown};
pub use probe::ProbeFactory;
