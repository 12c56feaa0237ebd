use std::path::Path;

use serde_json::Value;
use transport::Command;

use crate::delegate::Delegate;

/// The analysis engine behind a session
///
/// An engine is bound to one binary for its lifetime. While handling a
/// command it may ask the client for anything it cannot answer itself through
/// the [`Delegate`]; whatever it returns becomes the command's `Complete`
/// result, and an error becomes the command's `Error`.
pub trait Engine: Send {
    fn handle(&mut self, command: &Command, delegate: &mut Delegate<'_>) -> eyre::Result<Value>;
}

/// Creates an engine for each `Init`
///
/// An error rejects the binary; the message is sent back to the client.
pub trait EngineFactory: Send + Sync + 'static {
    fn open(&self, binary_path: &Path) -> eyre::Result<Box<dyn Engine>>;
}

impl<F> EngineFactory for F
where
    F: Fn(&Path) -> eyre::Result<Box<dyn Engine>> + Send + Sync + 'static,
{
    fn open(&self, binary_path: &Path) -> eyre::Result<Box<dyn Engine>> {
        self(binary_path)
    }
}
