//! The debugger session seen from the dispatcher
//!
//! A live debugger exposes a selected target, the target's process, the
//! process's selected thread and the thread's selected frame. Each level may
//! be missing, and each accessor reports that as `None` so the dispatcher can
//! turn it into a stable error message.
use std::path::PathBuf;

/// Failure reported by the debugger backend itself
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Value produced by the native expression evaluator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Formatted value, if the result has one
    pub value: Option<String>,
    /// Summary string for values without a plain formatted value
    pub summary: Option<String>,
    /// The result reinterpreted as an unsigned integer (pointers included)
    pub unsigned: Option<u64>,
    /// Address where the result object lives in the inferior
    pub load_address: Option<u64>,
    pub type_name: Option<String>,
}

impl Evaluation {
    pub fn unsigned(value: u64) -> Self {
        Self {
            value: Some(value.to_string()),
            unsigned: Some(value),
            ..Default::default()
        }
    }

    /// Text shown for this value: the formatted value, else the summary
    pub fn display_text(&self) -> String {
        self.value
            .clone()
            .or_else(|| self.summary.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub name: String,
    pub value: u64,
}

impl Register {
    pub fn new(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A named group of registers, e.g. general purpose or floating point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSet {
    pub name: String,
    pub registers: Vec<Register>,
}

/// Entry point to the debugger session
pub trait DebuggerSession {
    fn selected_target(&mut self) -> Option<&mut dyn Target>;
}

/// A loaded binary image
pub trait Target {
    /// Path of the executable this target was created from
    fn executable(&self) -> Option<PathBuf>;

    fn process(&mut self) -> Option<&mut dyn Process>;

    /// Load address of the main module, `None` when no module is loaded
    fn base_address(&self) -> Option<u64>;

    /// Evaluate an expression in the context of the inferior
    ///
    /// Function calls in `expr` run inside the traced process.
    fn evaluate(&mut self, expr: &str) -> Result<Evaluation, BackendError>;
}

/// The running inferior
pub trait Process {
    fn read_memory(&mut self, address: u64, size: usize) -> Result<Vec<u8>, BackendError>;

    /// Write `data` at `address`, returning how many bytes were written
    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<usize, BackendError>;

    fn selected_thread(&mut self) -> Option<&mut dyn Thread>;
}

pub trait Thread {
    fn id(&self) -> u64;

    fn name(&self) -> Option<String>;

    fn selected_frame(&mut self) -> Option<&mut dyn Frame>;
}

pub trait Frame {
    fn pc(&self) -> u64;

    fn sp(&self) -> u64;

    fn fp(&self) -> u64;

    fn register_sets(&self) -> Vec<RegisterSet>;

    /// Type name of a variable visible from this frame
    fn variable_type(&self, name: &str) -> Option<String>;
}
