//! User facing subcommands and how their results are shown
use std::fmt::Write as _;

use serde_json::Value;
use transport::results::{FunctionInfo, MethodInfo, MethodList};
use transport::{Command, CommandKind};

use crate::backend::DebuggerSession;
use crate::manager::SessionManager;
use crate::session::CommandOutcome;

pub const USAGE: &str = "\
Usage: tether <subcommand> [args...]
Available commands:
  eval|e <expression>       Evaluate an expression
  print|p <expression>      Pretty print an expression
  methods|m <expression>    List the methods of a type or expression
  functions|f [pattern]     List all functions or search by pattern
  status|s                  Show whether the server is running";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("missing subcommand")]
    Empty,

    #[error("unknown subcommand {0:?}")]
    Unknown(String),

    #[error("{0} requires an expression")]
    MissingExpression(CommandKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subcommand {
    Eval(String),
    Print(String),
    Methods(String),
    Functions(Vec<String>),
    Status,
}

impl Subcommand {
    /// Parse a command line such as `p foo.bar`
    pub fn parse(line: &str) -> Result<Self, SurfaceError> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        let expression = |kind: CommandKind| {
            if rest.is_empty() {
                Err(SurfaceError::MissingExpression(kind))
            } else {
                Ok(rest.to_string())
            }
        };

        match name {
            "" => Err(SurfaceError::Empty),
            "eval" | "e" => expression(CommandKind::Eval).map(Subcommand::Eval),
            "print" | "p" => expression(CommandKind::Print).map(Subcommand::Print),
            "methods" | "m" => expression(CommandKind::Methods).map(Subcommand::Methods),
            "functions" | "f" => Ok(Subcommand::Functions(
                rest.split_whitespace().map(str::to_string).collect(),
            )),
            "status" | "s" => Ok(Subcommand::Status),
            other => Err(SurfaceError::Unknown(other.to_string())),
        }
    }

    /// The protocol command, `None` for subcommands handled locally
    pub fn to_command(&self) -> Option<Command> {
        let command = match self {
            Subcommand::Eval(expr) => Command::new(CommandKind::Eval, [expr.as_str()]),
            Subcommand::Print(expr) => Command::new(CommandKind::Print, [expr.as_str()]),
            Subcommand::Methods(expr) => Command::new(CommandKind::Methods, [expr.as_str()]),
            Subcommand::Functions(patterns) => {
                Command::new(CommandKind::Functions, patterns.iter().cloned())
            }
            Subcommand::Status => return None,
        };
        Some(command)
    }
}

/// Run one command line and return the text to show
///
/// `status` only probes the server; it never opens a session.
pub fn run(manager: &mut SessionManager, debugger: &mut dyn DebuggerSession, line: &str) -> String {
    let subcommand = match Subcommand::parse(line) {
        Ok(subcommand) => subcommand,
        Err(SurfaceError::Empty) => return USAGE.to_string(),
        Err(e) => return format!("Error: {e}\n{USAGE}"),
    };

    let Some(command) = subcommand.to_command() else {
        return manager.server_status().to_string();
    };

    let kind = command.cmd;
    match manager.execute(debugger, command) {
        Ok(outcome) => render(kind, &outcome),
        Err(e) => {
            tracing::warn!(error = %e, "command failed");
            format!("Command failed: {e}")
        }
    }
}

/// Format the outcome of a command for display
pub fn render(kind: CommandKind, outcome: &CommandOutcome) -> String {
    let result = match outcome {
        CommandOutcome::Complete(result) => result,
        CommandOutcome::Failed(error) => return format!("Error: {error}"),
    };

    let special = match kind {
        CommandKind::Methods => serde_json::from_value::<MethodList>(result.clone())
            .ok()
            .map(|list| render_methods(&list)),
        CommandKind::Functions => serde_json::from_value::<Vec<FunctionInfo>>(result.clone())
            .ok()
            .map(|functions| render_functions(&functions)),
        _ => None,
    };

    special.unwrap_or_else(|| render_value(result))
}

fn render_methods(list: &MethodList) -> String {
    let (synthetic, regular): (Vec<&MethodInfo>, Vec<&MethodInfo>) =
        list.methods.iter().partition(|m| m.is_synthetic);

    let mut out = format!("Methods for {}:", list.type_name);
    if regular.is_empty() {
        out.push_str("\n  (no methods found)");
    }
    for method in regular {
        let _ = write!(out, "\n  - {}{}", method.signature, callable_suffix(method.callable));
    }

    if !synthetic.is_empty() {
        out.push_str("\n\nSynthetic methods (debug helpers):");
        for method in synthetic {
            let _ = write!(out, "\n  - {}", method.signature);
        }
    }
    out
}

fn render_functions(functions: &[FunctionInfo]) -> String {
    if functions.is_empty() {
        return "No functions found".to_string();
    }

    let mut out = format!("Found {} function(s):", functions.len());
    for function in functions {
        let _ = write!(
            out,
            "\n  {}: {}{}",
            function.qualified_name(),
            function.signature,
            callable_suffix(function.callable)
        );
    }
    out
}

fn callable_suffix(callable: bool) -> &'static str {
    if callable { " (callable)" } else { " (not callable)" }
}

/// Objects as `key: value` lines, anything else as the bare value
fn render_value(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| format!("{key}: {}", scalar(value)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => scalar(other),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
