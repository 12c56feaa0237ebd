//! A minimal engine that answers commands purely through events
//!
//! It loads no debug information; everything it reports comes from the
//! client's debugger. Useful for checking that a client can service every
//! kind of event, and as the default engine of `tether serve`.
//!
//! Expressions understood by `eval` and `print`:
//!
//! | Expression | Result |
//! |---|---|
//! | `$<register>` | register value |
//! | `frame` | pc, sp and fp of the selected frame |
//! | `thread` | id and name of the selected thread |
//! | `base` | load address of the main module |
//! | `*<address>[:<size>]` | `size` bytes of memory, 8 by default |
//! | `typeof <variable>` | type name of a variable in the selected frame |
//! | `malloc <size>` | address of a fresh allocation in the inferior |
//! | `call <function>[@<receiver>] [<type>:<value> ...] [-> <size>]` | result of a call in the inferior |
//!
//! Anything else is handed to the client's native evaluator.
use std::path::{Path, PathBuf};

use eyre::WrapErr;
use serde_json::{Value, json};
use transport::{ArgumentType, Command, CommandKind, MethodArgument};

use crate::delegate::{CallReturn, Delegate};
use crate::engine::{Engine, EngineFactory};

const DEFAULT_READ_SIZE: usize = 8;

#[derive(Debug, Default, Clone, Copy)]
pub struct ProbeFactory;

impl EngineFactory for ProbeFactory {
    fn open(&self, binary_path: &Path) -> eyre::Result<Box<dyn Engine>> {
        if !binary_path.is_file() {
            eyre::bail!("binary not found: {}", binary_path.display());
        }
        Ok(Box::new(ProbeEngine {
            binary: binary_path.to_path_buf(),
        }))
    }
}

pub struct ProbeEngine {
    binary: PathBuf,
}

impl Engine for ProbeEngine {
    fn handle(&mut self, command: &Command, delegate: &mut Delegate<'_>) -> eyre::Result<Value> {
        match command.cmd {
            CommandKind::Eval | CommandKind::Print => {
                let expr = command
                    .expression()
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .ok_or_else(|| eyre::eyre!("{} requires an expression", command.cmd))?;
                self.evaluate(expr, delegate)
            }
            CommandKind::Functions => Ok(json!([])),
            CommandKind::Methods => {
                eyre::bail!("methods requires type information, which this server does not load")
            }
            CommandKind::Shutdown => eyre::bail!("shutdown is not a session command"),
        }
    }
}

impl ProbeEngine {
    fn evaluate(&self, expr: &str, delegate: &mut Delegate<'_>) -> eyre::Result<Value> {
        if let Some(name) = expr.strip_prefix('$') {
            let value = delegate.read_register(name)?;
            return Ok(json!({ "register": name, "value": value }));
        }

        if let Some(spec) = expr.strip_prefix('*') {
            let (address, size) = parse_memory_spec(spec)?;
            let bytes = delegate.read_memory(address, size)?;
            return Ok(json!({ "address": address, "bytes": bytes }));
        }

        match expr {
            "frame" => {
                let frame = delegate.frame_info()?;
                return Ok(json!({ "pc": frame.pc, "sp": frame.sp, "fp": frame.fp }));
            }
            "thread" => {
                let thread = delegate.thread_info()?;
                return Ok(json!({ "tid": thread.tid, "name": thread.name }));
            }
            "base" => {
                let address = delegate.base_address()?;
                return Ok(json!({
                    "binary": self.binary.display().to_string(),
                    "base_address": address,
                }));
            }
            _ => {}
        }

        if let Some(name) = expr.strip_prefix("typeof ") {
            let name = name.trim();
            let type_name = delegate.variable_type(name)?;
            return Ok(json!({ "variable": name, "type": type_name }));
        }

        if let Some(size) = expr.strip_prefix("malloc ") {
            let size = parse_number(size).wrap_err("parsing allocation size")? as usize;
            let address = delegate.allocate(size)?;
            return Ok(json!({ "address": address, "size": size }));
        }

        if let Some(call) = expr.strip_prefix("call ") {
            return call_in_inferior(call, delegate);
        }

        let value = delegate.evaluate(expr)?;
        Ok(json!({ "expression": expr, "value": value }))
    }
}

fn call_in_inferior(spec: &str, delegate: &mut Delegate<'_>) -> eyre::Result<Value> {
    let (spec, return_type_size) = match spec.split_once("->") {
        Some((call, size)) => {
            let size = parse_number(size).wrap_err("parsing return size")? as usize;
            (call, Some(size))
        }
        None => (spec, None),
    };

    let mut tokens = spec.split_whitespace();
    let callee = tokens
        .next()
        .ok_or_else(|| eyre::eyre!("call requires a function address"))?;
    let args = tokens.map(parse_argument).collect::<eyre::Result<Vec<_>>>()?;

    let returned = match callee.split_once('@') {
        Some((method, receiver)) => delegate.call_method(
            parse_number(method)?,
            parse_number(receiver)?,
            args,
            return_type_size,
        )?,
        None => delegate.call_function(parse_number(callee)?, args, return_type_size)?,
    };

    Ok(match returned {
        CallReturn::Register(value) => json!({ "value": value }),
        CallReturn::Bytes(bytes) => json!({ "bytes": bytes }),
    })
}

/// `<type>:<value>`, e.g. `int:3` or `ptr:0x1000`
fn parse_argument(token: &str) -> eyre::Result<MethodArgument> {
    let (kind, value) = token
        .split_once(':')
        .ok_or_else(|| eyre::eyre!("argument {token:?} must look like <type>:<value>"))?;
    let arg_type = match kind {
        "ptr" => ArgumentType::Pointer,
        "int" => ArgumentType::Integer,
        "bool" => ArgumentType::Bool,
        "float" => ArgumentType::Float,
        other => eyre::bail!("unknown argument type {other:?}"),
    };
    Ok(MethodArgument::new(arg_type, value))
}

/// `<address>[:<size>]`
fn parse_memory_spec(spec: &str) -> eyre::Result<(u64, usize)> {
    match spec.split_once(':') {
        Some((address, size)) => Ok((
            parse_number(address)?,
            parse_number(size).wrap_err("parsing read size")? as usize,
        )),
        None => Ok((parse_number(spec)?, DEFAULT_READ_SIZE)),
    }
}

fn parse_number(text: &str) -> eyre::Result<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.wrap_err_with(|| format!("invalid number {text:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_specs() {
        assert_eq!(parse_memory_spec("0x1000").unwrap(), (0x1000, 8));
        assert_eq!(parse_memory_spec("4096:16").unwrap(), (4096, 16));
        assert!(parse_memory_spec("main").is_err());
    }

    #[test]
    fn arguments() {
        assert_eq!(
            parse_argument("ptr:0x10").unwrap(),
            MethodArgument::new(ArgumentType::Pointer, "0x10")
        );
        assert_eq!(
            parse_argument("float:1.5").unwrap(),
            MethodArgument::new(ArgumentType::Float, "1.5")
        );
        assert!(parse_argument("3").is_err());
        assert!(parse_argument("str:abc").is_err());
    }

    #[test]
    fn rejects_missing_binary() {
        assert!(ProbeFactory.open(Path::new("/does/not/exist")).is_err());
        let exe = std::env::current_exe().unwrap();
        assert!(ProbeFactory.open(&exe).is_ok());
    }
}
