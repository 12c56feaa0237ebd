//! Synthesis of call expressions that run inside the inferior
//!
//! The callee is invoked through a cast to a function pointer type built from
//! the argument list. Results that fit in a register are read back as an
//! `unsigned long`. Larger results are declared as a struct holding a byte
//! array of the right size: the evaluator already knows how to return a
//! struct by value, so binding the result to a temporary and taking its
//! address hands back the bytes without knowing the calling convention.
use std::fmt;

use transport::{ArgumentType, MethodArgument};

use crate::error::DelegateError;

const RESULT_BINDING: &str = "__tether_result";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    /// Scalar returned in the integer return register
    Register,
    /// Aggregate of the given size, returned through a temporary
    Buffer(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Method,
    Function,
}

impl CallKind {
    /// Label used in failure messages, e.g. "Simple method"
    pub fn label(&self, shape: ReturnShape) -> &'static str {
        match (shape, self) {
            (ReturnShape::Register, CallKind::Method) => "Simple method",
            (ReturnShape::Register, CallKind::Function) => "Simple function",
            (ReturnShape::Buffer(_), CallKind::Method) => "Complex method",
            (ReturnShape::Buffer(_), CallKind::Function) => "Complex function",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Param {
    c_type: &'static str,
    literal: String,
}

/// A call to a native function pointer, rendered with [`fmt::Display`]
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    address: u64,
    params: Vec<Param>,
    shape: ReturnShape,
}

impl CallExpr {
    pub fn function(
        address: u64,
        args: &[MethodArgument],
        return_type_size: Option<usize>,
    ) -> Result<Self, DelegateError> {
        Self::build(address, Vec::new(), args, return_type_size)
    }

    /// A method call: the receiver address becomes an implicit first pointer argument
    pub fn method(
        address: u64,
        receiver: u64,
        args: &[MethodArgument],
        return_type_size: Option<usize>,
    ) -> Result<Self, DelegateError> {
        let receiver = Param {
            c_type: "void*",
            literal: format!("(void*){receiver:#x}"),
        };
        Self::build(address, vec![receiver], args, return_type_size)
    }

    fn build(
        address: u64,
        mut params: Vec<Param>,
        args: &[MethodArgument],
        return_type_size: Option<usize>,
    ) -> Result<Self, DelegateError> {
        let shape = match return_type_size {
            None => ReturnShape::Register,
            Some(0) => return Err(DelegateError::ZeroSizedReturn),
            Some(size) => ReturnShape::Buffer(size),
        };

        for arg in args {
            params.push(marshal(arg)?);
        }

        Ok(Self {
            address,
            params,
            shape,
        })
    }

    pub fn shape(&self) -> ReturnShape {
        self.shape
    }

    fn write_call(&self, f: &mut fmt::Formatter<'_>, return_type: &str) -> fmt::Result {
        let param_types = if self.params.is_empty() {
            "void".to_string()
        } else {
            self.params
                .iter()
                .map(|p| p.c_type)
                .collect::<Vec<_>>()
                .join(", ")
        };
        let literals = self
            .params
            .iter()
            .map(|p| p.literal.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        write!(
            f,
            "(({return_type} (*)({param_types})){:#x})({literals})",
            self.address
        )
    }
}

impl fmt::Display for CallExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            ReturnShape::Register => self.write_call(f, "unsigned long"),
            ReturnShape::Buffer(size) => {
                write!(
                    f,
                    "struct ReturnBuffer_{size} {{ unsigned char bytes[{size}]; }}; auto {RESULT_BINDING} = "
                )?;
                self.write_call(f, &format!("struct ReturnBuffer_{size}"))?;
                write!(f, "; &{RESULT_BINDING}")
            }
        }
    }
}

fn marshal(arg: &MethodArgument) -> Result<Param, DelegateError> {
    let param = match arg.arg_type {
        ArgumentType::Pointer => {
            let address = parse_unsigned(&arg.value).ok_or_else(|| invalid("pointer", arg))?;
            Param {
                c_type: "void*",
                literal: format!("(void*){address:#x}"),
            }
        }
        ArgumentType::Integer => Param {
            c_type: "unsigned long",
            literal: integer_literal(arg).ok_or_else(|| invalid("integer", arg))?,
        },
        ArgumentType::Bool => {
            let truthy = matches!(arg.value.trim().to_ascii_lowercase().as_str(), "true" | "1");
            Param {
                c_type: "int",
                literal: if truthy { "1" } else { "0" }.to_string(),
            }
        }
        ArgumentType::Float => {
            let value: f64 = arg
                .value
                .trim()
                .parse()
                .ok()
                .filter(|v: &f64| v.is_finite())
                .ok_or_else(|| invalid("float", arg))?;
            Param {
                c_type: "double",
                literal: format!("{value:?}"),
            }
        }
        ArgumentType::Other => Param {
            c_type: "unsigned long",
            literal: integer_literal(arg).ok_or_else(|| invalid("untyped", arg))?,
        },
    };
    Ok(param)
}

fn invalid(kind: &'static str, arg: &MethodArgument) -> DelegateError {
    DelegateError::InvalidArgument {
        kind,
        value: arg.value.clone(),
    }
}

/// Decimal or `0x` prefixed hexadecimal
fn parse_unsigned(text: &str) -> Option<u64> {
    let text = text.trim();
    match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Integer arguments are passed as `unsigned long`; negative values wrap
fn integer_literal(arg: &MethodArgument) -> Option<String> {
    let text = arg.value.trim();
    let value = parse_unsigned(text).or_else(|| text.parse::<i64>().ok().map(|v| v as u64))?;
    Some(format!("{value}ul"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arg(arg_type: ArgumentType, value: &str) -> MethodArgument {
        MethodArgument::new(arg_type, value)
    }

    #[test]
    fn simple_function_without_arguments() {
        let call = CallExpr::function(0x1000, &[], None).unwrap();
        assert_eq!(call.to_string(), "((unsigned long (*)(void))0x1000)()");
    }

    #[test]
    fn simple_function_with_integers() {
        let call = CallExpr::function(
            0x1000,
            &[
                arg(ArgumentType::Integer, "2"),
                arg(ArgumentType::Integer, "0x10"),
            ],
            None,
        )
        .unwrap();
        assert_eq!(
            call.to_string(),
            "((unsigned long (*)(unsigned long, unsigned long))0x1000)(2ul, 16ul)"
        );
    }

    #[test]
    fn method_prepends_receiver() {
        let call = CallExpr::method(
            0x2000,
            0x7ffe_0010,
            &[arg(ArgumentType::Bool, "True"), arg(ArgumentType::Float, "2")],
            None,
        )
        .unwrap();
        assert_eq!(
            call.to_string(),
            "((unsigned long (*)(void*, int, double))0x2000)((void*)0x7ffe0010, 1, 2.0)"
        );
    }

    #[test]
    fn aggregate_return_goes_through_buffer() {
        let call =
            CallExpr::function(0x3000, &[arg(ArgumentType::Pointer, "4096")], Some(24)).unwrap();
        assert_eq!(call.shape(), ReturnShape::Buffer(24));
        assert_eq!(
            call.to_string(),
            "struct ReturnBuffer_24 { unsigned char bytes[24]; }; \
             auto __tether_result = ((struct ReturnBuffer_24 (*)(void*))0x3000)((void*)0x1000); \
             &__tether_result"
        );
    }

    #[test]
    fn negative_integers_wrap() {
        let call = CallExpr::function(0x10, &[arg(ArgumentType::Integer, "-1")], None).unwrap();
        assert!(
            call.to_string().ends_with("(18446744073709551615ul)"),
            "{call}"
        );
    }

    #[test]
    fn unknown_argument_type_is_unsigned() {
        let call = CallExpr::function(0x10, &[arg(ArgumentType::Other, "7")], None).unwrap();
        assert_eq!(call.to_string(), "((unsigned long (*)(unsigned long))0x10)(7ul)");
    }

    #[test]
    fn rejects_text_that_is_not_a_literal() {
        let err = CallExpr::function(0x10, &[arg(ArgumentType::Integer, "1); abort(")], None)
            .unwrap_err();
        assert!(matches!(
            err,
            DelegateError::InvalidArgument {
                kind: "integer",
                ..
            }
        ));

        let err = CallExpr::function(0x10, &[arg(ArgumentType::Float, "nan")], None).unwrap_err();
        assert!(matches!(err, DelegateError::InvalidArgument { kind: "float", .. }));
    }

    #[test]
    fn rejects_zero_sized_return() {
        assert_eq!(
            CallExpr::function(0x10, &[], Some(0)).unwrap_err(),
            DelegateError::ZeroSizedReturn
        );
    }
}
