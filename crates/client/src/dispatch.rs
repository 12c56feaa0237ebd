//! Answers server events using the live debugger session
use std::panic::{self, AssertUnwindSafe};

use transport::{EventRequest, EventResponse, MethodCallResult};

use crate::backend::{DebuggerSession, Frame, Process, Register, Target};
use crate::call::{CallExpr, CallKind, ReturnShape};
use crate::error::DelegateError;

/// Answer a single event
///
/// Never fails: delegate errors and panics inside the backend are turned into
/// an [`EventResponse::Error`] so the server can decide how to proceed.
#[tracing::instrument(skip(debugger), fields(event = event.name()), level = "debug")]
pub fn dispatch(debugger: &mut dyn DebuggerSession, event: &EventRequest) -> EventResponse {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handle(debugger, event)))
        .unwrap_or_else(|payload| Err(DelegateError::Panicked(panic_message(payload))));

    match outcome {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(error = %e, "event failed");
            EventResponse::error(e.to_string())
        }
    }
}

fn handle(
    debugger: &mut dyn DebuggerSession,
    event: &EventRequest,
) -> Result<EventResponse, DelegateError> {
    let target = debugger.selected_target().ok_or(DelegateError::NoTarget)?;
    if target.process().is_none() {
        return Err(DelegateError::NoProcess);
    }

    match event {
        EventRequest::ReadMemory { address, size } => {
            let data = process(target)?
                .read_memory(*address, *size)
                .map_err(DelegateError::MemoryRead)?;
            Ok(EventResponse::MemoryData { data })
        }
        EventRequest::WriteMemory { address, data } => {
            let written = process(target)?
                .write_memory(*address, data)
                .map_err(DelegateError::MemoryWrite)?;
            if written != data.len() {
                return Err(DelegateError::PartialWrite {
                    written,
                    expected: data.len(),
                });
            }
            Ok(EventResponse::MemoryWritten)
        }
        EventRequest::ReadRegister { name } => {
            let frame = selected_frame(target)?;
            all_registers(frame)
                .into_iter()
                .find(|r| r.name == *name)
                .map(|r| EventResponse::RegisterData { value: r.value })
                .ok_or_else(|| DelegateError::RegisterNotFound(name.clone()))
        }
        EventRequest::ReadRegisterByIndex { index } => {
            let registers = all_registers(selected_frame(target)?);
            registers
                .get(*index)
                .map(|r| EventResponse::RegisterData { value: r.value })
                .ok_or(DelegateError::RegisterIndexOutOfRange {
                    index: *index,
                    count: registers.len(),
                })
        }
        EventRequest::GetFrameInfo => {
            let frame = selected_frame(target)?;
            Ok(EventResponse::FrameInfo {
                pc: frame.pc(),
                sp: frame.sp(),
                fp: frame.fp(),
            })
        }
        EventRequest::GetThreadInfo => {
            let thread = process(target)?
                .selected_thread()
                .ok_or(DelegateError::NoThread)?;
            Ok(EventResponse::ThreadInfo {
                tid: thread.id(),
                name: thread.name().filter(|n| !n.is_empty()),
            })
        }
        EventRequest::GetBaseAddress => target
            .base_address()
            .map(|address| EventResponse::BaseAddress { address })
            .ok_or(DelegateError::NoModules),
        EventRequest::EvaluateLLDBExpression { expr } => {
            let evaluation = target.evaluate(expr).map_err(DelegateError::Evaluation)?;
            Ok(EventResponse::ExpressionResult {
                value: evaluation.display_text(),
            })
        }
        EventRequest::GetVariableType { name } => {
            // absent thread, frame or variable all read as "unknown type"
            let type_name = selected_frame(target)
                .ok()
                .and_then(|frame| frame.variable_type(name));
            Ok(EventResponse::VariableTypeResult { type_name })
        }
        EventRequest::AllocateMemory { size } => {
            let evaluation = target
                .evaluate(&format!("(void*)malloc({size})"))
                .map_err(|e| DelegateError::Allocation(e.0))?;
            match evaluation.unsigned {
                Some(address) if address != 0 => Ok(EventResponse::MemoryAllocated { address }),
                _ => Err(DelegateError::Allocation("malloc returned NULL".to_string())),
            }
        }
        EventRequest::ExecuteMethod {
            method_address,
            base_address,
            args,
            return_type_size,
        } => {
            let call = CallExpr::method(*method_address, *base_address, args, *return_type_size)?;
            let result = execute_call(target, &call, CallKind::Method)?;
            Ok(EventResponse::MethodResult { result })
        }
        EventRequest::ExecuteFunction {
            function_address,
            args,
            return_type_size,
        } => {
            let call = CallExpr::function(*function_address, args, *return_type_size)?;
            let result = execute_call(target, &call, CallKind::Function)?;
            Ok(EventResponse::FunctionResult { result })
        }
        EventRequest::Unknown => Err(DelegateError::UnknownEvent),
    }
}

fn process(target: &mut dyn Target) -> Result<&mut dyn Process, DelegateError> {
    target.process().ok_or(DelegateError::NoProcess)
}

fn selected_frame(target: &mut dyn Target) -> Result<&mut dyn Frame, DelegateError> {
    let process = process(target)?;
    let thread = process.selected_thread().ok_or(DelegateError::NoThread)?;
    thread.selected_frame().ok_or(DelegateError::NoFrame)
}

/// Registers of every set, in set order
fn all_registers(frame: &dyn Frame) -> Vec<Register> {
    frame
        .register_sets()
        .into_iter()
        .flat_map(|set| set.registers)
        .collect()
}

fn execute_call(
    target: &mut dyn Target,
    call: &CallExpr,
    kind: CallKind,
) -> Result<MethodCallResult, DelegateError> {
    let shape = call.shape();
    let failed = |message: String| DelegateError::CallFailed {
        kind: kind.label(shape),
        message,
    };

    let expr = call.to_string();
    tracing::debug!(%expr, "evaluating synthesized call");
    let evaluation = target.evaluate(&expr).map_err(|e| failed(e.0))?;

    match shape {
        ReturnShape::Register => evaluation
            .unsigned
            .map(MethodCallResult::simple)
            .ok_or_else(|| failed("result is not an integer".to_string())),
        ReturnShape::Buffer(size) => {
            let address = evaluation
                .unsigned
                .filter(|address| *address != 0)
                .or(evaluation.load_address)
                .ok_or(DelegateError::NoReturnAddress)?;
            tracing::trace!(address = %format!("{address:#x}"), size, "aggregate return");
            Ok(MethodCallResult::complex(address, size))
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDebugger;

    #[test]
    fn missing_target_fails_every_event() {
        let mut debugger = FakeDebugger::new().without_target();
        let response = dispatch(&mut debugger, &EventRequest::GetBaseAddress);
        assert_eq!(response, EventResponse::error("No target selected"));
    }

    #[test]
    fn missing_process_fails_every_event() {
        let mut debugger = FakeDebugger::new().without_process();
        let response = dispatch(
            &mut debugger,
            &EventRequest::EvaluateLLDBExpression {
                expr: "1".to_string(),
            },
        );
        assert_eq!(response, EventResponse::error("No process"));
    }

    #[test]
    fn reads_registers_by_name_and_index() {
        let mut debugger = FakeDebugger::new();
        let by_name = dispatch(
            &mut debugger,
            &EventRequest::ReadRegister {
                name: "rip".to_string(),
            },
        );
        let by_index = dispatch(&mut debugger, &EventRequest::ReadRegisterByIndex { index: 0 });
        assert_eq!(by_name, by_index);
        assert!(matches!(by_name, EventResponse::RegisterData { .. }));
    }

    #[test]
    fn register_index_counts_across_sets() {
        let mut debugger = FakeDebugger::new();
        let count = debugger.register_count();
        let response = dispatch(
            &mut debugger,
            &EventRequest::ReadRegisterByIndex { index: count },
        );
        assert_eq!(
            response,
            EventResponse::error(format!(
                "Register index {count} not found (only have {count} registers)"
            ))
        );
    }

    #[test]
    fn unknown_register() {
        let mut debugger = FakeDebugger::new();
        let response = dispatch(
            &mut debugger,
            &EventRequest::ReadRegister {
                name: "xyz".to_string(),
            },
        );
        assert_eq!(response, EventResponse::error("Register 'xyz' not found"));
    }

    #[test]
    fn variable_type_never_fails() {
        let mut debugger = FakeDebugger::new().with_variable("point", "Point");
        assert_eq!(
            dispatch(
                &mut debugger,
                &EventRequest::GetVariableType {
                    name: "point".to_string()
                }
            ),
            EventResponse::VariableTypeResult {
                type_name: Some("Point".to_string())
            }
        );

        let mut debugger = FakeDebugger::new().without_thread();
        assert_eq!(
            dispatch(
                &mut debugger,
                &EventRequest::GetVariableType {
                    name: "point".to_string()
                }
            ),
            EventResponse::VariableTypeResult { type_name: None }
        );
    }

    #[test]
    fn missing_modules() {
        let mut debugger = FakeDebugger::new().without_modules();
        assert_eq!(
            dispatch(&mut debugger, &EventRequest::GetBaseAddress),
            EventResponse::error("No modules loaded")
        );
    }

    #[test]
    fn panicking_backend_is_contained() {
        let mut debugger = FakeDebugger::new().with_expression_panic("boom");
        let response = dispatch(
            &mut debugger,
            &EventRequest::EvaluateLLDBExpression {
                expr: "boom".to_string(),
            },
        );
        assert_eq!(response, EventResponse::error("Event handling error: boom"));
    }

    #[test]
    fn invalid_argument_is_not_evaluated() {
        let mut debugger = FakeDebugger::new();
        let response = dispatch(
            &mut debugger,
            &EventRequest::ExecuteFunction {
                function_address: 0x1000,
                args: vec![transport::MethodArgument::new(
                    transport::ArgumentType::Pointer,
                    "main",
                )],
                return_type_size: None,
            },
        );
        assert_eq!(
            response,
            EventResponse::error("Invalid pointer argument \"main\"")
        );
        assert!(debugger.evaluated().is_empty());
    }
}
