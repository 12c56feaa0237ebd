//! Event requests issued by the server and the client's responses
use serde::{Deserialize, Serialize};

/// An argument passed to a function or method call in the inferior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodArgument {
    /// Textual value: an address, integer, float or boolean literal
    pub value: String,
    pub arg_type: ArgumentType,
}

impl MethodArgument {
    pub fn new(arg_type: ArgumentType, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            arg_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgumentType {
    Pointer,
    Integer,
    Bool,
    Float,
    /// Any tag this version does not know; marshalled as an unsigned 64-bit value
    #[serde(other)]
    Other,
}

/// How the result of a synthesized call is handed back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodCallResult {
    /// Raw contents of the integer return register
    SimpleValue { value: u64, return_type: String },
    /// Address of a scratch buffer holding `size` bytes of an aggregate return
    ///
    /// The buffer only stays valid until the next evaluation in the inferior.
    ComplexPointer {
        address: u64,
        size: usize,
        return_type: String,
    },
}

impl MethodCallResult {
    /// Placeholder type reported for register returns; it carries no type information
    pub const SIMPLE_RETURN_TYPE: &'static str = "usize";
    pub const COMPLEX_RETURN_TYPE: &'static str = "complex";

    pub fn simple(value: u64) -> Self {
        MethodCallResult::SimpleValue {
            value,
            return_type: Self::SIMPLE_RETURN_TYPE.to_string(),
        }
    }

    pub fn complex(address: u64, size: usize) -> Self {
        MethodCallResult::ComplexPointer {
            address,
            size,
            return_type: Self::COMPLEX_RETURN_TYPE.to_string(),
        }
    }
}

/// Sub-requests the server sends while a command is in flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EventRequest {
    ReadMemory {
        address: u64,
        size: usize,
    },
    WriteMemory {
        address: u64,
        data: Vec<u8>,
    },
    ReadRegister {
        name: String,
    },
    ReadRegisterByIndex {
        index: usize,
    },
    GetFrameInfo,
    GetThreadInfo,
    GetBaseAddress,
    /// Evaluate an expression in the native debugger's own syntax
    EvaluateLLDBExpression {
        expr: String,
    },
    GetVariableType {
        name: String,
    },
    AllocateMemory {
        size: usize,
    },
    ExecuteMethod {
        method_address: u64,
        base_address: u64,
        args: Vec<MethodArgument>,
        /// `None` for results returned in a register, `Some(size)` for aggregates
        return_type_size: Option<usize>,
    },
    ExecuteFunction {
        function_address: u64,
        args: Vec<MethodArgument>,
        return_type_size: Option<usize>,
    },
    /// An event kind this version does not know about
    ///
    /// Only ever produced by decoding; the client answers it with an error so
    /// newer servers can keep talking to older clients.
    #[serde(other)]
    Unknown,
}

impl EventRequest {
    pub fn name(&self) -> &'static str {
        match self {
            EventRequest::ReadMemory { .. } => "ReadMemory",
            EventRequest::WriteMemory { .. } => "WriteMemory",
            EventRequest::ReadRegister { .. } => "ReadRegister",
            EventRequest::ReadRegisterByIndex { .. } => "ReadRegisterByIndex",
            EventRequest::GetFrameInfo => "GetFrameInfo",
            EventRequest::GetThreadInfo => "GetThreadInfo",
            EventRequest::GetBaseAddress => "GetBaseAddress",
            EventRequest::EvaluateLLDBExpression { .. } => "EvaluateLLDBExpression",
            EventRequest::GetVariableType { .. } => "GetVariableType",
            EventRequest::AllocateMemory { .. } => "AllocateMemory",
            EventRequest::ExecuteMethod { .. } => "ExecuteMethod",
            EventRequest::ExecuteFunction { .. } => "ExecuteFunction",
            EventRequest::Unknown => "Unknown",
        }
    }
}

/// Client answers to [`EventRequest`]s
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EventResponse {
    MemoryData { data: Vec<u8> },
    MemoryWritten,
    RegisterData { value: u64 },
    FrameInfo { pc: u64, sp: u64, fp: u64 },
    ThreadInfo { tid: u64, name: Option<String> },
    BaseAddress { address: u64 },
    ExpressionResult { value: String },
    VariableTypeResult { type_name: Option<String> },
    MemoryAllocated { address: u64 },
    MethodResult { result: MethodCallResult },
    FunctionResult { result: MethodCallResult },
    /// Any event can fail with a human readable message
    Error { message: String },
}

impl EventResponse {
    pub fn error(message: impl Into<String>) -> Self {
        EventResponse::Error {
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventResponse::MemoryData { .. } => "MemoryData",
            EventResponse::MemoryWritten => "MemoryWritten",
            EventResponse::RegisterData { .. } => "RegisterData",
            EventResponse::FrameInfo { .. } => "FrameInfo",
            EventResponse::ThreadInfo { .. } => "ThreadInfo",
            EventResponse::BaseAddress { .. } => "BaseAddress",
            EventResponse::ExpressionResult { .. } => "ExpressionResult",
            EventResponse::VariableTypeResult { .. } => "VariableTypeResult",
            EventResponse::MemoryAllocated { .. } => "MemoryAllocated",
            EventResponse::MethodResult { .. } => "MethodResult",
            EventResponse::FunctionResult { .. } => "FunctionResult",
            EventResponse::Error { .. } => "Error",
        }
    }

    /// Whether this response is a legal answer to `request`
    pub fn answers(&self, request: &EventRequest) -> bool {
        matches!(
            (request, self),
            (_, EventResponse::Error { .. })
                | (EventRequest::ReadMemory { .. }, EventResponse::MemoryData { .. })
                | (EventRequest::WriteMemory { .. }, EventResponse::MemoryWritten)
                | (EventRequest::ReadRegister { .. }, EventResponse::RegisterData { .. })
                | (
                    EventRequest::ReadRegisterByIndex { .. },
                    EventResponse::RegisterData { .. }
                )
                | (EventRequest::GetFrameInfo, EventResponse::FrameInfo { .. })
                | (EventRequest::GetThreadInfo, EventResponse::ThreadInfo { .. })
                | (EventRequest::GetBaseAddress, EventResponse::BaseAddress { .. })
                | (
                    EventRequest::EvaluateLLDBExpression { .. },
                    EventResponse::ExpressionResult { .. }
                )
                | (
                    EventRequest::GetVariableType { .. },
                    EventResponse::VariableTypeResult { .. }
                )
                | (
                    EventRequest::AllocateMemory { .. },
                    EventResponse::MemoryAllocated { .. }
                )
                | (
                    EventRequest::ExecuteMethod { .. },
                    EventResponse::MethodResult { .. }
                )
                | (
                    EventRequest::ExecuteFunction { .. },
                    EventResponse::FunctionResult { .. }
                )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;
    use serde_json::json;

    #[test]
    fn test_server_event_serialization() {
        let msg = Message::Event {
            event: EventRequest::ReadMemory {
                address: 0x12345678,
                size: 8,
            },
        };

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!({"type": "Event", "event": "ReadMemory", "address": 0x12345678u64, "size": 8})
        );
    }

    #[test]
    fn test_memory_bytes_are_integer_arrays() {
        let msg = Message::EventResponse {
            data: EventResponse::MemoryData {
                data: vec![0, 127, 255],
            },
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""data":[0,127,255]"#), "{json}");
    }

    #[test]
    fn test_method_result_shape() {
        let json = serde_json::to_value(EventResponse::FunctionResult {
            result: MethodCallResult::complex(0x1000, 24),
        })
        .unwrap();
        assert_eq!(
            json,
            json!({
                "event": "FunctionResult",
                "result": {"ComplexPointer": {"address": 4096, "size": 24, "return_type": "complex"}}
            })
        );
    }

    #[test]
    fn test_unknown_argument_type_falls_back() {
        let arg: MethodArgument =
            serde_json::from_value(json!({"value": "7", "arg_type": "Char"})).unwrap();
        assert_eq!(arg.arg_type, ArgumentType::Other);
    }

    #[test]
    fn test_unknown_event_kind_decodes() {
        let msg: Message = serde_json::from_value(json!({
            "type": "Event",
            "event": "GetRegisters",
            "frame": 0,
        }))
        .unwrap();
        assert_eq!(
            msg,
            Message::Event {
                event: EventRequest::Unknown
            }
        );
        assert!(EventResponse::error("Unknown event type").answers(&EventRequest::Unknown));
        assert!(!EventResponse::MemoryWritten.answers(&EventRequest::Unknown));
    }

    #[test]
    fn test_missing_return_size_is_none() {
        let msg: Message = serde_json::from_value(json!({
            "type": "Event",
            "event": "ExecuteFunction",
            "function_address": 4096,
            "args": [],
        }))
        .unwrap();
        assert_eq!(
            msg,
            Message::Event {
                event: EventRequest::ExecuteFunction {
                    function_address: 4096,
                    args: vec![],
                    return_type_size: None,
                }
            }
        );
    }

    #[test]
    fn test_response_categories() {
        let read = EventRequest::ReadMemory {
            address: 0,
            size: 1,
        };
        assert!(EventResponse::MemoryData { data: vec![1] }.answers(&read));
        assert!(EventResponse::error("boom").answers(&read));
        assert!(!EventResponse::MemoryWritten.answers(&read));
        assert!(!EventResponse::FunctionResult {
            result: MethodCallResult::simple(1)
        }
        .answers(&EventRequest::ExecuteMethod {
            method_address: 0,
            base_address: 0,
            args: vec![],
            return_type_size: None,
        }));
    }
}
