//! Requests from an engine to the client's debugger
use eyre::WrapErr;
use transport::{Connection, EventRequest, EventResponse, Message, MethodArgument, MethodCallResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub pc: u64,
    pub sp: u64,
    pub fp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub tid: u64,
    pub name: Option<String>,
}

/// Sends events on the session's connection while a command is running
///
/// Each request blocks until the client answers. An `Error` answer is an
/// ordinary failure the engine may recover from. A transport failure or an
/// answer of the wrong kind marks the delegate broken, after which the
/// connection is abandoned whatever the engine returns.
pub struct Delegate<'c> {
    connection: &'c mut Connection,
    broken: bool,
    events: usize,
}

impl<'c> Delegate<'c> {
    pub(crate) fn new(connection: &'c mut Connection) -> Self {
        Self {
            connection,
            broken: false,
            events: 0,
        }
    }

    /// Send one event and wait for the matching response
    pub fn request(&mut self, event: EventRequest) -> eyre::Result<EventResponse> {
        if self.broken {
            eyre::bail!("connection to the client is no longer usable");
        }
        let result = self.exchange(&event);
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    fn exchange(&mut self, event: &EventRequest) -> eyre::Result<EventResponse> {
        tracing::trace!(event = event.name(), "sending event");
        self.connection
            .send(&Message::Event {
                event: event.clone(),
            })
            .wrap_err("sending event")?;
        self.events += 1;

        match self
            .connection
            .receive()
            .wrap_err("waiting for event response")?
        {
            Message::EventResponse { data } if data.answers(event) => Ok(data),
            Message::EventResponse { data } => eyre::bail!(
                "protocol violation: {} does not answer {}",
                data.name(),
                event.name()
            ),
            other => eyre::bail!(
                "protocol violation: unexpected {} while awaiting an event response",
                other.kind()
            ),
        }
    }

    fn expect<T>(
        &mut self,
        event: EventRequest,
        extract: impl FnOnce(EventResponse) -> Option<T>,
    ) -> eyre::Result<T> {
        let name = event.name();
        match self.request(event)? {
            EventResponse::Error { message } => Err(eyre::eyre!(message)),
            response => {
                let got = response.name();
                extract(response).ok_or_else(|| eyre::eyre!("unexpected {got} answer to {name}"))
            }
        }
    }

    pub fn read_memory(&mut self, address: u64, size: usize) -> eyre::Result<Vec<u8>> {
        self.expect(EventRequest::ReadMemory { address, size }, |r| match r {
            EventResponse::MemoryData { data } => Some(data),
            _ => None,
        })
    }

    pub fn write_memory(&mut self, address: u64, data: Vec<u8>) -> eyre::Result<()> {
        self.expect(EventRequest::WriteMemory { address, data }, |r| match r {
            EventResponse::MemoryWritten => Some(()),
            _ => None,
        })
    }

    pub fn read_register(&mut self, name: &str) -> eyre::Result<u64> {
        self.expect(
            EventRequest::ReadRegister {
                name: name.to_string(),
            },
            |r| match r {
                EventResponse::RegisterData { value } => Some(value),
                _ => None,
            },
        )
    }

    pub fn frame_info(&mut self) -> eyre::Result<FrameInfo> {
        self.expect(EventRequest::GetFrameInfo, |r| match r {
            EventResponse::FrameInfo { pc, sp, fp } => Some(FrameInfo { pc, sp, fp }),
            _ => None,
        })
    }

    pub fn thread_info(&mut self) -> eyre::Result<ThreadInfo> {
        self.expect(EventRequest::GetThreadInfo, |r| match r {
            EventResponse::ThreadInfo { tid, name } => Some(ThreadInfo { tid, name }),
            _ => None,
        })
    }

    pub fn base_address(&mut self) -> eyre::Result<u64> {
        self.expect(EventRequest::GetBaseAddress, |r| match r {
            EventResponse::BaseAddress { address } => Some(address),
            _ => None,
        })
    }

    /// Evaluate an expression with the client's native evaluator
    pub fn evaluate(&mut self, expr: &str) -> eyre::Result<String> {
        self.expect(
            EventRequest::EvaluateLLDBExpression {
                expr: expr.to_string(),
            },
            |r| match r {
                EventResponse::ExpressionResult { value } => Some(value),
                _ => None,
            },
        )
    }

    pub fn variable_type(&mut self, name: &str) -> eyre::Result<Option<String>> {
        self.expect(
            EventRequest::GetVariableType {
                name: name.to_string(),
            },
            |r| match r {
                EventResponse::VariableTypeResult { type_name } => Some(type_name),
                _ => None,
            },
        )
    }

    pub fn allocate(&mut self, size: usize) -> eyre::Result<u64> {
        self.expect(EventRequest::AllocateMemory { size }, |r| match r {
            EventResponse::MemoryAllocated { address } => Some(address),
            _ => None,
        })
    }

    /// Call a function in the inferior
    ///
    /// For aggregate returns the bytes are read back immediately, before
    /// anything else can reuse the evaluator's scratch space.
    pub fn call_function(
        &mut self,
        function_address: u64,
        args: Vec<MethodArgument>,
        return_type_size: Option<usize>,
    ) -> eyre::Result<CallReturn> {
        let result = self.expect(
            EventRequest::ExecuteFunction {
                function_address,
                args,
                return_type_size,
            },
            |r| match r {
                EventResponse::FunctionResult { result } => Some(result),
                _ => None,
            },
        )?;
        self.materialize(result)
    }

    /// Call a method on the object at `base_address`
    pub fn call_method(
        &mut self,
        method_address: u64,
        base_address: u64,
        args: Vec<MethodArgument>,
        return_type_size: Option<usize>,
    ) -> eyre::Result<CallReturn> {
        let result = self.expect(
            EventRequest::ExecuteMethod {
                method_address,
                base_address,
                args,
                return_type_size,
            },
            |r| match r {
                EventResponse::MethodResult { result } => Some(result),
                _ => None,
            },
        )?;
        self.materialize(result)
    }

    fn materialize(&mut self, result: MethodCallResult) -> eyre::Result<CallReturn> {
        match result {
            MethodCallResult::SimpleValue { value, .. } => Ok(CallReturn::Register(value)),
            MethodCallResult::ComplexPointer { address, size, .. } => {
                let bytes = self
                    .read_memory(address, size)
                    .wrap_err_with(|| format!("reading {size} byte return value at {address:#x}"))?;
                Ok(CallReturn::Bytes(bytes))
            }
        }
    }

    /// Events sent so far
    pub fn events(&self) -> usize {
        self.events
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

/// Value returned by a call in the inferior
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallReturn {
    /// Raw register contents; the width and signedness are up to the caller
    Register(u64),
    Bytes(Vec<u8>),
}
