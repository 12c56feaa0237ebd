//! An in-memory debugger for tests
//!
//! [`FakeDebugger`] models a stopped process with a handful of mapped memory
//! regions, one thread and one frame. Its expression evaluator understands
//! just enough to run the expressions the dispatcher synthesizes:
//!
//! - `(void*)malloc(N)` hands out zeroed memory from a fake heap
//! - function pointer calls are routed to [`FakeFunction`]s registered by
//!   address; aggregate results are copied into a scratch region that is
//!   overwritten by the next aggregate call
//! - anything else must be registered with [`FakeDebugger::with_expression`]
use std::collections::HashMap;
use std::path::PathBuf;

use crate::backend::{
    BackendError, DebuggerSession, Evaluation, Frame, Process, Register, RegisterSet, Target,
    Thread,
};

pub const EXECUTABLE: &str = "/bin/prog";
pub const BASE_ADDRESS: u64 = 0x5555_5555_4000;
pub const STACK_BASE: u64 = 0x7ffe_0000;
pub const STACK_SIZE: usize = 256;
/// Read-only data, writes to it fail
pub const RODATA_BASE: u64 = 0x5555_5555_8000;
pub const SCRATCH_ADDRESS: u64 = 0x7fff_f000;
pub const HEAP_BASE: u64 = 0x6000_0000;

pub const PC: u64 = 0x5555_5555_5140;
pub const SP: u64 = STACK_BASE + 0x80;
pub const FP: u64 = STACK_BASE + 0xa0;

/// An argument decoded from a synthesized call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallValue {
    /// Pointers, integers and booleans
    Unsigned(u64),
    Float(f64),
}

impl CallValue {
    pub fn as_u64(&self) -> u64 {
        match self {
            CallValue::Unsigned(v) => *v,
            CallValue::Float(f) => *f as u64,
        }
    }
}

/// Behaviour of a function living in the fake inferior
pub enum FakeFunction {
    /// Returns its result in a register
    Scalar(Box<dyn Fn(&[CallValue]) -> u64>),
    /// Returns the bytes of an aggregate
    Aggregate(Box<dyn Fn(&[CallValue]) -> Vec<u8>>),
}

impl FakeFunction {
    pub fn scalar(f: impl Fn(&[CallValue]) -> u64 + 'static) -> Self {
        FakeFunction::Scalar(Box::new(f))
    }

    pub fn aggregate(f: impl Fn(&[CallValue]) -> Vec<u8> + 'static) -> Self {
        FakeFunction::Aggregate(Box::new(f))
    }
}

struct Region {
    start: u64,
    bytes: Vec<u8>,
    writable: bool,
}

impl Region {
    fn contains(&self, address: u64) -> bool {
        address >= self.start && address - self.start < self.bytes.len() as u64
    }
}

struct FakeFrame {
    register_sets: Vec<RegisterSet>,
    variables: HashMap<String, String>,
}

impl Frame for FakeFrame {
    fn pc(&self) -> u64 {
        self.register("rip")
    }

    fn sp(&self) -> u64 {
        self.register("rsp")
    }

    fn fp(&self) -> u64 {
        self.register("rbp")
    }

    fn register_sets(&self) -> Vec<RegisterSet> {
        self.register_sets.clone()
    }

    fn variable_type(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }
}

impl FakeFrame {
    fn register(&self, name: &str) -> u64 {
        self.register_sets
            .iter()
            .flat_map(|set| &set.registers)
            .find(|r| r.name == name)
            .map(|r| r.value)
            .unwrap_or_default()
    }
}

struct FakeThread {
    id: u64,
    name: Option<String>,
    frame: Option<FakeFrame>,
}

impl Thread for FakeThread {
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    fn selected_frame(&mut self) -> Option<&mut dyn Frame> {
        self.frame.as_mut().map(|f| f as &mut dyn Frame)
    }
}

struct FakeProcess {
    regions: Vec<Region>,
    thread: Option<FakeThread>,
}

impl FakeProcess {
    fn region(&self, address: u64) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(address))
    }

    /// Replace whatever is mapped at `start` with `bytes`
    fn map(&mut self, start: u64, bytes: Vec<u8>, writable: bool) {
        self.regions.retain(|r| r.start != start);
        self.regions.push(Region {
            start,
            bytes,
            writable,
        });
    }
}

impl Process for FakeProcess {
    fn read_memory(&mut self, address: u64, size: usize) -> Result<Vec<u8>, BackendError> {
        let unreadable = || BackendError::new(format!("memory read failed for {address:#x}"));
        let region = self.region(address).ok_or_else(unreadable)?;
        let offset = (address - region.start) as usize;
        region
            .bytes
            .get(offset..offset.saturating_add(size))
            .map(<[u8]>::to_vec)
            .ok_or_else(unreadable)
    }

    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<usize, BackendError> {
        let region = self
            .regions
            .iter_mut()
            .find(|r| r.contains(address))
            .ok_or_else(|| BackendError::new(format!("memory write failed for {address:#x}")))?;
        if !region.writable {
            return Err(BackendError::new(format!(
                "memory at {address:#x} is not writable"
            )));
        }

        // writes stop at the end of the region
        let offset = (address - region.start) as usize;
        let count = data.len().min(region.bytes.len() - offset);
        region.bytes[offset..offset + count].copy_from_slice(&data[..count]);
        Ok(count)
    }

    fn selected_thread(&mut self) -> Option<&mut dyn Thread> {
        self.thread.as_mut().map(|t| t as &mut dyn Thread)
    }
}

struct FakeTarget {
    executable: Option<PathBuf>,
    base_address: Option<u64>,
    process: Option<FakeProcess>,
    expressions: HashMap<String, Evaluation>,
    panicking: Vec<String>,
    functions: HashMap<u64, FakeFunction>,
    evaluated: Vec<String>,
    heap_next: u64,
}

impl Target for FakeTarget {
    fn executable(&self) -> Option<PathBuf> {
        self.executable.clone()
    }

    fn process(&mut self) -> Option<&mut dyn Process> {
        self.process.as_mut().map(|p| p as &mut dyn Process)
    }

    fn base_address(&self) -> Option<u64> {
        self.base_address
    }

    fn evaluate(&mut self, expr: &str) -> Result<Evaluation, BackendError> {
        self.evaluated.push(expr.to_string());

        if self.panicking.iter().any(|e| e == expr) {
            panic!("{expr}");
        }
        if let Some(evaluation) = self.expressions.get(expr) {
            return Ok(evaluation.clone());
        }
        if let Some(size) = expr
            .strip_prefix("(void*)malloc(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let size: usize = size
                .parse()
                .map_err(|_| BackendError::new(format!("bad allocation size {size}")))?;
            return self.malloc(size);
        }
        if let Some(call) = ParsedCall::parse(expr) {
            return self.call(call);
        }

        Err(BackendError::new(format!(
            "error: use of undeclared identifier '{expr}'"
        )))
    }
}

impl FakeTarget {
    fn process_mut(&mut self) -> Result<&mut FakeProcess, BackendError> {
        self.process
            .as_mut()
            .ok_or_else(|| BackendError::new("process exited"))
    }

    fn malloc(&mut self, size: usize) -> Result<Evaluation, BackendError> {
        let address = self.heap_next;
        self.heap_next += (size as u64).max(1).next_multiple_of(16);
        self.process_mut()?.map(address, vec![0; size], true);
        Ok(Evaluation::unsigned(address))
    }

    fn call(&mut self, call: ParsedCall) -> Result<Evaluation, BackendError> {
        let function = self.functions.get(&call.address).ok_or_else(|| {
            BackendError::new(format!("no function at {:#x}", call.address))
        })?;

        match (function, call.buffer_size) {
            (FakeFunction::Scalar(f), None) => Ok(Evaluation::unsigned(f(&call.args))),
            (FakeFunction::Aggregate(f), Some(size)) => {
                let mut bytes = f(&call.args);
                bytes.resize(size, 0);
                self.process
                    .as_mut()
                    .ok_or_else(|| BackendError::new("process exited"))?
                    .map(SCRATCH_ADDRESS, bytes, true);
                Ok(Evaluation {
                    value: Some(format!("{SCRATCH_ADDRESS:#x}")),
                    unsigned: Some(SCRATCH_ADDRESS),
                    type_name: Some(format!("ReturnBuffer_{size} *")),
                    ..Default::default()
                })
            }
            _ => Err(BackendError::new(format!(
                "return shape does not match the function at {:#x}",
                call.address
            ))),
        }
    }
}

/// A call expression as produced by the dispatcher
struct ParsedCall {
    address: u64,
    args: Vec<CallValue>,
    buffer_size: Option<usize>,
}

impl ParsedCall {
    fn parse(expr: &str) -> Option<Self> {
        let buffer_size = match expr.strip_prefix("struct ReturnBuffer_") {
            Some(rest) => {
                let digits = rest.find(|c: char| !c.is_ascii_digit())?;
                Some(rest[..digits].parse().ok()?)
            }
            None => None,
        };

        let callee = &expr[expr.find("))0x")? + 4..];
        let end = callee.find(')')?;
        let address = u64::from_str_radix(&callee[..end], 16).ok()?;

        let list = callee[end + 1..].strip_prefix('(')?;
        let mut depth = 1;
        let close = list.char_indices().find_map(|(i, c)| {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            (depth == 0).then_some(i)
        })?;

        let args = list[..close]
            .split(", ")
            .filter(|a| !a.is_empty())
            .map(parse_literal)
            .collect::<Option<Vec<_>>>()?;

        Some(Self {
            address,
            args,
            buffer_size,
        })
    }
}

fn parse_literal(literal: &str) -> Option<CallValue> {
    if let Some(pointer) = literal.strip_prefix("(void*)0x") {
        return u64::from_str_radix(pointer, 16).ok().map(CallValue::Unsigned);
    }
    if let Some(integer) = literal.strip_suffix("ul") {
        return integer.parse().ok().map(CallValue::Unsigned);
    }
    if literal.contains(['.', 'e', 'E']) {
        return literal.parse().ok().map(CallValue::Float);
    }
    literal.parse().ok().map(CallValue::Unsigned)
}

/// Debugger session backed entirely by memory
pub struct FakeDebugger {
    target: Option<FakeTarget>,
}

impl Default for FakeDebugger {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDebugger {
    /// A process stopped in `main` with a stack and a read-only data region
    pub fn new() -> Self {
        let register_sets = vec![
            RegisterSet {
                name: "General Purpose Registers".to_string(),
                registers: vec![
                    Register::new("rip", PC),
                    Register::new("rsp", SP),
                    Register::new("rbp", FP),
                    Register::new("rax", 0),
                    Register::new("rdi", 1),
                ],
            },
            RegisterSet {
                name: "Floating Point Registers".to_string(),
                registers: vec![Register::new("fcw", 0x37f), Register::new("fsw", 0)],
            },
        ];

        let stack = (0..STACK_SIZE).map(|i| i as u8).collect();
        let process = FakeProcess {
            regions: vec![
                Region {
                    start: STACK_BASE,
                    bytes: stack,
                    writable: true,
                },
                Region {
                    start: RODATA_BASE,
                    bytes: b"hello, world!\0\0\0".to_vec(),
                    writable: false,
                },
            ],
            thread: Some(FakeThread {
                id: 4242,
                name: Some("main".to_string()),
                frame: Some(FakeFrame {
                    register_sets,
                    variables: HashMap::new(),
                }),
            }),
        };

        Self {
            target: Some(FakeTarget {
                executable: Some(PathBuf::from(EXECUTABLE)),
                base_address: Some(BASE_ADDRESS),
                process: Some(process),
                expressions: HashMap::new(),
                panicking: Vec::new(),
                functions: HashMap::new(),
                evaluated: Vec::new(),
                heap_next: HEAP_BASE,
            }),
        }
    }

    fn with_target(mut self, f: impl FnOnce(&mut FakeTarget)) -> Self {
        if let Some(target) = self.target.as_mut() {
            f(target);
        }
        self
    }

    fn with_process(self, f: impl FnOnce(&mut FakeProcess)) -> Self {
        self.with_target(|t| {
            if let Some(process) = t.process.as_mut() {
                f(process);
            }
        })
    }

    fn with_thread(self, f: impl FnOnce(&mut FakeThread)) -> Self {
        self.with_process(|p| {
            if let Some(thread) = p.thread.as_mut() {
                f(thread);
            }
        })
    }

    pub fn without_target(mut self) -> Self {
        self.target = None;
        self
    }

    pub fn without_process(self) -> Self {
        self.with_target(|t| t.process = None)
    }

    pub fn without_thread(self) -> Self {
        self.with_process(|p| p.thread = None)
    }

    pub fn without_frame(self) -> Self {
        self.with_thread(|t| t.frame = None)
    }

    pub fn without_modules(self) -> Self {
        self.with_target(|t| t.base_address = None)
    }

    pub fn with_executable(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.with_target(|t| t.executable = Some(path))
    }

    pub fn without_executable(self) -> Self {
        self.with_target(|t| t.executable = None)
    }

    pub fn with_base_address(self, address: u64) -> Self {
        self.with_target(|t| t.base_address = Some(address))
    }

    pub fn with_thread_name(self, name: Option<&str>) -> Self {
        let name = name.map(str::to_string);
        self.with_thread(|t| t.name = name)
    }

    pub fn with_variable(self, name: &str, type_name: &str) -> Self {
        self.with_thread(|t| {
            if let Some(frame) = t.frame.as_mut() {
                frame
                    .variables
                    .insert(name.to_string(), type_name.to_string());
            }
        })
    }

    pub fn with_region(self, start: u64, bytes: Vec<u8>, writable: bool) -> Self {
        self.with_process(|p| p.map(start, bytes, writable))
    }

    pub fn with_expression(self, expr: &str, evaluation: Evaluation) -> Self {
        self.with_target(|t| {
            t.expressions.insert(expr.to_string(), evaluation);
        })
    }

    /// Evaluating exactly `expr` panics inside the backend
    pub fn with_expression_panic(self, expr: &str) -> Self {
        self.with_target(|t| t.panicking.push(expr.to_string()))
    }

    pub fn with_function(self, address: u64, function: FakeFunction) -> Self {
        self.with_target(|t| {
            t.functions.insert(address, function);
        })
    }

    /// Every expression evaluated so far, in order
    pub fn evaluated(&self) -> Vec<String> {
        self.target
            .as_ref()
            .map(|t| t.evaluated.clone())
            .unwrap_or_default()
    }

    /// Total number of registers across all sets of the selected frame
    pub fn register_count(&self) -> usize {
        self.target
            .as_ref()
            .and_then(|t| t.process.as_ref())
            .and_then(|p| p.thread.as_ref())
            .and_then(|t| t.frame.as_ref())
            .map(|f| f.register_sets.iter().map(|s| s.registers.len()).sum())
            .unwrap_or_default()
    }

    /// Bytes currently mapped at `address`, bypassing the debugger traits
    pub fn memory(&self, address: u64, size: usize) -> Option<Vec<u8>> {
        let region = self.target.as_ref()?.process.as_ref()?.region(address)?;
        let offset = (address - region.start) as usize;
        region.bytes.get(offset..offset.saturating_add(size)).map(<[u8]>::to_vec)
    }
}

impl DebuggerSession for FakeDebugger {
    fn selected_target(&mut self) -> Option<&mut dyn Target> {
        self.target.as_mut().map(|t| t as &mut dyn Target)
    }
}
