//! The bytecode interpreter (spec.md §4.4-§4.5).
//!
//! One `Vm` is one thread of execution: its own operand stack, locals
//! slab, call-frame stack, and try-handler stack. `go` spawns a brand-new
//! `Vm` sharing only the read-only chunk and argv (spec.md §5); nothing
//! else is shared, so there is no locking on the hot path.

use std::sync::{Arc, Mutex};

use opo_core::limits::{FRAMES_MAX, LOCALS_PER_FRAME, OPTION_ENUM_ID, STACK_MAX};
use opo_core::{Chunk, EnumValue, MapKey, MapValue, NativeValue, OpCode, StructValue, TypeDesc, Value};

use crate::channel;
use crate::error::RuntimeError;
use crate::format::format_value;
use crate::natives::{self, NativeContext};

/// Marks a task's root frame: there is no caller to return into, so `RET`
/// popping this frame ends `run` instead of restoring an instruction
/// pointer (spec.md §4.5 "a RET with no caller terminates vm_run").
const SENTINEL_RETURN_IP: usize = usize::MAX;

struct Frame {
    return_ip: usize,
    locals_offset: usize,
}

struct TryFrame {
    stack_ptr: usize,
    frame_ptr: usize,
    handler_addr: usize,
}

/// Where `PRINT` writes. Every `go`-spawned task shares its parent's sink
/// (an `Arc` clone), so output from concurrent tasks lands in the same
/// place real stdout would put it.
#[derive(Clone)]
enum Sink {
    Stdout,
    Buffer(Arc<Mutex<String>>),
}

impl Sink {
    fn write_line(&self, s: &str) {
        match self {
            Sink::Stdout => println!("{s}"),
            Sink::Buffer(buf) => {
                let mut buf = buf.lock().unwrap();
                buf.push_str(s);
                buf.push('\n');
            }
        }
    }
}

pub struct Vm {
    chunk: Arc<Chunk>,
    argv: Arc<Vec<String>>,
    stack: Vec<Value>,
    locals: Vec<Value>,
    frames: Vec<Frame>,
    try_stack: Vec<TryFrame>,
    ip: usize,
    out: Sink,
}

/// Compile a chunk's `main` and run it to completion on the calling thread,
/// printing to real stdout.
pub fn run(chunk: Chunk, argv: Vec<String>) -> Result<(), RuntimeError> {
    tracing::debug!(code_len = chunk.code.len(), "vm starting");
    let chunk = Arc::new(chunk);
    let argv = Arc::new(argv);
    let mut vm = Vm::new_root(chunk, argv, Sink::Stdout);
    let result = vm.run();
    if let Err(e) = &result {
        tracing::warn!(error = %e, "vm run ended with an unhandled error");
    }
    result
}

/// Runs a chunk to completion, capturing everything `!!` (print) writes
/// instead of sending it to stdout. Used by integration tests that assert
/// on program output.
#[doc(hidden)]
pub fn run_to_string(chunk: Chunk, argv: Vec<String>) -> Result<String, RuntimeError> {
    let chunk = Arc::new(chunk);
    let argv = Arc::new(argv);
    let buf = Arc::new(Mutex::new(String::new()));
    let mut vm = Vm::new_root(chunk, argv, Sink::Buffer(buf.clone()));
    vm.run()?;
    Ok(buf.lock().unwrap().clone())
}

impl Vm {
    fn new_root(chunk: Arc<Chunk>, argv: Arc<Vec<String>>, out: Sink) -> Vm {
        Vm {
            chunk,
            argv,
            stack: Vec::new(),
            locals: vec![Value::Void; FRAMES_MAX * LOCALS_PER_FRAME],
            frames: Vec::new(),
            try_stack: Vec::new(),
            ip: 0,
            out,
        }
    }

    fn new_task(chunk: Arc<Chunk>, argv: Arc<Vec<String>>, addr: usize, args: Vec<Value>, out: Sink) -> Vm {
        Vm {
            chunk,
            argv,
            stack: args,
            locals: vec![Value::Void; FRAMES_MAX * LOCALS_PER_FRAME],
            frames: vec![Frame { return_ip: SENTINEL_RETURN_IP, locals_offset: 0 }],
            try_stack: Vec::new(),
            ip: addr,
            out,
        }
    }

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            let op = self.fetch_op()?;
            match op {
                OpCode::Halt => return Ok(()),
                OpCode::PushInt => {
                    let n = self.fetch_i64();
                    self.push(Value::Int(n))?;
                }
                OpCode::PushFlt => {
                    let bits = self.fetch_i64();
                    self.push(Value::Flt(f64::from_bits(bits as u64)))?;
                }
                OpCode::PushStr => {
                    let idx = self.fetch_u8();
                    let s = self.chunk.strings[idx as usize].as_str();
                    self.push(Value::Str(Arc::from(s)))?;
                }
                OpCode::PushBool => {
                    let b = self.fetch_u8();
                    self.push(Value::Bool(b != 0))?;
                }
                OpCode::PushFunc => {
                    let addr = self.fetch_i64();
                    let kind = self.fetch_u8();
                    self.push(Value::Func(addr, TypeDesc::from_packed(kind as u32)))?;
                }
                OpCode::Add => self.binary_add()?,
                OpCode::Sub => self.binary_numeric(|a, b| a - b, |a, b| a - b)?,
                OpCode::Mul => self.binary_numeric(|a, b| a * b, |a, b| a * b)?,
                OpCode::Div => self.binary_div()?,
                OpCode::Mod => self.binary_mod()?,
                OpCode::Neg => self.unary_neg()?,
                OpCode::Eq => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(values_equal(&a, &b)))?;
                }
                OpCode::Lt => self.compare(|o| o == std::cmp::Ordering::Less)?,
                OpCode::Gt => self.compare(|o| o == std::cmp::Ordering::Greater)?,
                OpCode::Lte => self.compare(|o| o != std::cmp::Ordering::Greater)?,
                OpCode::Gte => self.compare(|o| o != std::cmp::Ordering::Less)?,
                OpCode::And => self.binary_bool(|a, b| a && b)?,
                OpCode::Or => self.binary_bool(|a, b| a || b)?,
                OpCode::Not => {
                    let v = self.pop();
                    self.push(Value::Bool(!v.is_truthy()))?;
                }
                OpCode::Print => {
                    let v = self.pop();
                    self.out.write_line(&format_value(&v));
                }
                OpCode::Store => {
                    let idx = self.fetch_u8() as usize;
                    let offset = self.locals_offset();
                    let v = self.pop();
                    self.locals[offset + idx] = v;
                }
                OpCode::Load => {
                    let idx = self.fetch_u8() as usize;
                    let offset = self.locals_offset();
                    let v = self.locals[offset + idx].clone();
                    self.push(v)?;
                }
                OpCode::LoadG => {
                    let idx = self.fetch_u8();
                    let sig = opo_core::natives::by_index(idx).expect("native index out of range");
                    self.push(Value::Native(Arc::new(NativeValue { index: idx, name: sig.name.to_string() })))?;
                }
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::Jump => {
                    let addr = self.fetch_i32();
                    self.ip = addr as usize;
                }
                OpCode::JumpIfF => {
                    let addr = self.fetch_i32();
                    let cond = self.pop();
                    if !cond.is_truthy() {
                        self.ip = addr as usize;
                    }
                }
                OpCode::IsTruthy => {
                    let v = self.pop();
                    self.push(Value::Bool(v.is_truthy()))?;
                }
                OpCode::Call => {
                    let addr = self.fetch_i32() as usize;
                    self.push_frame(addr)?;
                }
                OpCode::Invoke => {
                    let n = self.fetch_u8() as usize;
                    self.invoke(n)?;
                }
                OpCode::Go => {
                    let n = self.fetch_u8() as usize;
                    self.spawn_go(n)?;
                }
                OpCode::Ret => {
                    let frame = self.frames.pop().expect("RET with no active frame");
                    if frame.return_ip == SENTINEL_RETURN_IP {
                        return Ok(());
                    }
                    self.ip = frame.return_ip;
                }
                OpCode::Typeof => {
                    let v = self.pop();
                    self.push(Value::Str(Arc::from(v.type_desc().type_name().as_str())))?;
                }
                OpCode::Index => self.index_read()?,
                OpCode::SetIndex => self.index_write()?,
                OpCode::GetMember => {
                    let idx = self.fetch_u8() as usize;
                    let v = self.pop();
                    match v {
                        Value::Struct(s) => {
                            let values = s.values.lock().unwrap();
                            self.push(values[idx].clone())?;
                        }
                        other => return self.raise_logic(format!("Cannot access field of {}", other.type_desc().type_name())),
                    }
                }
                OpCode::SetMember => {
                    let idx = self.fetch_u8() as usize;
                    let value = self.pop();
                    let target = self.pop();
                    match target {
                        Value::Struct(s) => {
                            s.values.lock().unwrap()[idx] = value;
                        }
                        other => return self.raise_logic(format!("Cannot set field of {}", other.type_desc().type_name())),
                    }
                }
                OpCode::Array => {
                    let packed = self.fetch_i32();
                    let n = self.fetch_u8() as usize;
                    let mut items = self.pop_n(n);
                    items.reverse();
                    self.push(Value::Array(Arc::new(Mutex::new(items)), TypeDesc::from_packed(packed as u32)))?;
                }
                OpCode::Map => {
                    let packed = self.fetch_i32();
                    let n = self.fetch_u8() as usize;
                    let mut map = MapValue::default();
                    // Pairs were pushed key, value, key, value, ...; popped
                    // back off in reverse (last value, last key, ...).
                    for _ in 0..n {
                        let value = self.pop();
                        let key = self.pop();
                        if let Some(k) = MapKey::from_value(&key) {
                            map.entries.insert(k, value);
                        } else {
                            return self.raise_logic("Map keys must be int, str, or bool".to_string());
                        }
                    }
                    self.push(Value::Map(Arc::new(Mutex::new(map)), TypeDesc::from_packed(packed as u32)))?;
                }
                OpCode::Struct => {
                    let n = self.fetch_u8() as usize;
                    let mut values = self.pop_n(n);
                    values.reverse();
                    // STRUCT carries only a field count (spec.md §4.4); name
                    // and field names live only at compile time and are not
                    // recoverable from bytecode, so this heap object is
                    // tagged with placeholder metadata.
                    self.push(Value::Struct(Arc::new(StructValue {
                        name: String::new(),
                        fields: vec![String::new(); n],
                        values: Mutex::new(values),
                    })))?;
                }
                OpCode::EnumVariant => {
                    let packed = self.fetch_i32();
                    let enum_id = self.fetch_u8();
                    let has = self.fetch_u8();
                    let (payload, variant_index) = if has != 0 {
                        (Some(self.pop()), 1u8)
                    } else {
                        (None, 0u8)
                    };
                    let ty = TypeDesc::from_packed(packed as u32);
                    let variant_name = if enum_id == OPTION_ENUM_ID {
                        if variant_index == 0 { "none" } else { "some" }.to_string()
                    } else {
                        String::new()
                    };
                    self.push(Value::Enum(Arc::new(EnumValue { enum_id, variant_index, variant_name, payload }), ty))?;
                }
                OpCode::CheckVariant => {
                    let v = self.fetch_i32() as u8;
                    let top = self.stack.last().expect("CHECK_VARIANT on empty stack");
                    let matches = matches!(top, Value::Enum(e, _) if e.variant_index == v);
                    self.push(Value::Bool(matches))?;
                }
                OpCode::CheckType => {
                    let kind = self.fetch_u8();
                    let top = self.stack.last().expect("CHECK_TYPE on empty stack");
                    let actual = top.type_desc().to_packed() & 0xFF;
                    self.push(Value::Bool(actual == kind as u32))?;
                }
                OpCode::AsType => {
                    let packed = self.fetch_i32();
                    let len = self.stack.len();
                    let top = self.stack.last().expect("AS_TYPE on empty stack").clone();
                    self.stack[len - 1] = retag(top, TypeDesc::from_packed(packed as u32));
                }
                OpCode::GetEnumPayload => {
                    let top = self.stack.last().expect("GET_ENUM_PAYLOAD on empty stack");
                    match top {
                        Value::Enum(e, _) => {
                            let payload = e.payload.clone().unwrap_or(Value::Void);
                            self.push(payload)?;
                        }
                        other => return self.raise_logic(format!("Cannot unwrap a non-option value ({})", other.type_desc().type_name())),
                    }
                }
                OpCode::ExtractEnumPayload => {
                    let v = self.pop();
                    match v {
                        Value::Enum(e, _) => self.push(e.payload.clone().unwrap_or(Value::Void))?,
                        other => return self.raise_logic(format!("Cannot extract payload from {}", other.type_desc().type_name())),
                    }
                }
                OpCode::Try => {
                    let handler_addr = self.fetch_i32() as usize;
                    self.try_stack.push(TryFrame {
                        stack_ptr: self.stack.len(),
                        frame_ptr: self.frames.len(),
                        handler_addr,
                    });
                }
                OpCode::EndTry => {
                    self.try_stack.pop();
                }
                OpCode::Throw => {
                    let v = self.pop();
                    self.raise_thrown(v)?;
                }
                OpCode::Chan => {
                    let packed = self.fetch_i32();
                    let cap = self.pop();
                    let cap = match cap {
                        Value::Int(n) if n >= 0 => n as usize,
                        _ => return self.raise_logic("Channel capacity must be a non-negative int".to_string()),
                    };
                    let chan = opo_core::ChannelValue {
                        capacity: cap,
                        state: Mutex::new(opo_core::ChannelState { buffer: Default::default(), closed: false }),
                        send_cond: std::sync::Condvar::new(),
                        recv_cond: std::sync::Condvar::new(),
                    };
                    self.push(Value::Chan(Arc::new(chan), TypeDesc::from_packed(packed as u32)))?;
                }
                OpCode::Send => {
                    let value = self.pop();
                    let chan = self.pop();
                    match chan {
                        Value::Chan(c, _) => match channel::send(&c, value) {
                            channel::SendOutcome::Sent => {}
                            channel::SendOutcome::ClosedError => {
                                return self.raise_logic("Send on closed channel".to_string());
                            }
                        },
                        other => return self.raise_logic(format!("Cannot send on {}", other.type_desc().type_name())),
                    }
                }
                OpCode::Recv => {
                    let chan = self.pop();
                    match chan {
                        Value::Chan(c, _) => {
                            let v = channel::recv(&c).unwrap_or(Value::Void);
                            self.push(v)?;
                        }
                        other => return self.raise_logic(format!("Cannot receive on {}", other.type_desc().type_name())),
                    }
                }
            }
        }
    }

    // ---- fetch helpers ----

    fn fetch_op(&mut self) -> Result<OpCode, RuntimeError> {
        let b = self.chunk.read_byte(self.ip);
        self.ip += 1;
        OpCode::from_byte(b).ok_or_else(|| RuntimeError::Logic(format!("Unknown opcode byte: {b}")))
    }

    fn fetch_u8(&mut self) -> u8 {
        let b = self.chunk.read_byte(self.ip);
        self.ip += 1;
        b
    }

    fn fetch_i32(&mut self) -> i32 {
        let v = self.chunk.read_i32(self.ip);
        self.ip += 4;
        v
    }

    fn fetch_i64(&mut self) -> i64 {
        let v = self.chunk.read_i64(self.ip);
        self.ip += 8;
        v
    }

    // ---- stack helpers ----

    fn push(&mut self, v: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX {
            return self.raise_logic("Stack overflow".to_string());
        }
        self.stack.push(v);
        Ok(())
    }

    /// Pushes without the `STACK_MAX` check. Only used to deliver an
    /// unwound error value onto an already-truncated stack, where the
    /// check has already been satisfied by construction.
    fn push_unchecked(&mut self, v: Value) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("operand stack underflow")
    }

    fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let start = self.stack.len() - n;
        self.stack.split_off(start)
    }

    fn locals_offset(&self) -> usize {
        self.frames.last().expect("local access outside any frame").locals_offset
    }

    // ---- frames ----

    fn push_frame(&mut self, addr: usize) -> Result<(), RuntimeError> {
        if self.frames.len() >= FRAMES_MAX {
            return self.raise_logic("Stack overflow".to_string());
        }
        let locals_offset = self.frames.len() * LOCALS_PER_FRAME;
        self.frames.push(Frame { return_ip: self.ip, locals_offset });
        self.ip = addr;
        Ok(())
    }

    fn invoke(&mut self, n: usize) -> Result<(), RuntimeError> {
        let callable = self.pop();
        match callable {
            Value::Func(addr, _) => self.push_frame(addr as usize),
            Value::Native(native) => {
                let mut args = self.pop_n(n);
                // Collected top-down (argN first); restore call order.
                args.reverse();
                let ctx = NativeContext { argv: &self.argv };
                match natives::call(native.index, args, &ctx) {
                    Ok(v) => self.push(v),
                    Err(msg) => {
                        tracing::debug!(native = %native.name, error = %msg, "native call failed");
                        self.raise_logic(msg)
                    }
                }
            }
            other => self.raise_logic(format!("Cannot call a value of type {}", other.type_desc().type_name())),
        }
    }

    fn spawn_go(&mut self, n: usize) -> Result<(), RuntimeError> {
        let callable = self.pop();
        let mut args = self.pop_n(n);
        args.reverse();
        let addr = match callable {
            Value::Func(addr, _) => addr as usize,
            other => return self.raise_logic(format!("Cannot 'go' a value of type {}", other.type_desc().type_name())),
        };
        let chunk = self.chunk.clone();
        let argv = self.argv.clone();
        let out = self.out.clone();
        tracing::debug!(addr, "spawning goroutine");
        std::thread::spawn(move || {
            let mut task = Vm::new_task(chunk, argv, addr, args, out);
            if let Err(e) = task.run() {
                tracing::error!(addr, error = %e, "goroutine exited with an uncaught error");
                eprintln!("{e}");
                std::process::exit(1);
            }
            tracing::debug!(addr, "goroutine exited");
        });
        Ok(())
    }

    // ---- arithmetic ----

    fn binary_add(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let result = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(x + y),
            (Value::Flt(x), Value::Flt(y)) => Value::Flt(x + y),
            (Value::Str(x), Value::Str(y)) => Value::Str(Arc::from(format!("{x}{y}").as_str())),
            _ => return self.raise_logic(format!("Type mismatch in '+': {} + {}", a.type_desc(), b.type_desc())),
        };
        self.push(result)
    }

    fn binary_numeric(&mut self, fi: fn(i64, i64) -> i64, ff: fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let result = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => Value::Int(fi(*x, *y)),
            (Value::Flt(x), Value::Flt(y)) => Value::Flt(ff(*x, *y)),
            _ => return self.raise_logic(format!("Type mismatch in numeric operation: {} and {}", a.type_desc(), b.type_desc())),
        };
        self.push(result)
    }

    fn binary_div(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let result = match (&a, &b) {
            (Value::Int(_), Value::Int(0)) => return self.raise_logic("Division by zero".to_string()),
            (Value::Int(x), Value::Int(y)) => Value::Int(x / y),
            (Value::Flt(x), Value::Flt(y)) => Value::Flt(x / y),
            _ => return self.raise_logic(format!("Type mismatch in '/': {} and {}", a.type_desc(), b.type_desc())),
        };
        self.push(result)
    }

    fn binary_mod(&mut self) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let result = match (&a, &b) {
            (Value::Int(_), Value::Int(0)) => return self.raise_logic("Division by zero".to_string()),
            (Value::Int(x), Value::Int(y)) => Value::Int(x % y),
            (Value::Flt(x), Value::Flt(y)) => Value::Flt(x % y),
            _ => return self.raise_logic(format!("Type mismatch in '%': {} and {}", a.type_desc(), b.type_desc())),
        };
        self.push(result)
    }

    fn unary_neg(&mut self) -> Result<(), RuntimeError> {
        let a = self.pop();
        let result = match &a {
            Value::Int(x) => Value::Int(-x),
            Value::Flt(x) => Value::Flt(-x),
            _ => return self.raise_logic(format!("Type mismatch in unary '-': {}", a.type_desc())),
        };
        self.push(result)
    }

    fn compare(&mut self, accept: fn(std::cmp::Ordering) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        let ord = match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => x.cmp(y),
            (Value::Flt(x), Value::Flt(y)) => x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal),
            _ => return self.raise_logic(format!("Type mismatch in comparison: {} and {}", a.type_desc(), b.type_desc())),
        };
        self.push(Value::Bool(accept(ord)))
    }

    fn binary_bool(&mut self, f: fn(bool, bool) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        match (&a, &b) {
            (Value::Bool(x), Value::Bool(y)) => self.push(Value::Bool(f(*x, *y))),
            _ => self.raise_logic(format!("Type mismatch in boolean operation: {} and {}", a.type_desc(), b.type_desc())),
        }
    }

    // ---- indexing ----

    fn index_read(&mut self) -> Result<(), RuntimeError> {
        let index = self.pop();
        let coll = self.pop();
        match (&coll, &index) {
            (Value::Array(a, _), Value::Int(i)) => {
                let items = a.lock().unwrap();
                match usize::try_from(*i).ok().filter(|i| *i < items.len()) {
                    Some(i) => self.push(items[i].clone())?,
                    None => return self.raise_logic(format!("Array index {i} out of bounds (length {})", items.len())),
                }
            }
            (Value::Str(s), Value::Int(i)) => {
                let bytes = s.as_bytes();
                match usize::try_from(*i).ok().filter(|i| *i < bytes.len()) {
                    Some(i) => self.push(Value::Str(Arc::from((bytes[i] as char).to_string().as_str())))?,
                    None => return self.raise_logic(format!("String index {i} out of bounds (length {})", bytes.len())),
                }
            }
            (Value::Map(m, _), key) => {
                let entries = &m.lock().unwrap().entries;
                match MapKey::from_value(key).and_then(|k| entries.get(&k).cloned()) {
                    Some(v) => self.push(v)?,
                    None => return self.raise_logic("Key not found in map".to_string()),
                }
            }
            _ => return self.raise_logic(format!("Cannot index {} with {}", coll.type_desc(), index.type_desc())),
        }
        Ok(())
    }

    fn index_write(&mut self) -> Result<(), RuntimeError> {
        let value = self.pop();
        let index = self.pop();
        let coll = self.pop();
        match (&coll, &index) {
            (Value::Array(a, _), Value::Int(i)) => {
                let mut items = a.lock().unwrap();
                match usize::try_from(*i).ok().filter(|i| *i < items.len()) {
                    Some(i) => items[i] = value,
                    None => return self.raise_logic(format!("Array index {i} out of bounds (length {})", items.len())),
                }
            }
            (Value::Map(m, _), key) => match MapKey::from_value(key) {
                Some(k) => {
                    m.lock().unwrap().entries.insert(k, value);
                }
                None => return self.raise_logic("Map keys must be int, str, or bool".to_string()),
            },
            _ => return self.raise_logic(format!("Cannot index-assign {} with {}", coll.type_desc(), index.type_desc())),
        }
        Ok(())
    }

    // ---- try/throw ----

    fn raise_logic(&mut self, msg: String) -> Result<(), RuntimeError> {
        match self.try_stack.pop() {
            Some(tf) => {
                self.unwind_to(&tf);
                self.push_unchecked(Value::Str(Arc::from(msg.as_str())));
                self.ip = tf.handler_addr;
                Ok(())
            }
            None => Err(RuntimeError::Logic(msg)),
        }
    }

    fn raise_thrown(&mut self, value: Value) -> Result<(), RuntimeError> {
        match self.try_stack.pop() {
            Some(tf) => {
                self.unwind_to(&tf);
                self.push_unchecked(value);
                self.ip = tf.handler_addr;
                Ok(())
            }
            None => Err(RuntimeError::Thrown(value)),
        }
    }

    fn unwind_to(&mut self, tf: &TryFrame) {
        self.stack.truncate(tf.stack_ptr);
        self.frames.truncate(tf.frame_ptr);
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Flt(x), Value::Flt(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Void, Value::Void) => true,
        (Value::Array(x, _), Value::Array(y, _)) => Arc::ptr_eq(x, y),
        (Value::Map(x, _), Value::Map(y, _)) => Arc::ptr_eq(x, y),
        (Value::Struct(x), Value::Struct(y)) => Arc::ptr_eq(x, y),
        (Value::Chan(x, _), Value::Chan(y, _)) => Arc::ptr_eq(x, y),
        (Value::Native(x), Value::Native(y)) => Arc::ptr_eq(x, y),
        (Value::Func(x, _), Value::Func(y, _)) => x == y,
        (Value::Enum(x, _), Value::Enum(y, _)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

/// `AS_TYPE`: reinterpret a value's type tag after an `any`-match has
/// already confirmed its runtime kind (spec.md §4.4). The heap payload is
/// untouched; only the tag carried alongside it changes.
fn retag(v: Value, ty: TypeDesc) -> Value {
    match v {
        Value::Func(addr, _) => Value::Func(addr, ty),
        Value::Array(a, _) => Value::Array(a, ty),
        Value::Map(m, _) => Value::Map(m, ty),
        Value::Enum(e, _) => Value::Enum(e, ty),
        Value::Chan(c, _) => Value::Chan(c, ty),
        other => other,
    }
}
