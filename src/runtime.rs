//! Runtime module responsible for creating a new execution environment
//! and running programs.
//!
//! Each in-flight method invocation is a `Frame` that owns an operand
//! stack, a local variable array and an instruction cursor. The
//! `Runtime` drives frames through an iterative trampoline: a frame
//! yields a call request or a return, and the runtime pushes or pops the
//! explicit call stack, so interpreted call depth never grows the native
//! stack.
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::rc::Rc;

use tracing::{info, trace};

use crate::bytecode::OPCode;
use crate::descriptor::{argument_kinds, DescriptorError};
use crate::jvm::{CPInfo, JVMClassFile, MethodInfo, OBJECT_CLASS};
use crate::loader::ClassRegistry;
use crate::reader::ParseError;

/// Descriptor of the conventional entry point.
pub const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

const PRINT_STREAM_CLASS: &str = "java/io/PrintStream";
const STRING_CLASS: &str = "java/lang/String";
const CONSTRUCTOR_NAME: &str = "<init>";

/// Dynamically tagged operand value. No floating point and no 64-bit
/// arithmetic; `Ref` is an index into the heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Str(String),
    Null,
    Ref(usize),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(text) => write!(f, "{text}"),
            Self::Null => write!(f, "null"),
            Self::Ref(reference) => write!(f, "object@{reference}"),
        }
    }
}

/// Allocated instance: a mutable field table indexed by name. Identity
/// is the heap index of the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub class_name: String,
    fields: HashMap<String, Value>,
}

impl Object {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Update a declared field in place. Returns false when the class
    /// never declared `name`.
    pub fn set_field(&mut self, name: &str, value: Value) -> bool {
        match self.fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Append-only object heap. References are indices; there is no
/// compaction and no reclamation.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Object>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record with every field set to null, yielding the new
    /// reference.
    pub fn allocate(&mut self, class_name: String, field_names: Vec<String>) -> usize {
        let fields = field_names
            .into_iter()
            .map(|name| (name, Value::Null))
            .collect();
        self.objects.push(Object { class_name, fields });
        self.objects.len() - 1
    }

    pub fn get(&self, reference: usize) -> Option<&Object> {
        self.objects.get(reference)
    }

    pub fn get_mut(&mut self, reference: usize) -> Option<&mut Object> {
        self.objects.get_mut(reference)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// What a frame yields back to the trampoline.
#[derive(Debug)]
pub enum FrameAction {
    /// Push this successor frame and run it.
    Call(Frame),
    /// Pop this frame and hand the value to the caller's operand stack.
    Return(Value),
    /// Pop this frame with no value transfer.
    ReturnVoid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    UnsupportedOpcode(u8),
    Pool(ParseError),
    Descriptor(DescriptorError),
    Resolution(String),
    TypeMismatch { expected: &'static str, found: String },
    StackUnderflow,
    TruncatedCode,
    BranchOutOfRange(i64),
    MalformedSwitch,
    InvalidLocal(usize),
    MissingCode,
    UnknownField(String),
    BadObjectRef(usize),
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnsupportedOpcode(byte) => write!(f, "unsupported opcode {byte:#04x}"),
            Self::Pool(err) => write!(f, "constant pool error: {err}"),
            Self::Descriptor(err) => write!(f, "{err}"),
            Self::Resolution(message) => write!(f, "resolution failed: {message}"),
            Self::TypeMismatch { expected, found } => {
                write!(f, "expected {expected} on the operand stack, found {found}")
            }
            Self::StackUnderflow => write!(f, "operand stack underflow"),
            Self::TruncatedCode => write!(f, "instruction stream ended mid-instruction"),
            Self::BranchOutOfRange(target) => {
                write!(f, "branch target {target} outside the method body")
            }
            Self::MalformedSwitch => write!(f, "tableswitch bounds are inverted"),
            Self::InvalidLocal(slot) => write!(f, "local variable slot {slot} out of range"),
            Self::MissingCode => write!(f, "method has no Code attribute"),
            Self::UnknownField(name) => write!(f, "object has no field named {name}"),
            Self::BadObjectRef(reference) => {
                write!(f, "heap reference {reference} does not exist")
            }
        }
    }
}

/// Fatal execution failure, carrying enough context to diagnose which
/// instruction gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub class: String,
    pub method: String,
    pub pc: usize,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}.{} at offset {}: {}",
            self.class, self.method, self.pc, self.kind
        )
    }
}

impl Error for RuntimeError {}

/// One method activation: operand stack, locals and an instruction
/// cursor into the method's code. Created on call, destroyed on return,
/// never shared.
#[derive(Debug)]
pub struct Frame {
    class: Rc<JVMClassFile>,
    class_name: String,
    method_name: String,
    code: Vec<u8>,
    pc: usize,
    // Start of the instruction being executed; branch offsets are
    // relative to this, not to the cursor after operand reads.
    insn_start: usize,
    stack: Vec<Value>,
    locals: Vec<Value>,
}

impl Frame {
    /// Build the activation record for `method`. `args` land in the low
    /// local slots (receiver first for instance methods); remaining
    /// slots up to max_locals are zero-initialized.
    pub fn new(
        class: Rc<JVMClassFile>,
        method: &MethodInfo,
        args: Vec<Value>,
    ) -> Result<Frame, RuntimeError> {
        let class_name = class.this_class_name().unwrap_or("<unknown>").to_owned();
        let method_name = class.method_name(method).unwrap_or("<unknown>").to_owned();
        let Some((_max_stack, max_locals, code)) = method.code() else {
            // Abstract and native methods have no body to execute.
            return Err(RuntimeError {
                kind: RuntimeErrorKind::MissingCode,
                class: class_name,
                method: method_name,
                pc: 0,
            });
        };
        let code = code.to_vec();
        let mut locals = args;
        if locals.len() < max_locals as usize {
            locals.resize(max_locals as usize, Value::Int(0));
        }
        Ok(Frame {
            class,
            class_name,
            method_name,
            code,
            pc: 0,
            insn_start: 0,
            stack: Vec::new(),
            locals,
        })
    }

    fn fail(&self, kind: RuntimeErrorKind) -> RuntimeError {
        RuntimeError {
            kind,
            class: self.class_name.clone(),
            method: self.method_name.clone(),
            pc: self.insn_start,
        }
    }

    fn pool<T>(&self, result: Result<T, ParseError>) -> Result<T, RuntimeError> {
        result.map_err(|err| self.fail(RuntimeErrorKind::Pool(err)))
    }

    fn fetch_u8(&mut self) -> Result<u8, RuntimeError> {
        let byte = *self
            .code
            .get(self.pc)
            .ok_or_else(|| self.fail(RuntimeErrorKind::TruncatedCode))?;
        self.pc += 1;
        Ok(byte)
    }

    fn fetch_i8(&mut self) -> Result<i8, RuntimeError> {
        Ok(self.fetch_u8()? as i8)
    }

    fn fetch_u16(&mut self) -> Result<u16, RuntimeError> {
        let hi = self.fetch_u8()?;
        let lo = self.fetch_u8()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn fetch_i16(&mut self) -> Result<i16, RuntimeError> {
        Ok(self.fetch_u16()? as i16)
    }

    fn fetch_i32(&mut self) -> Result<i32, RuntimeError> {
        let bytes = [
            self.fetch_u8()?,
            self.fetch_u8()?,
            self.fetch_u8()?,
            self.fetch_u8()?,
        ];
        Ok(i32::from_be_bytes(bytes))
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| self.fail(RuntimeErrorKind::StackUnderflow))
    }

    fn pop_int(&mut self) -> Result<i32, RuntimeError> {
        match self.pop()? {
            Value::Int(value) => Ok(value),
            other => Err(self.fail(RuntimeErrorKind::TypeMismatch {
                expected: "integer",
                found: format!("{other:?}"),
            })),
        }
    }

    fn pop_str(&mut self) -> Result<String, RuntimeError> {
        match self.pop()? {
            Value::Str(text) => Ok(text),
            other => Err(self.fail(RuntimeErrorKind::TypeMismatch {
                expected: "string",
                found: format!("{other:?}"),
            })),
        }
    }

    fn pop_ref(&mut self) -> Result<usize, RuntimeError> {
        match self.pop()? {
            Value::Ref(reference) => Ok(reference),
            other => Err(self.fail(RuntimeErrorKind::TypeMismatch {
                expected: "object reference",
                found: format!("{other:?}"),
            })),
        }
    }

    fn load_local(&mut self, slot: usize) -> Result<(), RuntimeError> {
        let value = self
            .locals
            .get(slot)
            .cloned()
            .ok_or_else(|| self.fail(RuntimeErrorKind::InvalidLocal(slot)))?;
        self.stack.push(value);
        Ok(())
    }

    fn store_local(&mut self, slot: usize) -> Result<(), RuntimeError> {
        let value = self.pop()?;
        match self.locals.get_mut(slot) {
            Some(local) => {
                *local = value;
                Ok(())
            }
            None => Err(self.fail(RuntimeErrorKind::InvalidLocal(slot))),
        }
    }

    /// Set the cursor to `offset` bytes past the current instruction's
    /// first byte.
    fn branch_to(&mut self, offset: i64) -> Result<(), RuntimeError> {
        let target = self.insn_start as i64 + offset;
        if target < 0 || target as usize >= self.code.len() {
            return Err(self.fail(RuntimeErrorKind::BranchOutOfRange(target)));
        }
        self.pc = target as usize;
        Ok(())
    }

    /// Execute opcodes until this frame requests a call or returns.
    pub fn run(
        &mut self,
        registry: &ClassRegistry,
        heap: &mut Heap,
        printed: &mut Vec<String>,
    ) -> Result<FrameAction, RuntimeError> {
        loop {
            self.insn_start = self.pc;
            let byte = self.fetch_u8()?;
            let op = OPCode::try_from(byte)
                .map_err(|byte| self.fail(RuntimeErrorKind::UnsupportedOpcode(byte)))?;
            trace!(
                method = %self.method_name,
                pc = self.insn_start,
                op = ?op,
                stack_depth = self.stack.len(),
            );
            match op {
                OPCode::AConstNull => self.stack.push(Value::Null),
                OPCode::IconstM1 => self.stack.push(Value::Int(-1)),
                OPCode::Iconst0 => self.stack.push(Value::Int(0)),
                OPCode::Iconst1 => self.stack.push(Value::Int(1)),
                OPCode::Iconst2 => self.stack.push(Value::Int(2)),
                OPCode::Iconst3 => self.stack.push(Value::Int(3)),
                OPCode::Iconst4 => self.stack.push(Value::Int(4)),
                OPCode::Iconst5 => self.stack.push(Value::Int(5)),
                OPCode::BiPush => {
                    let value = self.fetch_i8()?;
                    self.stack.push(Value::Int(value as i32));
                }
                OPCode::Ldc => self.load_constant()?,
                OPCode::ILoad | OPCode::ALoad => {
                    let slot = self.fetch_u8()? as usize;
                    self.load_local(slot)?;
                }
                OPCode::ILoad0 | OPCode::ALoad0 => self.load_local(0)?,
                OPCode::ILoad1 | OPCode::ALoad1 => self.load_local(1)?,
                OPCode::ILoad2 | OPCode::ALoad2 => self.load_local(2)?,
                OPCode::ILoad3 | OPCode::ALoad3 => self.load_local(3)?,
                OPCode::IStore | OPCode::AStore => {
                    let slot = self.fetch_u8()? as usize;
                    self.store_local(slot)?;
                }
                OPCode::IStore0 | OPCode::AStore0 => self.store_local(0)?,
                OPCode::IStore1 | OPCode::AStore1 => self.store_local(1)?,
                OPCode::IStore2 | OPCode::AStore2 => self.store_local(2)?,
                OPCode::IStore3 | OPCode::AStore3 => self.store_local(3)?,
                OPCode::Dup => {
                    let value = self.pop()?;
                    self.stack.push(value.clone());
                    self.stack.push(value);
                }
                OPCode::IAdd => {
                    let right = self.pop_int()?;
                    let left = self.pop_int()?;
                    self.stack.push(Value::Int(left.wrapping_add(right)));
                }
                OPCode::ISub => {
                    let right = self.pop_int()?;
                    let left = self.pop_int()?;
                    self.stack.push(Value::Int(left.wrapping_sub(right)));
                }
                OPCode::IAnd => {
                    let right = self.pop_int()?;
                    let left = self.pop_int()?;
                    self.stack.push(Value::Int(left & right));
                }
                OPCode::IfEq => {
                    let offset = self.fetch_i16()?;
                    if self.pop_int()? == 0 {
                        self.branch_to(offset as i64)?;
                    }
                }
                OPCode::IfNonNull => {
                    let offset = self.fetch_i16()?;
                    if self.pop()? != Value::Null {
                        self.branch_to(offset as i64)?;
                    }
                }
                OPCode::Goto => {
                    let offset = self.fetch_i16()?;
                    self.branch_to(offset as i64)?;
                }
                OPCode::TableSwitch => self.table_switch()?,
                OPCode::IReturn | OPCode::AReturn => {
                    return Ok(FrameAction::Return(self.pop()?));
                }
                OPCode::Return => return Ok(FrameAction::ReturnVoid),
                OPCode::GetStatic => self.get_static()?,
                OPCode::GetField => self.get_field(heap)?,
                OPCode::PutField => self.put_field(heap)?,
                OPCode::New => self.new_instance(registry, heap)?,
                // Validation placeholder; the stack is left untouched.
                OPCode::CheckCast => {
                    self.fetch_u16()?;
                }
                OPCode::InvokeVirtual | OPCode::InvokeSpecial | OPCode::InvokeStatic => {
                    if let Some(action) = self.invoke(op, registry, printed)? {
                        return Ok(action);
                    }
                }
            }
        }
    }

    fn load_constant(&mut self) -> Result<(), RuntimeError> {
        let index = self.fetch_u8()? as u16;
        let entry = self.pool(self.class.constant(index))?.clone();
        match entry {
            CPInfo::ConstantString { string_index } => {
                let text = self.pool(self.class.utf8(string_index))?.to_owned();
                self.stack.push(Value::Str(text));
            }
            CPInfo::ConstantInteger { value } => {
                self.stack.push(Value::Int(value));
            }
            other => {
                return Err(self.fail(RuntimeErrorKind::TypeMismatch {
                    expected: "String or Integer constant",
                    found: format!("{other:?}"),
                }))
            }
        }
        Ok(())
    }

    fn table_switch(&mut self) -> Result<(), RuntimeError> {
        // Padding aligns the 4-byte fields to the code origin, not to
        // the file.
        let padding = (4 - (self.pc % 4)) % 4;
        self.pc += padding;
        let default = self.fetch_i32()?;
        let low = self.fetch_i32()?;
        let high = self.fetch_i32()?;
        if low > high {
            return Err(self.fail(RuntimeErrorKind::MalformedSwitch));
        }
        let index = self.pop_int()?;
        if index < low || index > high {
            return self.branch_to(default as i64);
        }
        self.pc += (index - low) as usize * 4;
        let offset = self.fetch_i32()?;
        self.branch_to(offset as i64)
    }

    fn get_static(&mut self) -> Result<(), RuntimeError> {
        let index = self.fetch_u16()?;
        // The handle only exists so invokevirtual can recognize the
        // standard output stream as a receiver.
        let handle = {
            let (class, field) = self.pool(self.class.field_ref(index))?;
            format!("{class}.{field}")
        };
        self.stack.push(Value::Str(handle));
        Ok(())
    }

    fn get_field(&mut self, heap: &Heap) -> Result<(), RuntimeError> {
        let index = self.fetch_u16()?;
        let field = {
            let (_class, field) = self.pool(self.class.field_ref(index))?;
            field.to_owned()
        };
        let reference = self.pop_ref()?;
        let object = heap
            .get(reference)
            .ok_or_else(|| self.fail(RuntimeErrorKind::BadObjectRef(reference)))?;
        let value = object
            .field(&field)
            .cloned()
            .ok_or_else(|| self.fail(RuntimeErrorKind::UnknownField(field)))?;
        self.stack.push(value);
        Ok(())
    }

    fn put_field(&mut self, heap: &mut Heap) -> Result<(), RuntimeError> {
        let index = self.fetch_u16()?;
        let field = {
            let (_class, field) = self.pool(self.class.field_ref(index))?;
            field.to_owned()
        };
        let value = self.pop()?;
        let reference = self.pop_ref()?;
        let object = heap
            .get_mut(reference)
            .ok_or_else(|| self.fail(RuntimeErrorKind::BadObjectRef(reference)))?;
        if !object.set_field(&field, value) {
            return Err(self.fail(RuntimeErrorKind::UnknownField(field)));
        }
        Ok(())
    }

    fn new_instance(
        &mut self,
        registry: &ClassRegistry,
        heap: &mut Heap,
    ) -> Result<(), RuntimeError> {
        let index = self.fetch_u16()?;
        let class_name = self.pool(self.class.class_name(index))?.to_owned();
        let class_file = registry.lookup(&class_name).ok_or_else(|| {
            self.fail(RuntimeErrorKind::Resolution(format!(
                "unknown class {class_name}"
            )))
        })?;
        let field_names = self.pool(class_file.field_names())?;
        let reference = heap.allocate(class_name, field_names);
        self.stack.push(Value::Ref(reference));
        Ok(())
    }

    /// Dispatch an invoke opcode. Built-in platform operations execute
    /// inline; anything else yields a call request to the trampoline.
    fn invoke(
        &mut self,
        op: OPCode,
        registry: &ClassRegistry,
        printed: &mut Vec<String>,
    ) -> Result<Option<FrameAction>, RuntimeError> {
        let index = self.fetch_u16()?;
        let (class_name, method_name, descriptor) = {
            let (class, method, descriptor) = self.pool(self.class.method_ref(index))?;
            (class.to_owned(), method.to_owned(), descriptor.to_owned())
        };
        let kinds = argument_kinds(&descriptor)
            .map_err(|err| self.fail(RuntimeErrorKind::Descriptor(err)))?;
        let has_receiver = matches!(op, OPCode::InvokeVirtual | OPCode::InvokeSpecial);
        let total = kinds.len() + usize::from(has_receiver);

        // Pop in reverse so the first-declared argument lands in the
        // lowest slot, receiver (if any) in slot 0.
        let mut args = Vec::with_capacity(total);
        for _ in 0..total {
            args.push(self.pop()?);
        }
        args.reverse();

        if class_name == PRINT_STREAM_CLASS
            && (method_name == "println" || method_name == "print")
        {
            let line = match args.get(1) {
                Some(value) => value.to_string(),
                None => String::new(),
            };
            println!("{line}");
            printed.push(line);
            return Ok(None);
        }
        if class_name == STRING_CLASS && method_name == "concat" {
            // args are [receiver, suffix], both strings.
            self.stack.extend(args);
            let suffix = self.pop_str()?;
            let mut base = self.pop_str()?;
            base.push_str(&suffix);
            self.stack.push(Value::Str(base));
            return Ok(None);
        }
        if class_name == OBJECT_CLASS && method_name == CONSTRUCTOR_NAME {
            // The root constructor does nothing; the receiver is
            // already consumed.
            return Ok(None);
        }

        let matches = registry
            .resolve_method(&class_name, &method_name, &descriptor)
            .map_err(|err| self.fail(RuntimeErrorKind::Resolution(err.to_string())))?;
        let Some((target_class, method)) = matches.into_iter().next() else {
            return Err(self.fail(RuntimeErrorKind::Resolution(format!(
                "no method {class_name}.{method_name}{descriptor}"
            ))));
        };
        let frame = Frame::new(target_class, &method, args)?;
        Ok(Some(FrameAction::Call(frame)))
    }
}

/// Execution environment: the class registry, the object heap and an
/// explicit call stack of frames.
pub struct Runtime {
    registry: ClassRegistry,
    heap: Heap,
    frames: Vec<Frame>,
    printed: Vec<String>,
}

impl Runtime {
    pub fn new(registry: ClassRegistry) -> Self {
        Self {
            registry,
            heap: Heap::new(),
            frames: Vec::new(),
            printed: Vec::new(),
        }
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Every line emitted by the print built-in, in order.
    pub fn printed(&self) -> &[String] {
        &self.printed
    }

    /// Locate `main` in `main_class` and interpret until the call stack
    /// empties.
    pub fn run_main(&mut self, main_class: &str) -> Result<(), RuntimeError> {
        let startup_error = |kind| RuntimeError {
            kind,
            class: main_class.to_owned(),
            method: String::from("main"),
            pc: 0,
        };
        let matches = self
            .registry
            .resolve_method(main_class, "main", MAIN_DESCRIPTOR)
            .map_err(|err| startup_error(RuntimeErrorKind::Resolution(err.to_string())))?;
        let Some((class, method)) = matches.into_iter().next() else {
            return Err(startup_error(RuntimeErrorKind::Resolution(String::from(
                "main method not found",
            ))));
        };
        // The String[] argument is not modeled; main sees null.
        let frame = Frame::new(class, &method, vec![Value::Null])?;
        info!(class = main_class, "starting interpreter");
        self.frames.push(frame);
        self.run()
    }

    fn run(&mut self) -> Result<(), RuntimeError> {
        while let Some(frame) = self.frames.last_mut() {
            let action = frame.run(&self.registry, &mut self.heap, &mut self.printed)?;
            match action {
                FrameAction::Call(callee) => self.frames.push(callee),
                FrameAction::Return(value) => {
                    self.frames.pop();
                    if let Some(caller) = self.frames.last_mut() {
                        caller.stack.push(value);
                    }
                }
                FrameAction::ReturnVoid => {
                    self.frames.pop();
                }
            }
        }
        info!("interpreter finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    /// Class file shell whose pool is the given entries followed by
    /// this/super bookkeeping.
    fn class_with_pool(mut pool: Vec<CPInfo>) -> JVMClassFile {
        let base = pool.len() as u16;
        pool.push(CPInfo::ConstantUtf8 {
            bytes: String::from("Test"),
        });
        pool.push(CPInfo::ConstantClass {
            name_index: base + 1,
        });
        pool.push(CPInfo::ConstantUtf8 {
            bytes: String::from("java/lang/Object"),
        });
        pool.push(CPInfo::ConstantClass {
            name_index: base + 3,
        });
        JVMClassFile {
            magic: 0xcafe_babe,
            minor_version: 0,
            major_version: 52,
            constant_pool: pool,
            access_flags: 0x0021,
            this_class: base + 2,
            super_class: base + 4,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: Map::new(),
        }
    }

    fn frame(code: Vec<u8>, locals: Vec<Value>, pool: Vec<CPInfo>) -> Frame {
        Frame {
            class: Rc::new(class_with_pool(pool)),
            class_name: String::from("Test"),
            method_name: String::from("test"),
            code,
            pc: 0,
            insn_start: 0,
            stack: Vec::new(),
            locals,
        }
    }

    fn run_frame(
        code: Vec<u8>,
        locals: Vec<Value>,
        pool: Vec<CPInfo>,
    ) -> Result<FrameAction, RuntimeError> {
        let registry = ClassRegistry::new();
        let mut heap = Heap::new();
        let mut printed = Vec::new();
        frame(code, locals, pool).run(&registry, &mut heap, &mut printed)
    }

    fn returns(code: Vec<u8>, locals: Vec<Value>) -> Value {
        match run_frame(code, locals, vec![]).unwrap() {
            FrameAction::Return(value) => value,
            other => panic!("expected a returned value, got {other:?}"),
        }
    }

    #[test]
    fn branch_offset_is_relative_to_the_branch_opcode() {
        // iconst_0; ifeq +5 lands on the iconst_2 at offset 6, skipping
        // the two-byte operand and the not-taken arm.
        let taken = vec![0x03, 0x99, 0x00, 0x05, 0x04, 0xac, 0x05, 0xac];
        assert_eq!(returns(taken, vec![]), Value::Int(2));

        let not_taken = vec![0x04, 0x99, 0x00, 0x05, 0x05, 0xac, 0x06, 0xac];
        assert_eq!(returns(not_taken, vec![]), Value::Int(2));
    }

    #[test]
    fn goto_always_branches() {
        let code = vec![0xa7, 0x00, 0x05, 0x04, 0xac, 0x05, 0xac];
        assert_eq!(returns(code, vec![]), Value::Int(2));
    }

    #[test]
    fn ifnonnull_checks_the_popped_value() {
        let code = vec![0x2a, 0xc7, 0x00, 0x05, 0x04, 0xac, 0x05, 0xac];
        assert_eq!(
            returns(code.clone(), vec![Value::Str(String::from("x"))]),
            Value::Int(2)
        );
        assert_eq!(returns(code, vec![Value::Null]), Value::Int(1));
    }

    /// The known-layout fixture: tableswitch at offset 1, so two pad
    /// bytes; default 0x1f, low 0, high 1, offsets {0x17, 0x1b}, all
    /// relative to offset 1.
    fn tableswitch_code() -> Vec<u8> {
        let mut code = vec![
            0x1a, 0xaa, 0x00, 0x00, // iload_0; tableswitch; 2 pad bytes
            0x00, 0x00, 0x00, 0x1f, // default
            0x00, 0x00, 0x00, 0x00, // low
            0x00, 0x00, 0x00, 0x01, // high
            0x00, 0x00, 0x00, 0x17, // case 0 -> offset 24
            0x00, 0x00, 0x00, 0x1b, // case 1 -> offset 28
        ];
        code.extend_from_slice(&[0x04, 0xac, 0x00, 0x00]); // 24: iconst_1; ireturn
        code.extend_from_slice(&[0x05, 0xac, 0x00, 0x00]); // 28: iconst_2; ireturn
        code.extend_from_slice(&[0x10, 0x2a, 0xac]); // 32: bipush 42; ireturn
        code
    }

    #[test]
    fn tableswitch_pads_to_alignment_and_selects_cases() {
        assert_eq!(
            returns(tableswitch_code(), vec![Value::Int(0)]),
            Value::Int(1)
        );
        assert_eq!(
            returns(tableswitch_code(), vec![Value::Int(1)]),
            Value::Int(2)
        );
    }

    #[test]
    fn tableswitch_out_of_range_takes_the_default() {
        assert_eq!(
            returns(tableswitch_code(), vec![Value::Int(7)]),
            Value::Int(42)
        );
        assert_eq!(
            returns(tableswitch_code(), vec![Value::Int(-1)]),
            Value::Int(42)
        );
    }

    #[test]
    fn bipush_sign_extends() {
        assert_eq!(returns(vec![0x10, 0xfd, 0xac], vec![]), Value::Int(-3));
    }

    #[test]
    fn arithmetic_left_operand_is_popped_second() {
        // iconst_3; iconst_1; isub computes 3 - 1.
        assert_eq!(returns(vec![0x06, 0x04, 0x64, 0xac], vec![]), Value::Int(2));
        assert_eq!(returns(vec![0x06, 0x06, 0x7e, 0xac], vec![]), Value::Int(3));
        assert_eq!(returns(vec![0x06, 0x04, 0x60, 0xac], vec![]), Value::Int(4));
    }

    #[test]
    fn wide_local_slots_are_supported() {
        let code = vec![0x10, 0x07, 0x36, 0x05, 0x15, 0x05, 0xac];
        let locals = vec![Value::Int(0); 6];
        assert_eq!(returns(code, locals), Value::Int(7));
    }

    #[test]
    fn dup_duplicates_the_top_of_stack() {
        assert_eq!(returns(vec![0x04, 0x59, 0x60, 0xac], vec![]), Value::Int(2));
    }

    #[test]
    fn ldc_resolves_strings_and_integers() {
        let pool = vec![
            CPInfo::ConstantUtf8 {
                bytes: String::from("hi"),
            },
            CPInfo::ConstantString { string_index: 1 },
            CPInfo::ConstantInteger { value: 9 },
        ];
        let string_code = vec![0x12, 0x02, 0xb0];
        match run_frame(string_code, vec![], pool.clone()).unwrap() {
            FrameAction::Return(value) => {
                assert_eq!(value, Value::Str(String::from("hi")));
            }
            other => panic!("unexpected action {other:?}"),
        }
        let int_code = vec![0x12, 0x03, 0xac];
        match run_frame(int_code, vec![], pool).unwrap() {
            FrameAction::Return(value) => assert_eq!(value, Value::Int(9)),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn getstatic_pushes_a_field_handle() {
        let pool = vec![
            CPInfo::ConstantUtf8 {
                bytes: String::from("java/lang/System"),
            },
            CPInfo::ConstantClass { name_index: 1 },
            CPInfo::ConstantUtf8 {
                bytes: String::from("out"),
            },
            CPInfo::ConstantUtf8 {
                bytes: String::from("Ljava/io/PrintStream;"),
            },
            CPInfo::ConstantNameAndType {
                name_index: 3,
                descriptor_index: 4,
            },
            CPInfo::ConstantFieldRef {
                class_index: 2,
                name_and_type_index: 5,
            },
        ];
        let code = vec![0xb2, 0x00, 0x06, 0xb0];
        match run_frame(code, vec![], pool).unwrap() {
            FrameAction::Return(value) => {
                assert_eq!(value, Value::Str(String::from("java/lang/System.out")));
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn checkcast_leaves_the_stack_alone() {
        let code = vec![0x01, 0xc0, 0x00, 0x01, 0xb0];
        assert_eq!(returns(code, vec![]), Value::Null);
    }

    #[test]
    fn heap_allocations_are_isolated() {
        let mut heap = Heap::new();
        let first = heap.allocate(String::from("Point"), vec![String::from("x")]);
        let second = heap.allocate(String::from("Point"), vec![String::from("x")]);
        assert_ne!(first, second);
        assert!(heap.get_mut(first).unwrap().set_field("x", Value::Int(5)));
        assert_eq!(heap.get(first).unwrap().field("x"), Some(&Value::Int(5)));
        assert_eq!(heap.get(second).unwrap().field("x"), Some(&Value::Null));
    }

    #[test]
    fn fields_start_null_and_unknown_fields_are_rejected() {
        let mut heap = Heap::new();
        let reference = heap.allocate(String::from("Point"), vec![String::from("x")]);
        let object = heap.get_mut(reference).unwrap();
        assert!(!object.set_field("y", Value::Int(1)));
        assert_eq!(object.field("x"), Some(&Value::Null));
    }

    #[test]
    fn unsupported_opcode_is_fatal_with_context() {
        let err = run_frame(vec![0xca], vec![], vec![]).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::UnsupportedOpcode(0xca));
        assert_eq!(err.class, "Test");
        assert_eq!(err.method, "test");
        assert_eq!(err.pc, 0);
    }

    #[test]
    fn arithmetic_on_non_integers_is_fatal() {
        let err = run_frame(vec![0x01, 0x04, 0x60, 0xac], vec![], vec![]).unwrap_err();
        assert!(matches!(
            err.kind,
            RuntimeErrorKind::TypeMismatch {
                expected: "integer",
                ..
            }
        ));
    }

    #[test]
    fn empty_stack_pop_is_fatal() {
        let err = run_frame(vec![0x60], vec![], vec![]).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::StackUnderflow);
    }

    #[test]
    fn falling_off_the_code_end_is_fatal() {
        let err = run_frame(vec![0x03], vec![], vec![]).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::TruncatedCode);
    }

    #[test]
    fn value_text_representations() {
        assert_eq!(Value::Int(-7).to_string(), "-7");
        assert_eq!(Value::Str(String::from("hi")).to_string(), "hi");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Ref(3).to_string(), "object@3");
    }
}
