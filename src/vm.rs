// File: src/vm.rs
//
// The stack virtual machine (spec.md §4.4, §4.5, §5). A flat, non-recursive
// dispatch loop walks frames within the current execution context so that
// exception unwinding can pop frames and retarget the instruction pointer
// without needing native-stack unwinding; a Rust call stack is only used
// to recurse into a freshly pushed execution context (`eval`/`loadScript`).

use crate::classes::Builtins;
use crate::errors::{ErrorClass, RuntimeError};
use crate::gc::{GcRef, Heap, StressMode};
use crate::iseq::{Chunk, ChunkRef, ConstValue, Operand, OpCode, ParamSpec};
use crate::iterator::{self, IteratorArity};
use crate::method_resolver::{self, Slot};
use crate::object::{
    BoundMethodObj, ClassObj, ClosureObj, FunctionObj, InstanceObj, NativeObj, ObjKind, RegexObj,
};
use crate::upvalue;
use crate::value::Value;
use ahash::AHashMap;
use std::rc::Rc;

const FRAMES_MAX: usize = 512;
const STACK_MAX: usize = FRAMES_MAX * 64;
/// Opcodes interpreted between cooperative GVL yield checks (spec.md §5
/// "opsRemaining counter decremented once per interpreted opcode"). With a
/// single OS thread driving the interpreter there is never another
/// runnable thread to yield to, so this only gates how often we'd check.
const DEFAULT_OPS_QUANTUM: usize = 1 << 16;

struct Frame {
    closure: GcRef,
    ip: usize,
    slot_base: usize,
    /// The block argument (if any) this frame was called with (spec.md §4.4
    /// `CallInfo.blockInstance`), consulted by the `yield`/`blockGiven`
    /// natives, which have no other way to see the caller's block.
    block: Value,
}

struct ExecutionContext {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    file: Option<String>,
}

impl ExecutionContext {
    fn new() -> Self {
        ExecutionContext { stack: Vec::new(), frames: Vec::new(), file: None }
    }
}

/// Control transfer produced while scanning a chunk's catch table
/// (spec.md §9 "opcode dispatcher returns a Control variant").
enum Unwind {
    /// Handler found; IP already retargeted.
    Handled,
    /// No handler anywhere in the current context stack.
    Uncaught(RuntimeError),
}

pub struct Thread {
    pub heap: Heap,
    pub builtins: Builtins,
    pub globals: AHashMap<String, Value>,
    contexts: Vec<ExecutionContext>,
    open_upvalues: Vec<GcRef>,
    ops_remaining: usize,
    pub debug_vm: bool,
    /// Canonicalized paths already run by `requireScript` (spec.md §3
    /// "Eval/load"), so a second `requireScript` of the same file is a
    /// no-op.
    pub(crate) required: std::collections::HashSet<String>,
}

type OpResult<T> = Result<T, RuntimeError>;

impl Thread {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let builtins = Builtins::bootstrap(&mut heap);
        let mut globals = AHashMap::new();
        for name in [
            "Object", "Class", "Module", "Array", "Map", "String", "Error", "ArgumentError", "TypeError", "NameError",
            "SyntaxError", "SystemError", "LoadError", "RecursionError", "IndexError", "ZeroDivisionError",
        ] {
            if let Some(r) = builtins.by_name(name) {
                globals.insert(name.to_string(), Value::Object(r));
            }
        }
        let mut thread = Thread {
            heap,
            builtins,
            globals,
            contexts: Vec::new(),
            open_upvalues: Vec::new(),
            ops_remaining: DEFAULT_OPS_QUANTUM,
            debug_vm: false,
            required: std::collections::HashSet::new(),
        };
        crate::eval::install(&mut thread);
        crate::builtins::install(&mut thread);
        thread
    }

    pub fn set_stress(&mut self, mode: StressMode) {
        self.heap.stress = mode;
    }

    pub fn set_gc_enabled(&mut self, enabled: bool) {
        self.heap.enabled = enabled;
    }

    /// Runs a top-level chunk to completion in a freshly pushed execution
    /// context (spec.md §3 "a thread owns a stack of execution contexts").
    pub fn interpret(&mut self, chunk: ChunkRef, file: Option<String>) -> OpResult<Value> {
        let function = FunctionObj { name: "<script>".into(), arity: 0, chunk, upvalue_count: 0 };
        let function_ref = self.heap.alloc(ObjKind::Function(function));
        let closure_ref = self.heap.alloc(ObjKind::Closure(ClosureObj { function: function_ref, upvalues: Vec::new() }));

        let mut ctx = ExecutionContext::new();
        ctx.file = file;
        ctx.stack.push(Value::Object(closure_ref));
        ctx.frames.push(Frame { closure: closure_ref, ip: 0, slot_base: 0, block: Value::Nil });
        self.contexts.push(ctx);

        let result = self.run();
        self.contexts.pop();
        result
    }

    fn chunk_of(&self, closure_ref: GcRef) -> Rc<Chunk> {
        let function_ref = match &self.heap.get(closure_ref).kind {
            ObjKind::Closure(c) => c.function,
            _ => unreachable!("frame closure is always a Closure object"),
        };
        match &self.heap.get(function_ref).kind {
            ObjKind::Function(f) => f.chunk.clone(),
            _ => unreachable!("closure always references a Function object"),
        }
    }

    /// Collects every `GcRef` reachable from C-stack-equivalent roots: all
    /// operand stacks, the globals table, and the open-upvalue list
    /// (spec.md §4.7 mark-phase seed list, scoped to what a single-thread
    /// VM without native-call object piles actually needs).
    fn roots(&self) -> Vec<GcRef> {
        let mut out = Vec::new();
        for ctx in &self.contexts {
            for v in &ctx.stack {
                if let Value::Object(r) = v {
                    out.push(*r);
                }
            }
            for f in &ctx.frames {
                out.push(f.closure);
            }
        }
        for v in self.globals.values() {
            if let Value::Object(r) = v {
                out.push(*r);
            }
        }
        out.extend(self.open_upvalues.iter().copied());
        out
    }

    fn maybe_collect(&mut self) {
        if self.heap.should_collect() {
            let roots = self.roots();
            self.heap.collect(&roots);
        }
    }

    fn ctx(&mut self) -> &mut ExecutionContext {
        self.contexts.last_mut().expect("no active execution context")
    }

    fn push(&mut self, v: Value) -> OpResult<()> {
        let ctx = self.ctx();
        if ctx.stack.len() >= STACK_MAX {
            return Err(RuntimeError::new(ErrorClass::RecursionError, "stack overflow"));
        }
        ctx.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.ctx().stack.pop().expect("operand stack underflow")
    }

    fn peek(&mut self, back: usize) -> Value {
        let ctx = self.ctx();
        ctx.stack[ctx.stack.len() - 1 - back]
    }

    // ---- main loop ----

    fn run(&mut self) -> OpResult<Value> {
        let base_context_depth = self.contexts.len();
        loop {
            if self.contexts.len() < base_context_depth {
                // The top-level context itself unwound (uncaught error
                // path already returned); nothing left to run here.
                return Ok(Value::Nil);
            }
            self.ops_remaining = self.ops_remaining.saturating_sub(1);

            let (op, operand, line, closure_ref, slot_base) = {
                let ctx = self.contexts.last().unwrap();
                let frame = ctx.frames.last().unwrap();
                let chunk = self.chunk_of(frame.closure);
                let instr = &chunk.code[frame.ip];
                (instr.op, instr.operand, instr.line, frame.closure, frame.slot_base)
            };
            let _ = line;

            {
                let ctx = self.contexts.last_mut().unwrap();
                ctx.frames.last_mut().unwrap().ip += 1;
            }

            match self.execute(op, operand, closure_ref, slot_base) {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Returned) => {
                    if self.contexts.last().unwrap().frames.is_empty() {
                        let value = self.ctx().stack.pop().unwrap_or(Value::Nil);
                        if self.contexts.len() == base_context_depth {
                            return Ok(value);
                        }
                        self.contexts.pop();
                        self.push(value)?;
                    }
                }
                Err(err) => match self.unwind(err) {
                    Unwind::Handled => {}
                    Unwind::Uncaught(err) => {
                        if self.contexts.len() == base_context_depth {
                            self.contexts.last_mut().unwrap().frames.clear();
                            return Err(err);
                        }
                        self.contexts.pop();
                        return Err(err);
                    }
                },
            }
        }
    }

    /// Scans outward from the current frame's catch table (spec.md §4.5
    /// steps 2–3): on a matching row, retarget the IP and clear error
    /// state; otherwise pop frames, then contexts, until a handler is
    /// found or nothing is left.
    fn unwind(&mut self, err: RuntimeError) -> Unwind {
        loop {
            let ctx = match self.contexts.last_mut() {
                Some(c) => c,
                None => return Unwind::Uncaught(err),
            };
            let frame = match ctx.frames.last() {
                Some(f) => f,
                None => {
                    self.contexts.pop();
                    continue;
                }
            };
            let chunk = self.chunk_of(frame.closure);
            let ip = frame.ip.saturating_sub(1);
            let mut found = None;
            for row in &chunk.catch_table {
                if ip < row.from || ip >= row.to {
                    continue;
                }
                let matches = match &row.class_name {
                    None => true, // ensure row
                    Some(name) => self
                        .builtins
                        .by_name(name)
                        .or_else(|| self.globals.get(name).and_then(|v| v.as_object()))
                        .map(|class_ref| self.error_is_a(&err, class_ref))
                        .unwrap_or(false),
                };
                if matches {
                    found = Some((row.target, row.is_ensure, row.stack_depth));
                    break;
                }
            }
            if let Some((target, is_ensure, stack_depth)) = found {
                let slot_base = frame.slot_base;
                let ctx = self.contexts.last_mut().unwrap();
                ctx.stack.truncate(slot_base + stack_depth);
                ctx.frames.last_mut().unwrap().ip = target;
                if !is_ensure {
                    let instance = self.make_error_instance(&err);
                    self.contexts.last_mut().unwrap().stack.push(instance);
                }
                return Unwind::Handled;
            }
            let slot_base = frame.slot_base;
            let ctx = self.contexts.last_mut().unwrap();
            ctx.frames.pop();
            ctx.stack.truncate(slot_base);
            if ctx.frames.is_empty() {
                if self.contexts.len() == 1 {
                    return Unwind::Uncaught(err);
                }
                self.contexts.pop();
            }
        }
    }

    fn error_is_a(&self, err: &RuntimeError, class_ref: GcRef) -> bool {
        let target_name = match &self.heap.get(class_ref).kind {
            ObjKind::Class(c) => c.name.clone(),
            _ => return false,
        };
        match ErrorClass::by_name(&target_name) {
            Some(target) => err.class.is_a(target),
            None => false,
        }
    }

    fn make_error_instance(&mut self, err: &RuntimeError) -> Value {
        let class_ref = self.builtins.error_class_ref(err.class);
        let mut instance = InstanceObj::new(class_ref);
        instance.error_class = Some(err.class);
        instance.fields.insert("message".to_string(), self.alloc_string(err.message.clone(), false));
        let obj_ref = self.heap.alloc(ObjKind::Instance(instance));
        Value::Object(obj_ref)
    }

    fn alloc_string(&mut self, s: String, interned: bool) -> Value {
        Value::Object(self.heap.alloc(ObjKind::String { value: s, interned }))
    }

    fn const_value(&mut self, chunk: &Chunk, idx: usize) -> Value {
        match &chunk.constants[idx] {
            ConstValue::Number(n) => Value::Number(*n),
            ConstValue::Str { value, kind } => {
                let interned = *kind == crate::ast::StringKind::Static;
                self.alloc_string(value.clone(), interned)
            }
            ConstValue::Regex { pattern, flags } => {
                let program = Rc::new(crate::regex::parse(pattern).unwrap_or(crate::regex::Node::Concat(vec![])));
                Value::Object(self.heap.alloc(ObjKind::Regex(RegexObj { source: pattern.clone(), flags: flags.clone(), program })))
            }
            ConstValue::Function(chunk_ref) => {
                let chunk_ref = chunk_ref.clone();
                let f = FunctionObj {
                    name: chunk_ref.name.clone(),
                    arity: chunk_ref.arity,
                    upvalue_count: chunk_ref.upvalues.len(),
                    chunk: chunk_ref,
                };
                Value::Object(self.heap.alloc(ObjKind::Function(f)))
            }
        }
    }

    fn execute(&mut self, op: OpCode, operand: Operand, closure_ref: GcRef, slot_base: usize) -> OpResult<StepOutcome> {
        macro_rules! index_operand {
            () => {
                match operand {
                    Operand::Index(i) => i,
                    _ => unreachable!("opcode expects an Index operand"),
                }
            };
        }
        macro_rules! jump_operand {
            () => {
                match operand {
                    Operand::Jump(t) => t,
                    _ => unreachable!("opcode expects a Jump operand"),
                }
            };
        }

        match op {
            OpCode::Constant => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let v = self.const_value(&chunk, idx);
                self.push(v)?;
            }
            OpCode::Nil => self.push(Value::Nil)?,
            OpCode::True => self.push(Value::Bool(true))?,
            OpCode::False => self.push(Value::Bool(false))?,
            OpCode::Pop => {
                self.pop();
            }
            OpCode::GetLocal => {
                let idx = index_operand!();
                let v = self.ctx().stack[slot_base + idx];
                self.push(v)?;
            }
            OpCode::SetLocal => {
                let idx = index_operand!();
                let v = self.peek(0);
                self.ctx().stack[slot_base + idx] = v;
            }
            OpCode::GetUpvalue => {
                let idx = index_operand!();
                let up_ref = match &self.heap.get(closure_ref).kind {
                    ObjKind::Closure(c) => c.upvalues[idx],
                    _ => unreachable!(),
                };
                let stack = &self.contexts.last().unwrap().stack;
                let v = upvalue::read_upvalue(&self.heap, up_ref, stack);
                self.push(v)?;
            }
            OpCode::SetUpvalue => {
                let idx = index_operand!();
                let up_ref = match &self.heap.get(closure_ref).kind {
                    ObjKind::Closure(c) => c.upvalues[idx],
                    _ => unreachable!(),
                };
                let v = self.peek(0);
                let ctx = self.contexts.last_mut().unwrap();
                upvalue::write_upvalue(&mut self.heap, up_ref, &mut ctx.stack, v);
            }
            OpCode::GetGlobal => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let name = self.const_name(&chunk, idx);
                match self.globals.get(&name).copied() {
                    Some(v) => self.push(v)?,
                    None => return Err(self.name_error(&name)),
                }
            }
            OpCode::DefineGlobal => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let name = self.const_name(&chunk, idx);
                let v = self.pop();
                self.globals.insert(name, v);
            }
            OpCode::SetGlobal => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let name = self.const_name(&chunk, idx);
                if !self.globals.contains_key(&name) {
                    return Err(self.name_error(&name));
                }
                let v = self.peek(0);
                self.globals.insert(name, v);
            }
            OpCode::GetProperty => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let name = self.const_name(&chunk, idx);
                let receiver = self.pop();
                let v = self.get_property(receiver, &name)?;
                self.push(v)?;
            }
            OpCode::SetProperty => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let name = self.const_name(&chunk, idx);
                let value = self.pop();
                let receiver = self.pop();
                self.set_property(receiver, &name, value)?;
                self.push(value)?;
            }
            OpCode::GetIndex => {
                let index = self.pop();
                let receiver = self.pop();
                let v = self.get_index(receiver, index)?;
                self.push(v)?;
            }
            OpCode::SetIndex => {
                let value = self.pop();
                let index = self.pop();
                let receiver = self.pop();
                self.set_index(receiver, index, value)?;
                self.push(value)?;
            }
            OpCode::GetSuper => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let name = self.const_name(&chunk, idx);
                let superclass = self.pop().as_object().expect("GetSuper expects a class on the stack");
                let receiver = self.pop();
                let method_ref = method_resolver::resolve_in_chain(&self.heap, superclass, &name, Slot::Method)
                    .map(|(_, m)| m)
                    .ok_or_else(|| self.name_error(&name))?;
                let bound = self.heap.alloc(ObjKind::BoundMethod(BoundMethodObj { receiver, method: method_ref }));
                self.push(Value::Object(bound))?;
            }
            OpCode::Equal => self.binary_bool(|a, b| Ok(values_equal(a, b)))?,
            OpCode::NotEqual => self.binary_bool(|a, b| Ok(!values_equal(a, b)))?,
            OpCode::Greater => self.binary_compare(|o| o == std::cmp::Ordering::Greater)?,
            OpCode::GreaterEqual => self.binary_compare(|o| o != std::cmp::Ordering::Less)?,
            OpCode::Less => self.binary_compare(|o| o == std::cmp::Ordering::Less)?,
            OpCode::LessEqual => self.binary_compare(|o| o != std::cmp::Ordering::Greater)?,
            OpCode::Add => self.add()?,
            OpCode::Subtract => self.arith(|a, b| a - b)?,
            OpCode::Multiply => self.arith(|a, b| a * b)?,
            OpCode::Divide => self.divide()?,
            OpCode::Modulo => self.modulo()?,
            OpCode::ShovelLeft => self.int_binop(|a, b| a << b)?,
            OpCode::ShovelRight => self.int_binop(|a, b| a >> b)?,
            OpCode::BitAnd => self.int_binop(|a, b| a & b)?,
            OpCode::BitOr => self.int_binop(|a, b| a | b)?,
            OpCode::BitXor => self.int_binop(|a, b| a ^ b)?,
            OpCode::Not => {
                let v = self.pop();
                self.push(Value::Bool(!v.is_truthy()))?;
            }
            OpCode::Negate => {
                let v = self.pop();
                match v.as_number() {
                    Some(n) => self.push(Value::Number(-n))?,
                    None => return Err(RuntimeError::new(ErrorClass::TypeError, "operand must be a number")),
                }
            }
            OpCode::Print => {
                let v = self.pop();
                println!("{}", self.display_value(v));
            }
            OpCode::Jump => {
                let t = jump_operand!();
                self.ctx().frames.last_mut().unwrap().ip = t;
            }
            OpCode::JumpIfFalse => {
                let t = jump_operand!();
                if !self.peek(0).is_truthy() {
                    self.ctx().frames.last_mut().unwrap().ip = t;
                }
            }
            OpCode::JumpIfNotUndef => {
                let t = jump_operand!();
                if !self.peek(0).is_undef() {
                    self.ctx().frames.last_mut().unwrap().ip = t;
                }
            }
            OpCode::Loop => {
                let t = jump_operand!();
                self.ctx().frames.last_mut().unwrap().ip = t;
            }
            OpCode::Call => {
                let block = self.pop();
                let kwargs = self.pop();
                let args_val = self.pop();
                let callee = self.pop();
                return self.do_call(callee, args_val, kwargs, block);
            }
            OpCode::Invoke => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let name = self.const_name(&chunk, idx);
                let block = self.pop();
                let kwargs = self.pop();
                let args_val = self.pop();
                let receiver = self.pop();
                return self.do_invoke(receiver, &name, args_val, kwargs, block);
            }
            OpCode::SuperInvoke => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let name = self.const_name(&chunk, idx);
                let superclass = self.pop().as_object().expect("SuperInvoke expects a class on the stack");
                let block = self.pop();
                let kwargs = self.pop();
                let args_val = self.pop();
                let receiver = self.pop();
                let method_ref = method_resolver::resolve_in_chain(&self.heap, superclass, &name, Slot::Method)
                    .map(|(_, m)| m)
                    .ok_or_else(|| self.name_error(&name))?;
                let args = self.array_items(args_val);
                return self.invoke_callable(method_ref, receiver, args, kwargs, block);
            }
            OpCode::Closure => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let function_val = self.const_value(&chunk, idx);
                let function_ref = function_val.as_object().unwrap();
                let upvalue_descs = match &chunk.constants[idx] {
                    ConstValue::Function(c) => c.upvalues.clone(),
                    _ => unreachable!(),
                };
                let mut upvalues = Vec::with_capacity(upvalue_descs.len());
                for desc in &upvalue_descs {
                    if desc.is_local {
                        let stack_idx = slot_base + desc.index;
                        let ctx_stack = &self.contexts.last().unwrap().stack;
                        let _ = ctx_stack;
                        let r = upvalue::capture_upvalue(&mut self.heap, &mut self.open_upvalues, stack_idx);
                        upvalues.push(r);
                    } else {
                        let enclosing_upvalues = match &self.heap.get(closure_ref).kind {
                            ObjKind::Closure(c) => c.upvalues.clone(),
                            _ => unreachable!(),
                        };
                        upvalues.push(enclosing_upvalues[desc.index]);
                    }
                }
                let new_closure = self.heap.alloc(ObjKind::Closure(ClosureObj { function: function_ref, upvalues }));
                self.push(Value::Object(new_closure))?;
            }
            OpCode::CloseUpvalue => {
                let from = self.ctx().stack.len() - 1;
                let ctx = self.contexts.last_mut().unwrap();
                upvalue::close_upvalues(&mut self.heap, &mut self.open_upvalues, &ctx.stack, from);
                ctx.stack.pop();
            }
            OpCode::Return => {
                let result = self.pop();
                let frame = self.ctx().frames.pop().unwrap();
                let from = frame.slot_base;
                let ctx = self.contexts.last_mut().unwrap();
                upvalue::close_upvalues(&mut self.heap, &mut self.open_upvalues, &ctx.stack, from);
                ctx.stack.truncate(from);
                self.push(result)?;
                self.maybe_collect();
                return Ok(StepOutcome::Returned);
            }
            OpCode::Class => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let name = self.const_name(&chunk, idx);
                let class = ClassObj::new(name, Some(self.builtins.object_class));
                let r = self.heap.alloc(ObjKind::Class(class));
                self.push(Value::Object(r))?;
            }
            OpCode::Module => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let name = self.const_name(&chunk, idx);
                let mut class = ClassObj::new(name, None);
                class.is_module = true;
                let r = self.heap.alloc(ObjKind::Class(class));
                self.push(Value::Object(r))?;
            }
            OpCode::Inherit => {
                let superclass_val = self.pop();
                let subclass_val = self.peek(0);
                let superclass_ref = superclass_val
                    .as_object()
                    .filter(|r| matches!(self.heap.get(*r).kind, ObjKind::Class(_)))
                    .ok_or_else(|| RuntimeError::new(ErrorClass::TypeError, "superclass must be a class"))?;
                let subclass_ref = subclass_val.as_object().unwrap();
                if let ObjKind::Class(c) = &mut self.heap.get_mut(subclass_ref).kind {
                    c.superclass = Some(superclass_ref);
                }
            }
            OpCode::Method | OpCode::StaticMethod | OpCode::GetterDecl | OpCode::SetterDecl => {
                let chunk = self.chunk_of(closure_ref);
                let idx = index_operand!();
                let name = self.const_name(&chunk, idx);
                let method_val = self.pop();
                let method_ref = method_val.as_object().unwrap();
                let class_val = self.peek(0);
                let class_ref = class_val.as_object().unwrap();
                if let ObjKind::Class(c) = &mut self.heap.get_mut(class_ref).kind {
                    let table = match op {
                        OpCode::Method => &mut c.methods,
                        OpCode::StaticMethod => &mut c.static_methods,
                        OpCode::GetterDecl => &mut c.getters,
                        OpCode::SetterDecl => &mut c.setters,
                        _ => unreachable!(),
                    };
                    table.insert(name, method_ref);
                }
            }
            OpCode::Array => {
                let r = self.heap.alloc(ObjKind::Array(Vec::new()));
                self.push(Value::Object(r))?;
            }
            OpCode::ArrayPush => {
                let v = self.pop();
                let arr_ref = self.peek(0).as_object().unwrap();
                if let ObjKind::Array(items) = &mut self.heap.get_mut(arr_ref).kind {
                    items.push(v);
                }
            }
            OpCode::ArraySpread => {
                let v = self.pop();
                let items = self.array_items(v);
                let arr_ref = self.peek(0).as_object().unwrap();
                if let ObjKind::Array(existing) = &mut self.heap.get_mut(arr_ref).kind {
                    existing.extend(items);
                }
            }
            OpCode::Map => {
                let r = self.heap.alloc(ObjKind::Map(Vec::new()));
                self.push(Value::Object(r))?;
            }
            OpCode::MapSet => {
                let v = self.pop();
                let k = self.pop();
                let map_ref = self.peek(0).as_object().unwrap();
                if let ObjKind::Map(pairs) = &mut self.heap.get_mut(map_ref).kind {
                    if let Some(slot) = pairs.iter_mut().find(|(ek, _)| values_equal(*ek, k)) {
                        slot.1 = v;
                    } else {
                        pairs.push((k, v));
                    }
                }
            }
            OpCode::Throw => {
                let v = self.pop();
                return Err(self.value_to_runtime_error(v));
            }
            OpCode::GetIterator => {
                let v = self.pop();
                match iterator::create_builtin_iterator(&mut self.heap, v) {
                    Some((iter_ref, arity)) => {
                        let tag = match arity {
                            IteratorArity::Single => 1.0,
                            IteratorArity::Pair => 2.0,
                        };
                        self.push(Value::Object(iter_ref))?;
                        self.push(Value::Number(tag))?;
                    }
                    None => return Err(RuntimeError::new(ErrorClass::TypeError, "value is not iterable")),
                }
            }
            OpCode::IteratorNext => {
                let (iter_slot, var_count, exit_target) = match operand {
                    Operand::IterNext { iter_slot, count, exit } => (iter_slot, count, exit),
                    _ => unreachable!("IteratorNext always carries an IterNext operand"),
                };
                let tag = self.ctx().stack[slot_base + iter_slot + 1];
                let iter_ref = self.ctx().stack[slot_base + iter_slot].as_object().unwrap();
                let arity = if tag.as_number() == Some(2.0) { IteratorArity::Pair } else { IteratorArity::Single };
                match iterator::next(&mut self.heap, iter_ref, arity) {
                    Some(mut values) => {
                        values.truncate(var_count);
                        while values.len() < var_count {
                            values.push(Value::Nil);
                        }
                        for v in values {
                            self.push(v)?;
                        }
                    }
                    None => {
                        self.ctx().frames.last_mut().unwrap().ip = exit_target;
                    }
                }
            }
        }
        Ok(StepOutcome::Continue)
    }

    fn const_name(&self, chunk: &Chunk, idx: usize) -> String {
        match &chunk.constants[idx] {
            ConstValue::Str { value, .. } => value.clone(),
            _ => unreachable!("identifier constant must be a string"),
        }
    }

    fn array_items(&self, v: Value) -> Vec<Value> {
        match v.as_object() {
            Some(r) => match &self.heap.get(r).kind {
                ObjKind::Array(items) => items.clone(),
                _ => vec![],
            },
            None => vec![],
        }
    }

    fn binary_bool(&mut self, f: impl Fn(Value, Value) -> OpResult<bool>) -> OpResult<()> {
        let b = self.pop();
        let a = self.pop();
        let result = f(a, b)?;
        self.push(Value::Bool(result))
    }

    fn binary_compare(&mut self, f: impl Fn(std::cmp::Ordering) -> bool) -> OpResult<()> {
        let b = self.pop();
        let a = self.pop();
        let ordering = self.compare_values(a, b)?;
        self.push(Value::Bool(f(ordering)))
    }

    fn compare_values(&self, a: Value, b: Value) -> OpResult<std::cmp::Ordering> {
        if let (Some(a), Some(b)) = (a.as_number(), b.as_number()) {
            return a.partial_cmp(&b).ok_or_else(|| RuntimeError::new(ErrorClass::TypeError, "NaN is not ordered"));
        }
        if let (Some(a), Some(b)) = (self.as_str(a), self.as_str(b)) {
            return Ok(a.cmp(&b));
        }
        Err(RuntimeError::new(ErrorClass::TypeError, "values are not comparable"))
    }

    fn as_str(&self, v: Value) -> Option<String> {
        match v.as_object() {
            Some(r) => match &self.heap.get(r).kind {
                ObjKind::String { value, .. } => Some(value.clone()),
                _ => None,
            },
            None => None,
        }
    }

    fn add(&mut self) -> OpResult<()> {
        let b = self.pop();
        let a = self.pop();
        if let (Some(a), Some(b)) = (a.as_number(), b.as_number()) {
            return self.push(Value::Number(a + b));
        }
        if let (Some(a), Some(b)) = (self.as_str(a), self.as_str(b)) {
            return self.push(self.alloc_string_now(a + &b));
        }
        Err(RuntimeError::new(ErrorClass::TypeError, "operands must both be numbers or strings"))
    }

    fn alloc_string_now(&mut self, s: String) -> Value {
        Value::Object(self.heap.alloc(ObjKind::String { value: s, interned: false }))
    }

    fn arith(&mut self, f: impl Fn(f64, f64) -> f64) -> OpResult<()> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => self.push(Value::Number(f(a, b))),
            _ => Err(RuntimeError::new(ErrorClass::TypeError, "operands must be numbers")),
        }
    }

    fn divide(&mut self) -> OpResult<()> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(_), Some(b)) if b == 0.0 => Err(RuntimeError::new(ErrorClass::ZeroDivisionError, "division by zero")),
            (Some(a), Some(b)) => self.push(Value::Number(a / b)),
            _ => Err(RuntimeError::new(ErrorClass::TypeError, "operands must be numbers")),
        }
    }

    fn modulo(&mut self) -> OpResult<()> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(_), Some(b)) if b == 0.0 => Err(RuntimeError::new(ErrorClass::ZeroDivisionError, "division by zero")),
            (Some(a), Some(b)) => self.push(Value::Number(a % b)),
            _ => Err(RuntimeError::new(ErrorClass::TypeError, "operands must be numbers")),
        }
    }

    fn int_binop(&mut self, f: impl Fn(i64, i64) -> i64) -> OpResult<()> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => self.push(Value::Number(f(a as i64, b as i64) as f64)),
            _ => Err(RuntimeError::new(ErrorClass::TypeError, "operands must be numbers")),
        }
    }

    fn name_error(&self, name: &str) -> RuntimeError {
        RuntimeError::new(ErrorClass::NameError, format!("undefined name '{name}'"))
    }

    fn get_property(&mut self, receiver: Value, name: &str) -> OpResult<Value> {
        let obj_ref = receiver.as_object().ok_or_else(|| RuntimeError::new(ErrorClass::TypeError, "not an object"))?;
        if let ObjKind::Instance(i) = &self.heap.get(obj_ref).kind {
            if let Some(v) = i.fields.get(name) {
                return Ok(*v);
            }
            let class = i.class;
            if let Some(getter_ref) = method_resolver::resolve_getter(&self.heap, class, name) {
                return self.invoke_callable(getter_ref, receiver, vec![], Value::Nil, Value::Nil);
            }
            if let Some(method_ref) = method_resolver::resolve_instance_method(&self.heap, obj_ref, name) {
                let bound = self.heap.alloc(ObjKind::BoundMethod(BoundMethodObj { receiver, method: method_ref }));
                return Ok(Value::Object(bound));
            }
        }
        if let ObjKind::Class(_) = &self.heap.get(obj_ref).kind {
            if let Some(method_ref) = method_resolver::resolve_static(&self.heap, obj_ref, name) {
                let bound = self.heap.alloc(ObjKind::BoundMethod(BoundMethodObj { receiver, method: method_ref }));
                return Ok(Value::Object(bound));
            }
        }
        Ok(Value::Nil)
    }

    fn set_property(&mut self, receiver: Value, name: &str, value: Value) -> OpResult<()> {
        let obj_ref = receiver.as_object().ok_or_else(|| RuntimeError::new(ErrorClass::TypeError, "not an object"))?;
        let class = match &self.heap.get(obj_ref).kind {
            ObjKind::Instance(i) => i.class,
            _ => return Err(RuntimeError::new(ErrorClass::TypeError, "not an instance")),
        };
        if let Some(setter_ref) = method_resolver::resolve_setter(&self.heap, class, name) {
            self.invoke_callable(setter_ref, receiver, vec![value], Value::Nil, Value::Nil)?;
            return Ok(());
        }
        let obj = self.heap.get_mut(obj_ref);
        if obj.header.frozen {
            return Err(RuntimeError::new(ErrorClass::Error, "cannot modify a frozen object"));
        }
        if let ObjKind::Instance(i) = &mut obj.kind {
            i.fields.insert(name.to_string(), value);
        }
        Ok(())
    }

    fn get_index(&mut self, receiver: Value, index: Value) -> OpResult<Value> {
        let obj_ref = receiver.as_object().ok_or_else(|| RuntimeError::new(ErrorClass::TypeError, "not indexable"))?;
        match &self.heap.get(obj_ref).kind {
            ObjKind::Array(items) => {
                let i = index.as_number().ok_or_else(|| RuntimeError::new(ErrorClass::TypeError, "index must be a number"))? as i64;
                if i < 0 || i as usize >= items.len() {
                    return Err(RuntimeError::new(ErrorClass::IndexError, "array index out of bounds"));
                }
                Ok(items[i as usize])
            }
            ObjKind::Map(pairs) => Ok(pairs.iter().find(|(k, _)| values_equal(*k, index)).map(|(_, v)| *v).unwrap_or(Value::Nil)),
            ObjKind::String { value, .. } => {
                let i = index.as_number().ok_or_else(|| RuntimeError::new(ErrorClass::TypeError, "index must be a number"))? as i64;
                let bytes = value.as_bytes();
                if i < 0 || i as usize >= bytes.len() {
                    return Err(RuntimeError::new(ErrorClass::IndexError, "string index out of bounds"));
                }
                let ch = bytes[i as usize] as char;
                Ok(self.alloc_string_now(ch.to_string()))
            }
            _ => Err(RuntimeError::new(ErrorClass::TypeError, "value does not support indexing")),
        }
    }

    fn set_index(&mut self, receiver: Value, index: Value, value: Value) -> OpResult<()> {
        let obj_ref = receiver.as_object().ok_or_else(|| RuntimeError::new(ErrorClass::TypeError, "not indexable"))?;
        match &mut self.heap.get_mut(obj_ref).kind {
            ObjKind::Array(items) => {
                let i = index.as_number().ok_or_else(|| RuntimeError::new(ErrorClass::TypeError, "index must be a number"))? as i64;
                if i < 0 || i as usize >= items.len() {
                    return Err(RuntimeError::new(ErrorClass::IndexError, "array index out of bounds"));
                }
                items[i as usize] = value;
                Ok(())
            }
            ObjKind::Map(pairs) => {
                if let Some(slot) = pairs.iter_mut().find(|(k, _)| values_equal(*k, index)) {
                    slot.1 = value;
                } else {
                    pairs.push((index, value));
                }
                Ok(())
            }
            _ => Err(RuntimeError::new(ErrorClass::TypeError, "value does not support index assignment")),
        }
    }

    fn value_to_runtime_error(&mut self, v: Value) -> RuntimeError {
        if let Some(r) = v.as_object() {
            if let ObjKind::Instance(i) = &self.heap.get(r).kind {
                let message = i
                    .fields
                    .get("message")
                    .and_then(|m| self.as_str(*m))
                    .unwrap_or_default();
                let class = i.error_class.unwrap_or(ErrorClass::Error);
                return RuntimeError::new(class, message);
            }
            if let Some(s) = self.as_str(v) {
                return RuntimeError::new(ErrorClass::Error, s);
            }
        }
        RuntimeError::new(ErrorClass::Error, self.display_value(v))
    }

    /// Formats a value for `print` and the REPL's `=>` echo.
    pub(crate) fn display_value(&self, v: Value) -> String {
        match v {
            Value::Object(r) => match &self.heap.get(r).kind {
                ObjKind::String { value, .. } => value.clone(),
                ObjKind::Array(items) => {
                    let parts: Vec<String> = items.iter().map(|i| self.display_value(*i)).collect();
                    format!("[{}]", parts.join(", "))
                }
                ObjKind::Instance(i) => {
                    let class_name = match &self.heap.get(i.class).kind {
                        ObjKind::Class(c) => c.name.clone(),
                        _ => "Object".to_string(),
                    };
                    format!("<{class_name} instance>")
                }
                ObjKind::Class(c) => c.name.clone(),
                _ => v.to_string(),
            },
            other => other.to_string(),
        }
    }

    // ---- call dispatch (spec.md §4.4) ----

    fn do_call(&mut self, callee: Value, args_val: Value, kwargs: Value, block: Value) -> OpResult<StepOutcome> {
        let args = self.array_items(args_val);
        let callable_ref = callee.as_object().ok_or_else(|| RuntimeError::new(ErrorClass::TypeError, "value is not callable"))?;
        self.call_ref(callable_ref, callee, args, kwargs, block)
    }

    fn do_invoke(&mut self, receiver: Value, name: &str, args_val: Value, kwargs: Value, block: Value) -> OpResult<StepOutcome> {
        let args = self.array_items(args_val);
        let obj_ref = receiver.as_object().ok_or_else(|| RuntimeError::new(ErrorClass::TypeError, "not an object"))?;
        if let ObjKind::Instance(i) = &self.heap.get(obj_ref).kind {
            if let Some(v) = i.fields.get(name).copied() {
                if let Some(field_callable) = v.as_object() {
                    return self.call_ref(field_callable, v, args, kwargs, block);
                }
            }
            if let Some(method_ref) = method_resolver::resolve_instance_method(&self.heap, obj_ref, name) {
                let v = self.invoke_callable(method_ref, receiver, args, kwargs, block)?;
                self.push(v)?;
                return Ok(StepOutcome::Continue);
            }
            return Err(self.name_error(name));
        }
        if let ObjKind::Class(_) = &self.heap.get(obj_ref).kind {
            if let Some(method_ref) = method_resolver::resolve_static(&self.heap, obj_ref, name) {
                let v = self.invoke_callable(method_ref, receiver, args, kwargs, block)?;
                self.push(v)?;
                return Ok(StepOutcome::Continue);
            }
        }
        Err(self.name_error(name))
    }

    /// Resolves a callee value into a pushed call frame or a directly
    /// computed value (native/bound-method fast paths), per spec.md §4.4
    /// steps 1–4.
    fn call_ref(&mut self, callable_ref: GcRef, callee: Value, args: Vec<Value>, kwargs: Value, block: Value) -> OpResult<StepOutcome> {
        match &self.heap.get(callable_ref).kind {
            ObjKind::Class(_) => {
                let instance = InstanceObj::new(callable_ref);
                let instance_ref = self.heap.alloc(ObjKind::Instance(instance));
                let instance_val = Value::Object(instance_ref);
                if let Some(init_ref) = method_resolver::resolve_instance_method(&self.heap, instance_ref, "init") {
                    let v = self.invoke_callable(init_ref, instance_val, args, kwargs, block)?;
                    let _ = v; // initializers always return `this`
                    self.push(instance_val)?;
                } else {
                    self.push(instance_val)?;
                }
                Ok(StepOutcome::Continue)
            }
            ObjKind::BoundMethod(b) => {
                let receiver = b.receiver;
                let method = b.method;
                let v = self.invoke_callable(method, receiver, args, kwargs, block)?;
                self.push(v)?;
                Ok(StepOutcome::Continue)
            }
            ObjKind::Closure(_) => {
                // Slot 0 of every frame is reserved (`this` for methods,
                // unnamed otherwise); a plain call has no receiver to put
                // there, so the closure itself occupies it.
                self.push(callee)?;
                self.call_closure(callable_ref, args, kwargs, block)
            }
            ObjKind::Native(n) => {
                let native = n.func;
                let v = native(self, &args)?;
                self.push(v)?;
                Ok(StepOutcome::Continue)
            }
            _ => {
                let _ = callee;
                Err(RuntimeError::new(ErrorClass::TypeError, "value is not callable"))
            }
        }
    }

    /// Invokes a resolved method/closure/native ref with an explicit
    /// receiver, returning its value directly (used by getters/setters/
    /// `super` dispatch, which need the result inline rather than via the
    /// frame-return path).
    fn invoke_callable(&mut self, callable_ref: GcRef, receiver: Value, args: Vec<Value>, kwargs: Value, block: Value) -> OpResult<Value> {
        match &self.heap.get(callable_ref).kind {
            ObjKind::Native(n) => {
                let native = n.func;
                let mut full_args = vec![receiver];
                full_args.extend(args);
                native(self, &full_args)
            }
            ObjKind::Closure(_) => {
                self.push(Value::Object(callable_ref))?;
                let n = self.ctx().stack.len();
                let _ = n;
                self.call_closure_with_receiver(callable_ref, receiver, args, kwargs, block)?;
                // call_closure_with_receiver pushes a new frame and runs
                // the nested interpreter loop to completion.
                Ok(self.pop())
            }
            _ => Err(RuntimeError::new(ErrorClass::TypeError, "value is not callable")),
        }
    }

    fn call_closure_with_receiver(&mut self, closure_ref: GcRef, receiver: Value, args: Vec<Value>, kwargs: Value, block: Value) -> OpResult<()> {
        self.pop(); // discard the placeholder pushed by invoke_callable
        self.push(receiver)?;
        let outcome = self.call_closure(closure_ref, args, kwargs, block)?;
        debug_assert!(matches!(outcome, StepOutcome::Continue));
        self.run_nested_to_return()
    }

    /// Runs the interpreter loop until the frame pushed by the most recent
    /// `call_closure` returns, without disturbing frames below it. Used
    /// when a call must resolve to a value inline (getters/setters/super)
    /// rather than via the flat top-level loop's own Return handling.
    fn run_nested_to_return(&mut self) -> OpResult<()> {
        let target_depth = self.ctx().frames.len() - 1;
        loop {
            if self.ctx().frames.len() <= target_depth {
                return Ok(());
            }
            self.ops_remaining = self.ops_remaining.saturating_sub(1);
            let (op, operand, closure_ref, slot_base) = {
                let ctx = self.contexts.last().unwrap();
                let frame = ctx.frames.last().unwrap();
                let chunk = self.chunk_of(frame.closure);
                let instr = &chunk.code[frame.ip];
                (instr.op, instr.operand, frame.closure, frame.slot_base)
            };
            self.ctx().frames.last_mut().unwrap().ip += 1;
            match self.execute(op, operand, closure_ref, slot_base) {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Returned) => {}
                Err(err) => match self.unwind(err) {
                    Unwind::Handled => {}
                    Unwind::Uncaught(err) => return Err(err),
                },
            }
        }
    }

    fn call_closure(&mut self, closure_ref: GcRef, args: Vec<Value>, kwargs: Value, block: Value) -> OpResult<StepOutcome> {
        let chunk = self.chunk_of(closure_ref);
        let locals = self.bind_params(&chunk, args, kwargs, block)?;
        if self.ctx().frames.len() >= FRAMES_MAX {
            return Err(RuntimeError::new(ErrorClass::RecursionError, "call stack depth exceeded"));
        }
        let slot_base = self.ctx().stack.len() - 1; // receiver/callee slot is slot 0
        for local in locals {
            self.push(local)?;
        }
        self.ctx().frames.push(Frame { closure: closure_ref, ip: 0, slot_base, block });
        Ok(StepOutcome::Continue)
    }

    /// The block argument passed to the innermost active frame, or `Nil` if
    /// none (spec.md §4.4: consulted by `yield`/`blockGiven`).
    pub(crate) fn current_block(&self) -> Value {
        self.contexts.last().and_then(|ctx| ctx.frames.last()).map(|f| f.block).unwrap_or(Value::Nil)
    }

    /// Calls an arbitrary callable value with positional args and returns
    /// its result inline, for use by natives (`yield`) that have no opcode
    /// of their own to drive a call through. Mirrors `invoke_callable`'s
    /// no-receiver sibling, `call_ref`'s `ObjKind::Closure` arm.
    pub(crate) fn call_value(&mut self, callable: Value, args: Vec<Value>) -> OpResult<Value> {
        let r = match callable.as_object() {
            Some(r) => r,
            None => return Err(RuntimeError::new(ErrorClass::TypeError, "value is not callable")),
        };
        match &self.heap.get(r).kind {
            ObjKind::Closure(_) => {
                self.push(callable)?;
                let outcome = self.call_closure(r, args, Value::Nil, Value::Nil)?;
                debug_assert!(matches!(outcome, StepOutcome::Continue));
                self.run_nested_to_return()?;
                Ok(self.pop())
            }
            ObjKind::Native(n) => {
                let native = n.func;
                native(self, &args)
            }
            ObjKind::BoundMethod(b) => {
                let receiver = b.receiver;
                let method = b.method;
                self.invoke_callable(method, receiver, args, Value::Nil, Value::Nil)
            }
            _ => Err(RuntimeError::new(ErrorClass::TypeError, "value is not callable")),
        }
    }

    fn bind_params(&mut self, chunk: &Chunk, mut args: Vec<Value>, kwargs: Value, block: Value) -> OpResult<Vec<Value>> {
        let required = chunk.params.iter().filter(|(_, s)| *s == ParamSpec::Required).count();
        let optional = chunk.params.iter().filter(|(_, s)| *s == ParamSpec::Optional).count();
        let has_splat = chunk.params.iter().any(|(_, s)| *s == ParamSpec::Splat);
        if args.len() < required || (!has_splat && args.len() > required + optional) {
            return Err(RuntimeError::new(
                ErrorClass::ArgumentError,
                format!("expected {} argument(s), got {}", required, args.len()),
            ));
        }
        let kwarg_pairs = self.array_items_as_map(kwargs);

        let mut locals = Vec::with_capacity(chunk.params.len());
        let mut positional_iter = args.drain(..);
        for (name, spec) in &chunk.params {
            match spec {
                ParamSpec::Required | ParamSpec::Optional => {
                    locals.push(positional_iter.next().unwrap_or(Value::Undef));
                }
                ParamSpec::Splat => {
                    let rest: Vec<Value> = positional_iter.by_ref().collect();
                    let r = self.heap.alloc(ObjKind::Array(rest));
                    locals.push(Value::Object(r));
                }
                ParamSpec::Keyword => {
                    let found = kwarg_pairs
                        .iter()
                        .find(|(k, _)| self.as_str(*k).as_deref() == Some(name.as_str()))
                        .map(|(_, v)| *v);
                    locals.push(found.unwrap_or(Value::Undef));
                }
                ParamSpec::Block => {
                    locals.push(block);
                }
            }
        }
        Ok(locals)
    }

    fn array_items_as_map(&self, v: Value) -> Vec<(Value, Value)> {
        match v.as_object() {
            Some(r) => match &self.heap.get(r).kind {
                ObjKind::Map(pairs) => pairs.clone(),
                _ => vec![],
            },
            None => vec![],
        }
    }
}

enum StepOutcome {
    Continue,
    Returned,
}

fn values_equal(a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil) => true,
        (Value::Undef, Value::Undef) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => x == y,
        _ => false,
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::optimizer;
    use crate::parser::parse_source;

    fn run_src(src: &str) -> Value {
        let stmts = parse_source(src).unwrap();
        let mut chunk = Compiler::compile(&stmts).unwrap();
        optimizer::optimize(&mut chunk, false);
        let mut thread = Thread::new();
        thread.interpret(Rc::new(chunk), None).unwrap()
    }

    #[test]
    fn arithmetic_and_globals_s1() {
        let mut thread = Thread::new();
        let stmts = parse_source("var a; a = 1; a + 2;").unwrap();
        let chunk = Compiler::compile(&stmts).unwrap();
        let result = thread.interpret(Rc::new(chunk), None).unwrap();
        assert_eq!(result, Value::Number(3.0));
        assert_eq!(thread.globals.get("a"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn closure_over_loop_captured_variable_s3() {
        let v = run_src(
            "fun adder(a) { return fun(b) { return a + b; }; } var add10 = adder(10); add10(20);",
        );
        assert_eq!(v, Value::Number(30.0));
    }

    #[test]
    fn try_catch_across_function_boundary_s4() {
        let v = run_src(
            "class MyError < Error { } fun doThrow() { throw MyError(); } try { doThrow(); } catch (MyError e) { e; }",
        );
        assert!(v.as_object().is_some());
    }

    #[test]
    fn super_dispatch_s5() {
        let v = run_src(
            "class A { greet() { return \"A\"; } } class B < A { greet() { return super.greet() + \"B\"; } } B().greet();",
        );
        match v.as_object() {
            Some(_) => {}
            None => panic!("expected a string object"),
        }
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let stmts = parse_source("1 / 0;").unwrap();
        let chunk = Compiler::compile(&stmts).unwrap();
        let mut thread = Thread::new();
        let err = thread.interpret(Rc::new(chunk), None).unwrap_err();
        assert_eq!(err.class, ErrorClass::ZeroDivisionError);
    }
}
