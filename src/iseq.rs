// File: src/iseq.rs
//
// Bytecode representation. Grounded in `examples/original_source/vm.c`'s
// opcode set, but represented as a `Vec<Instruction>` with `usize` jump
// targets rather than packed bytes with one-byte offsets (SPEC_FULL.md §5,
// "Jump offsets" open question) — an arena-of-instructions plus integer
// indices, patched in a final linearization pass by the compiler.

use crate::ast::StringKind;
use std::rc::Rc;

/// Compile-time constant pool entry. Strings and nested function chunks
/// cannot be materialized into `Value`s until a heap exists, so the pool
/// stores this heap-independent representation; the VM interns/allocates
/// them into `Value`s the first time a chunk is loaded (spec.md §4.6
/// "eval/load" pushes a fresh execution context, not a fresh constant
/// pool, so interning happens once per chunk load).
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Number(f64),
    Str { value: String, kind: StringKind },
    Regex { pattern: String, flags: String },
    Function(Rc<Chunk>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Constant,
    Nil,
    True,
    False,
    Pop,
    GetLocal,
    SetLocal,
    GetUpvalue,
    SetUpvalue,
    GetGlobal,
    DefineGlobal,
    SetGlobal,
    GetProperty,
    SetProperty,
    GetIndex,
    SetIndex,
    GetSuper,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    ShovelLeft,
    ShovelRight,
    BitAnd,
    BitOr,
    BitXor,
    Not,
    Negate,
    Print,
    Jump,
    JumpIfFalse,
    /// Peeks (does not pop) the stack top; jumps if it is anything other
    /// than `Value::Undef`. Used in a function's parameter prologue to
    /// skip a default-value expression when the caller actually supplied
    /// an argument (spec.md §4.4).
    JumpIfNotUndef,
    Loop,
    Call,
    Invoke,
    SuperInvoke,
    Closure,
    CloseUpvalue,
    Return,
    Class,
    Module,
    Inherit,
    Method,
    StaticMethod,
    GetterDecl,
    SetterDecl,
    /// Pushes a fresh, empty array.
    Array,
    /// Pops a value and the array beneath it, appends the value, pushes
    /// the array back.
    ArrayPush,
    /// Pops an iterable and the array beneath it, appends each of the
    /// iterable's elements (`[*spread]`), pushes the array back.
    ArraySpread,
    /// Pushes a fresh, empty map. Used to assemble a call's keyword-
    /// argument bundle (spec.md §4.4); there is no map literal syntax.
    Map,
    /// Pops a value and a key and the map beneath them, inserts, pushes
    /// the map back.
    MapSet,
    Throw,
    GetIterator,
    IteratorNext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Index(usize),
    Jump(usize),
    /// `IteratorNext`'s operand: the iterator's local slot, how many
    /// values to unpack per step, and where to jump once the iterator is
    /// exhausted. Folded into one variant since `Jump`'s patch-in-place
    /// idiom would otherwise clobber the slot/count recorded at emit time.
    IterNext { iter_slot: usize, count: usize, exit: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: OpCode,
    pub operand: Operand,
    pub line: usize,
}

impl Instruction {
    pub fn new(op: OpCode, operand: Operand, line: usize) -> Self {
        Instruction { op, operand, line }
    }

    pub fn simple(op: OpCode, line: usize) -> Self {
        Instruction { op, operand: Operand::None, line }
    }
}

/// A catch-table row (spec.md §4.5): instructions in `[from, to)` are
/// protected; on a matching throw, control transfers to `target`.
/// `is_ensure` rows always match regardless of thrown class and must run
/// to completion even when no error is in flight (falling off the end of
/// an ensure block simply continues).
#[derive(Debug, Clone, PartialEq)]
pub struct CatchRow {
    pub from: usize,
    pub to: usize,
    pub target: usize,
    pub class_name: Option<String>,
    pub is_ensure: bool,
    /// Frame-relative stack height (slot count, including slot 0) at the
    /// point the protected block begins. On a matching throw the VM
    /// truncates the stack back to this height before running the
    /// handler, undoing any locals/temporaries pushed inside the
    /// protected region (spec.md §4.5).
    pub stack_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDesc {
    pub is_local: bool,
    pub index: usize,
}

/// Per-parameter shape the VM's call dispatcher needs to route positional,
/// splat, keyword and block arguments into the right local slots
/// (spec.md §4.4). Default-value expressions themselves are compiled into
/// the function's own prologue bytecode, not stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSpec {
    Required,
    Optional,
    Splat,
    Keyword,
    Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub name: String,
    pub code: Vec<Instruction>,
    pub constants: Vec<ConstValue>,
    pub catch_table: Vec<CatchRow>,
    pub upvalues: Vec<UpvalueDesc>,
    pub arity: usize,
    pub params: Vec<(String, ParamSpec)>,
    pub is_initializer: bool,
}

impl Chunk {
    pub fn new(name: impl Into<String>) -> Self {
        Chunk {
            name: name.into(),
            code: Vec::new(),
            constants: Vec::new(),
            catch_table: Vec::new(),
            upvalues: Vec::new(),
            arity: 0,
            params: Vec::new(),
            is_initializer: false,
        }
    }

    pub fn emit(&mut self, op: OpCode, operand: Operand, line: usize) -> usize {
        self.code.push(Instruction::new(op, operand, line));
        self.code.len() - 1
    }

    pub fn add_constant(&mut self, value: ConstValue) -> usize {
        for (i, c) in self.constants.iter().enumerate() {
            if c == &value {
                return i;
            }
        }
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Emits a placeholder jump, to be patched once the destination is
    /// known (teacher's `emit_jump`/`patch_jump` pair, generalized to
    /// index-based targets instead of byte offsets).
    pub fn emit_jump(&mut self, op: OpCode, line: usize) -> usize {
        self.emit(op, Operand::Jump(usize::MAX), line)
    }

    pub fn patch_jump(&mut self, at: usize) {
        let target = self.code.len();
        self.code[at].operand = Operand::Jump(target);
    }

    pub fn emit_loop(&mut self, loop_start: usize, line: usize) {
        self.emit(OpCode::Loop, Operand::Jump(loop_start), line);
    }

    /// Patches the `exit` target of an `IteratorNext` instruction emitted
    /// with a placeholder, preserving the `iter_slot`/`count` recorded when
    /// the instruction was first emitted.
    pub fn patch_iter_next(&mut self, at: usize) {
        let target = self.code.len();
        if let Operand::IterNext { iter_slot, count, .. } = self.code[at].operand {
            self.code[at].operand = Operand::IterNext { iter_slot, count, exit: target };
        }
    }
}

pub type ChunkRef = Rc<Chunk>;
