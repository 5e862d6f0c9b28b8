// File: src/object.rs
//
// Heap object kinds (spec.md §3 "Key object kinds"). Every heap-resident
// value is an `Obj`, tagged by `ObjKind`, wrapped in a `GcHeader` carrying
// the mark bits the collector needs (see `gc.rs`).

use crate::errors::ErrorClass;
use crate::gc::GcRef;
use crate::iseq::Chunk;
use crate::value::Value;
use ahash::AHashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Young,
    Old,
}

/// Mark-and-sweep bookkeeping carried alongside every heap object.
#[derive(Debug, Clone)]
pub struct GcHeader {
    pub marked: bool,
    pub generation: Generation,
    pub frozen: bool,
    pub no_gc: bool,
}

impl Default for GcHeader {
    fn default() -> Self {
        GcHeader { marked: false, generation: Generation::Young, frozen: false, no_gc: false }
    }
}

#[derive(Debug, Clone)]
pub struct UpvalueObj {
    /// `Some(stack_index)` while open, `None` once closed (value moved
    /// into `closed`).
    pub location: Option<usize>,
    pub closed: Value,
}

#[derive(Debug, Clone)]
pub struct FunctionObj {
    pub name: String,
    pub arity: usize,
    pub chunk: Rc<Chunk>,
    pub upvalue_count: usize,
}

#[derive(Debug, Clone)]
pub struct UpvalueDesc {
    /// `true` if this upvalue captures a local slot of the immediately
    /// enclosing function, `false` if it captures one of the enclosing
    /// function's own upvalues.
    pub is_local: bool,
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct ClosureObj {
    pub function: GcRef,
    pub upvalues: Vec<GcRef>,
}

pub type NativeFn = fn(&mut crate::vm::Thread, &[Value]) -> Result<Value, crate::errors::RuntimeError>;

#[derive(Clone)]
pub struct NativeObj {
    pub name: String,
    pub arity: i32,
    pub func: NativeFn,
}

impl std::fmt::Debug for NativeObj {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "<native {}>", self.name)
    }
}

#[derive(Debug, Clone)]
pub struct BoundMethodObj {
    pub receiver: Value,
    pub method: GcRef,
}

/// A class or module in the ancestor chain. `IClass` wraps a module so it
/// participates transparently in `superclass` lookup (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct ClassObj {
    pub name: String,
    pub superclass: Option<GcRef>,
    pub methods: AHashMap<String, GcRef>,
    pub getters: AHashMap<String, GcRef>,
    pub setters: AHashMap<String, GcRef>,
    pub static_methods: AHashMap<String, GcRef>,
    pub is_module: bool,
    pub is_singleton: bool,
    /// Set for synthetic `IClass` links inserted when a module is
    /// included; names the module it wraps.
    pub included_module: Option<GcRef>,
}

impl ClassObj {
    pub fn new(name: impl Into<String>, superclass: Option<GcRef>) -> Self {
        ClassObj {
            name: name.into(),
            superclass,
            methods: AHashMap::new(),
            getters: AHashMap::new(),
            setters: AHashMap::new(),
            static_methods: AHashMap::new(),
            is_module: false,
            is_singleton: false,
            included_module: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstanceObj {
    pub class: GcRef,
    pub fields: AHashMap<String, Value>,
    /// Present when this instance is a thrown error's payload.
    pub error_class: Option<ErrorClass>,
    pub singleton: Option<GcRef>,
}

impl InstanceObj {
    pub fn new(class: GcRef) -> Self {
        InstanceObj { class, fields: AHashMap::new(), error_class: None, singleton: None }
    }
}

#[derive(Debug, Clone)]
pub struct RegexObj {
    pub source: String,
    pub flags: String,
    pub program: Rc<crate::regex::Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjKind {
    /// `mutable` distinguishes Dynamic/Immutable (false) content-frozen
    /// strings from Static (true) interned-and-frozen ones, per
    /// `ast::StringKind`.
    String { value: String, interned: bool },
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Function(FunctionObj),
    Closure(ClosureObj),
    Upvalue(UpvalueObj),
    Native(NativeObj),
    BoundMethod(BoundMethodObj),
    Class(ClassObj),
    Instance(InstanceObj),
    Regex(RegexObj),
    /// Opaque scratch cell used for iterator state and similar
    /// VM-internal bookkeeping that needs to live on the GC heap.
    Internal(Vec<Value>),
}

impl PartialEq for FunctionObj {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.arity == other.arity
    }
}
impl PartialEq for ClosureObj {
    fn eq(&self, other: &Self) -> bool {
        self.function == other.function && self.upvalues == other.upvalues
    }
}
impl PartialEq for UpvalueObj {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
    }
}
impl PartialEq for NativeObj {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl PartialEq for BoundMethodObj {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
    }
}
impl PartialEq for ClassObj {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl PartialEq for InstanceObj {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
    }
}
impl PartialEq for RegexObj {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Obj {
    pub header: GcHeader,
    pub kind: ObjKind,
}

impl Obj {
    pub fn new(kind: ObjKind) -> Self {
        Obj { header: GcHeader::default(), kind }
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ObjKind::String { .. } => "String",
            ObjKind::Array(_) => "Array",
            ObjKind::Map(_) => "Map",
            ObjKind::Function(_) => "Function",
            ObjKind::Closure(_) => "Function",
            ObjKind::Upvalue(_) => "Upvalue",
            ObjKind::Native(_) => "Function",
            ObjKind::BoundMethod(_) => "Function",
            ObjKind::Class(c) if c.is_module => "Module",
            ObjKind::Class(_) => "Class",
            ObjKind::Instance(_) => "Object",
            ObjKind::Regex(_) => "Regex",
            ObjKind::Internal(_) => "Internal",
        }
    }
}
