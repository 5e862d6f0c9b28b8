// File: src/builtins.rs
//
// The handful of always-present global natives that aren't `eval`/
// `loadScript`/`requireScript` (those live in `eval.rs`): `clock`, `typeof`,
// `classof`, `debugger`, `yield`, `blockGiven`, `sleep`. Registered the same
// way `eval::install` registers its natives — a `NativeObj` per name,
// inserted straight into `Thread::globals`.

use crate::errors::{ErrorClass, RuntimeError};
use crate::object::{NativeObj, ObjKind};
use crate::value::Value;
use crate::vm::Thread;
use std::time::{SystemTime, UNIX_EPOCH};

fn native_clock(_thread: &mut Thread, _args: &[Value]) -> Result<Value, RuntimeError> {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0);
    Ok(Value::Number(secs))
}

/// Tag names per the reserved-global list: `nil`, `bool`, `number`,
/// `string`, `array`, `map`, `instance`, `class`, `module`, `function`,
/// `regex`.
fn native_typeof(thread: &mut Thread, args: &[Value]) -> Result<Value, RuntimeError> {
    let v = args.first().copied().unwrap_or(Value::Nil);
    let tag = match v {
        Value::Nil | Value::Undef => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::Object(r) => match &thread.heap.get(r).kind {
            ObjKind::String { .. } => "string",
            ObjKind::Array(_) => "array",
            ObjKind::Map(_) => "map",
            ObjKind::Function(_) | ObjKind::Closure(_) | ObjKind::Native(_) | ObjKind::BoundMethod(_) => "function",
            ObjKind::Class(c) if c.is_module => "module",
            ObjKind::Class(_) => "class",
            ObjKind::Instance(_) => "instance",
            ObjKind::Regex(_) => "regex",
            ObjKind::Upvalue(_) | ObjKind::Internal(_) => "instance",
        },
    };
    Ok(alloc_string(thread, tag.to_string()))
}

/// The value's runtime class object: the bootstrapped class for a
/// primitive, `Instance::class` for an instance, or the class itself for a
/// class/module (spec.md §3 class DAG).
fn native_classof(thread: &mut Thread, args: &[Value]) -> Result<Value, RuntimeError> {
    let v = args.first().copied().unwrap_or(Value::Nil);
    let class_ref = match v {
        Value::Nil | Value::Undef | Value::Bool(_) => thread.builtins.object_class,
        Value::Number(_) => thread.builtins.object_class,
        Value::Object(r) => match &thread.heap.get(r).kind {
            ObjKind::String { .. } => thread.builtins.string_class,
            ObjKind::Array(_) => thread.builtins.array_class,
            ObjKind::Map(_) => thread.builtins.map_class,
            ObjKind::Instance(i) => i.class,
            ObjKind::Class(_) => thread.builtins.class_class,
            _ => thread.builtins.object_class,
        },
    };
    Ok(Value::Object(class_ref))
}

/// The core interpreter has no debugger UI (spec.md §1 Non-goals); the
/// global exists only so scripts written against a host that does provide
/// one still parse and run, as a no-op breakpoint.
fn native_debugger(_thread: &mut Thread, _args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Nil)
}

/// Calls the block passed to the *calling* frame with `args`, or raises if
/// none was given (spec.md §4.4 `CallInfo.blockInstance`).
fn native_yield(thread: &mut Thread, args: &[Value]) -> Result<Value, RuntimeError> {
    let block = thread.current_block();
    if block.is_nil() || block.is_undef() {
        return Err(RuntimeError::new(ErrorClass::ArgumentError, "no block given (yield)"));
    }
    thread.call_value(block, args.to_vec())
}

fn native_block_given(thread: &mut Thread, _args: &[Value]) -> Result<Value, RuntimeError> {
    let block = thread.current_block();
    Ok(Value::Bool(!block.is_nil() && !block.is_undef()))
}

fn native_sleep(_thread: &mut Thread, args: &[Value]) -> Result<Value, RuntimeError> {
    let secs = match args.first() {
        Some(Value::Number(n)) if *n >= 0.0 => *n,
        _ => return Err(RuntimeError::new(ErrorClass::TypeError, "sleep() expects a non-negative number of seconds")),
    };
    std::thread::sleep(std::time::Duration::from_secs_f64(secs));
    Ok(Value::Nil)
}

fn alloc_string(thread: &mut Thread, s: String) -> Value {
    Value::Object(thread.heap.alloc(ObjKind::String { value: s, interned: false }))
}

/// Registers the built-in globals spec.md §6 reserves beyond `eval`'s
/// (redefining any of them is a `NameError`, enforced by the compiler's
/// global-definition path, not this module).
pub fn install(thread: &mut Thread) {
    let natives: [(&str, i32, crate::object::NativeFn); 7] = [
        ("clock", 0, native_clock),
        ("typeof", 1, native_typeof),
        ("classof", 1, native_classof),
        ("debugger", 0, native_debugger),
        ("yield", -1, native_yield),
        ("blockGiven", 0, native_block_given),
        ("sleep", 1, native_sleep),
    ];
    for (name, arity, func) in natives {
        let obj_ref = thread.heap.alloc(ObjKind::Native(NativeObj { name: name.to_string(), arity, func }));
        thread.globals.insert(name.to_string(), Value::Object(obj_ref));
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
        let mut chunk = Compiler::compile_keep_last(&stmts).unwrap();
        optimizer::optimize(&mut chunk, false);
        let mut thread = Thread::new();
        thread.interpret(std::rc::Rc::new(chunk), None).unwrap()
    }

    #[test]
    fn typeof_tags_primitives_and_objects() {
        let mut thread = Thread::new();
        let tag = native_typeof(&mut thread, &[Value::Number(1.0)]).unwrap();
        match tag {
            Value::Object(r) => match &thread.heap.get(r).kind {
                ObjKind::String { value, .. } => assert_eq!(value, "number"),
                _ => panic!("expected string"),
            },
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn block_given_false_with_no_block() {
        let v = run_src("fun f() { return blockGiven(); } return f();");
        assert_eq!(v, Value::Bool(false));
    }

    #[test]
    fn yield_invokes_the_passed_block() {
        let v = run_src(
            "fun twice(&block) { yield(1); return yield(2); } \
             fun double(x) { return x * 10; } \
             return twice(&double);",
        );
        assert_eq!(v, Value::Number(20.0));
    }

    #[test]
    fn yield_without_block_raises_argument_error() {
        let v = run_src(
            "fun f() { \
               try { yield(1); } catch (ArgumentError e) { return e.message; } \
             } \
             return f();",
        );
        match v {
            Value::Object(_) => {}
            other => panic!("expected a string message, got {other:?}"),
        }
    }
}
