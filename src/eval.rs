// File: src/eval.rs
//
// `eval`/`loadScript`/`requireScript` (spec.md §3 "Eval/load": compile-and-
// execute string/file in nested context"). Each compiles a fresh chunk and
// runs it via `Thread::interpret`, which pushes its own execution context so
// a `throw` or implicit top-level value from the nested source never
// unwinds past the call that triggered it (spec.md §3, §9).

use crate::compiler::Compiler;
use crate::errors::{ErrorClass, RuntimeError};
use crate::iseq::ChunkRef;
use crate::object::{NativeObj, ObjKind};
use crate::optimizer;
use crate::parser;
use crate::value::Value;
use crate::vm::Thread;
use std::rc::Rc;

fn compile(source: &str, file: Option<&str>) -> Result<ChunkRef, RuntimeError> {
    let label = file.unwrap_or("<eval>");
    let stmts = parser::parse_source(source)
        .map_err(|e| RuntimeError::new(ErrorClass::SyntaxError, format!("{label}:{}: {}", e.location.line, e.message)))?;
    let mut chunk = Compiler::compile_keep_last(&stmts)
        .map_err(|e| RuntimeError::new(ErrorClass::SyntaxError, format!("{label}:{}: {}", e.location.line, e.message)))?;
    optimizer::optimize(&mut chunk, true);
    Ok(Rc::new(chunk))
}

/// Compiles and runs `source` in a fresh execution context, returning
/// whatever value the last top-level expression statement produced.
pub fn eval_str(thread: &mut Thread, source: &str) -> Result<Value, RuntimeError> {
    let chunk = compile(source, None)?;
    thread.interpret(chunk, None)
}

/// Reads, compiles and runs the file at `path` in a fresh execution context.
pub fn load_script(thread: &mut Thread, path: &str) -> Result<Value, RuntimeError> {
    let source =
        std::fs::read_to_string(path).map_err(|e| RuntimeError::new(ErrorClass::LoadError, format!("cannot load '{path}': {e}")))?;
    let chunk = compile(&source, Some(path))?;
    thread.interpret(chunk, Some(path.to_string()))
}

/// Like `load_script`, but runs the file at most once per thread (tracked by
/// canonicalized path); subsequent calls are a no-op returning `false`.
pub fn require_script(thread: &mut Thread, path: &str) -> Result<Value, RuntimeError> {
    let canonical = std::fs::canonicalize(path)
        .map_err(|e| RuntimeError::new(ErrorClass::LoadError, format!("cannot load '{path}': {e}")))?
        .to_string_lossy()
        .into_owned();
    if thread.required.contains(&canonical) {
        return Ok(Value::Bool(false));
    }
    load_script(thread, path)?;
    thread.required.insert(canonical);
    Ok(Value::Bool(true))
}

fn string_arg(thread: &Thread, args: &[Value], idx: usize, fn_name: &str) -> Result<String, RuntimeError> {
    if let Some(Value::Object(r)) = args.get(idx) {
        if let ObjKind::String { value, .. } = &thread.heap.get(*r).kind {
            return Ok(value.clone());
        }
    }
    Err(RuntimeError::new(ErrorClass::TypeError, format!("{fn_name}() expects a string argument")))
}

fn native_eval(thread: &mut Thread, args: &[Value]) -> Result<Value, RuntimeError> {
    let source = string_arg(thread, args, 0, "eval")?;
    eval_str(thread, &source)
}

fn native_load_script(thread: &mut Thread, args: &[Value]) -> Result<Value, RuntimeError> {
    let path = string_arg(thread, args, 0, "loadScript")?;
    load_script(thread, &path)
}

fn native_require_script(thread: &mut Thread, args: &[Value]) -> Result<Value, RuntimeError> {
    let path = string_arg(thread, args, 0, "requireScript")?;
    require_script(thread, &path)
}

/// Registers `eval`/`loadScript`/`requireScript` as globals (spec.md §6's
/// reserved-identifier list: redefining any of them is a `NameError`, which
/// the compiler's global-definition path enforces, not this module).
pub fn install(thread: &mut Thread) {
    let natives: [(&str, i32, crate::object::NativeFn); 3] = [
        ("eval", 1, native_eval),
        ("loadScript", 1, native_load_script),
        ("requireScript", 1, native_require_script),
    ];
    for (name, arity, func) in natives {
        let obj_ref = thread.heap.alloc(ObjKind::Native(NativeObj { name: name.to_string(), arity, func }));
        thread.globals.insert(name.to_string(), Value::Object(obj_ref));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_runs_nested_source_and_returns_last_value() {
        let mut thread = Thread::new();
        let result = eval_str(&mut thread, "1 + 2;").unwrap();
        assert_eq!(result, Value::Number(3.0));
    }

    #[test]
    fn eval_syntax_error_is_a_catchable_runtime_error() {
        let mut thread = Thread::new();
        let err = eval_str(&mut thread, "var = ;").unwrap_err();
        assert_eq!(err.class, ErrorClass::SyntaxError);
    }

    #[test]
    fn require_script_runs_only_once() {
        let mut thread = Thread::new();
        let dir = std::env::temp_dir();
        let path = dir.join(format!("ruff_eval_test_{}.ruff", std::process::id()));
        std::fs::write(&path, "var x = 1;").unwrap();
        let path_str = path.to_string_lossy().into_owned();
        let first = require_script(&mut thread, &path_str).unwrap();
        let second = require_script(&mut thread, &path_str).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(first, Value::Bool(true));
        assert_eq!(second, Value::Bool(false));
    }
}
