// End-to-end scenarios and boundary behaviors run through the public
// lexer -> parser -> compiler -> optimizer -> vm pipeline, the same one
// `main.rs`/`repl.rs` drive.

use loxi::compiler::Compiler;
use loxi::errors::ErrorClass;
use loxi::iseq::OpCode;
use loxi::optimizer;
use loxi::parser::parse_source;
use loxi::value::Value;
use loxi::vm::Thread;

fn run(src: &str) -> Result<Value, loxi::errors::RuntimeError> {
    let stmts = parse_source(src).expect("parse");
    let mut chunk = Compiler::compile_keep_last(&stmts).expect("compile");
    optimizer::optimize(&mut chunk, true);
    let mut thread = Thread::new();
    thread.interpret(std::rc::Rc::new(chunk), None)
}

#[test]
fn s1_arithmetic_and_globals() {
    let src = "var a; a = 1; a + 2;";
    let stmts = parse_source(src).unwrap();
    let mut chunk = Compiler::compile_keep_last(&stmts).unwrap();
    optimizer::optimize(&mut chunk, true);
    let mut thread = Thread::new();
    let result = thread.interpret(std::rc::Rc::new(chunk), None).unwrap();
    assert_eq!(result, Value::Number(3.0));
    assert_eq!(thread.globals.get("a"), Some(&Value::Number(1.0)));
}

#[test]
fn s2_local_shadowing_pops_on_scope_exit() {
    let src = r#"var a = "outer"; if (true) { var a = "in block"; a; } a;"#;
    let stmts = parse_source(src).unwrap();
    let mut chunk = Compiler::compile_keep_last(&stmts).unwrap();
    optimizer::optimize(&mut chunk, true);
    let mut thread = Thread::new();
    let v = thread.interpret(std::rc::Rc::new(chunk), None).unwrap();
    assert_eq!(thread.display_value(v), "outer");
}

#[test]
fn s3_closure_over_loop_captured_variable() {
    let src = r#"
        fun adder(a) { return fun(b) { return a + b; }; }
        var add10 = adder(10);
        var x = add10(20);
        var y = add10(40);
        [x, y];
    "#;
    let stmts = parse_source(src).unwrap();
    let mut chunk = Compiler::compile_keep_last(&stmts).unwrap();
    optimizer::optimize(&mut chunk, true);
    let mut thread = Thread::new();
    let v = thread.interpret(std::rc::Rc::new(chunk), None).unwrap();
    let items = match &thread.heap.get(v.as_object().unwrap()).kind {
        loxi::object::ObjKind::Array(items) => items.clone(),
        other => panic!("expected array, got {other:?}"),
    };
    assert_eq!(items, vec![Value::Number(30.0), Value::Number(50.0)]);
}

#[test]
fn s4_try_catch_across_function_boundary() {
    let src = r#"
        class MyError < Error { }
        fun doThrow() { throw MyError(); }
        try { doThrow(); } catch (MyError e) { e; }
    "#;
    let stmts = parse_source(src).unwrap();
    let mut chunk = Compiler::compile_keep_last(&stmts).unwrap();
    optimizer::optimize(&mut chunk, true);
    let mut thread = Thread::new();
    let result = thread.interpret(std::rc::Rc::new(chunk), None).unwrap();
    let r = result.as_object().expect("lastValue is an instance");
    match &thread.heap.get(r).kind {
        loxi::object::ObjKind::Instance(i) => {
            let class_name = match &thread.heap.get(i.class).kind {
                loxi::object::ObjKind::Class(c) => c.name.clone(),
                _ => panic!("class field isn't a class"),
            };
            assert_eq!(class_name, "MyError");
        }
        other => panic!("expected an instance, got {other:?}"),
    }
}

#[test]
fn s5_super_dispatch() {
    let src = r#"
        class A { greet() { return "A"; } }
        class B < A { greet() { return super.greet() + "B"; } }
        B().greet();
    "#;
    let mut thread = Thread::new();
    let stmts = parse_source(src).unwrap();
    let mut chunk = Compiler::compile_keep_last(&stmts).unwrap();
    optimizer::optimize(&mut chunk, true);
    let v = thread.interpret(std::rc::Rc::new(chunk), None).unwrap();
    assert_eq!(thread.display_value(v), "AB");
}

#[test]
fn s6_constant_folding_leaves_no_arithmetic_opcodes() {
    let stmts = parse_source("1+2*3;").unwrap();
    let mut chunk = Compiler::compile(&stmts).unwrap();
    optimizer::optimize(&mut chunk, false);
    assert!(!chunk.code.iter().any(|i| matches!(i.op, OpCode::Add | OpCode::Multiply)));
    let constants: Vec<_> = chunk.code.iter().filter(|i| matches!(i.op, OpCode::Constant)).collect();
    assert_eq!(constants.len(), 1);
}

#[test]
fn boundary_locals_limit_is_a_compile_error() {
    let mut src = String::from("fun f() {\n");
    for i in 0..257 {
        src.push_str(&format!("var x{i} = {i};\n"));
    }
    src.push_str("}\n");
    let stmts = parse_source(&src).unwrap();
    assert!(Compiler::compile(&stmts).is_err());
}

#[test]
fn boundary_stack_overflow_is_a_runtime_error_not_a_crash() {
    let src = r#"
        fun rec(n) { if (n <= 0) { return 0; } return rec(n - 1) + 1; }
        rec(100000);
    "#;
    let err = run(src).unwrap_err();
    assert_eq!(err.class, ErrorClass::RecursionError);
}

#[test]
fn boundary_division_by_zero_raises() {
    let err = run("1 / 0;").unwrap_err();
    assert_eq!(err.class, ErrorClass::ZeroDivisionError);
}

#[test]
fn boundary_empty_regex_matches_at_position_zero() {
    let node = loxi::regex::parse("").unwrap();
    assert!(loxi::regex::is_match(&node, ""));
    assert!(loxi::regex::is_match(&node, "anything"));
    let m = loxi::regex::find(&node, "anything", 0).expect("matches at 0");
    assert_eq!(m.start, 0);
    assert_eq!(m.end, 0);
}

#[test]
fn boundary_uncaught_error_does_not_panic() {
    let result = run(r#"throw Error();"#);
    assert!(result.is_err());
}
