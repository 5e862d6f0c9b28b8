// File: src/compiler.rs
//
// Single-pass AST-to-bytecode compiler (spec.md §4.1). Storage-class
// resolution follows local -> upvalue -> global; scope exit emits
// CLOSE_UPVALUE for captured locals and POP for everything else.

use crate::ast::*;
use crate::errors::{CompileError, SourceLocation};
use crate::iseq::{CatchRow, Chunk, ConstValue, Operand, OpCode, ParamSpec, UpvalueDesc};
use std::rc::Rc;

const MAX_LOCALS: usize = 256;
const MAX_UPVALUES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

struct Local {
    name: String,
    depth: i32,
    captured: bool,
}

struct LoopCtx {
    start: usize,
    scope_depth: i32,
    break_jumps: Vec<usize>,
}

struct ClassCtx {
    has_superclass: bool,
}

struct Frame {
    chunk: Chunk,
    kind: FunctionKind,
    locals: Vec<Local>,
    upvalue_names: Vec<String>,
    scope_depth: i32,
    loops: Vec<LoopCtx>,
}

impl Frame {
    fn new(name: impl Into<String>, kind: FunctionKind) -> Self {
        let chunk = Chunk::new(name);
        // Slot 0 is reserved: `this` in methods/initializers, unnamed
        // (never resolvable) for plain functions and the top-level script.
        let reserved = if matches!(kind, FunctionKind::Method | FunctionKind::Initializer) {
            "this"
        } else {
            ""
        };
        Frame {
            chunk,
            kind,
            locals: vec![Local { name: reserved.to_string(), depth: 0, captured: false }],
            upvalue_names: Vec::new(),
            scope_depth: 0,
            loops: Vec::new(),
        }
    }
}

pub struct Compiler {
    frames: Vec<Frame>,
    classes: Vec<ClassCtx>,
}

type CResult<T> = Result<T, CompileError>;

impl Compiler {
    pub fn new() -> Self {
        Compiler { frames: vec![Frame::new("<script>", FunctionKind::Script)], classes: Vec::new() }
    }

    pub fn compile(stmts: &[Stmt]) -> CResult<Chunk> {
        Self::compile_inner(stmts, false)
    }

    /// Like `compile`, but if the program's final statement is a bare
    /// expression, its value is left on the stack and returned instead of
    /// popped and discarded. Used by the REPL and `eval()` so the last
    /// expression's value round-trips (spec.md §8: "for any pure
    /// expression, `print expr` produces the same bytes as
    /// `print eval(\"expr\")`").
    pub fn compile_keep_last(stmts: &[Stmt]) -> CResult<Chunk> {
        Self::compile_inner(stmts, true)
    }

    fn compile_inner(stmts: &[Stmt], keep_last: bool) -> CResult<Chunk> {
        let mut c = Compiler::new();
        for (i, s) in stmts.iter().enumerate() {
            if keep_last && i == stmts.len() - 1 {
                if let Stmt::Expr(e) = s {
                    c.expression(e)?;
                    c.emit(OpCode::Return, Operand::None, 0);
                    return Ok(c.frames.pop().unwrap().chunk);
                }
            }
            c.statement(s)?;
        }
        c.emit(OpCode::Nil, Operand::None, 0);
        c.emit(OpCode::Return, Operand::None, 0);
        Ok(c.frames.pop().unwrap().chunk)
    }

    fn cur(&mut self) -> &mut Frame {
        self.frames.last_mut().unwrap()
    }

    fn frame_idx(&self) -> usize {
        self.frames.len() - 1
    }

    fn emit(&mut self, op: OpCode, operand: Operand, line: usize) -> usize {
        self.cur().chunk.emit(op, operand, line)
    }

    fn identifier_constant(&mut self, name: &str) -> usize {
        self.cur().chunk.add_constant(ConstValue::Str { value: name.to_string(), kind: StringKind::Static })
    }

    fn begin_scope(&mut self) {
        self.cur().scope_depth += 1;
    }

    fn end_scope(&mut self, line: usize) {
        self.cur().scope_depth -= 1;
        let depth = self.cur().scope_depth;
        while let Some(local) = self.cur().locals.last() {
            if local.depth <= depth {
                break;
            }
            let captured = local.captured;
            self.cur().locals.pop();
            if captured {
                self.emit(OpCode::CloseUpvalue, Operand::None, line);
            } else {
                self.emit(OpCode::Pop, Operand::None, line);
            }
        }
    }

    fn resolve_local(&self, frame: usize, name: &str) -> Option<usize> {
        self.frames[frame].locals.iter().enumerate().rev().find(|(_, l)| l.name == name).map(|(i, _)| i)
    }

    fn add_upvalue(&mut self, frame: usize, index: usize, is_local: bool, name: &str) -> CResult<usize> {
        if let Some(i) = self.frames[frame].upvalue_names.iter().position(|n| n == name) {
            return Ok(i);
        }
        if self.frames[frame].chunk.upvalues.len() >= MAX_UPVALUES {
            return Err(CompileError::new("too many captured variables in one function", SourceLocation::unknown()));
        }
        self.frames[frame].chunk.upvalues.push(UpvalueDesc { is_local, index });
        self.frames[frame].upvalue_names.push(name.to_string());
        Ok(self.frames[frame].chunk.upvalues.len() - 1)
    }

    fn resolve_upvalue(&mut self, frame: usize, name: &str) -> CResult<Option<usize>> {
        if frame == 0 {
            return Ok(None);
        }
        if let Some(local_idx) = self.resolve_local(frame - 1, name) {
            self.frames[frame - 1].locals[local_idx].captured = true;
            return Ok(Some(self.add_upvalue(frame, local_idx, true, name)?));
        }
        if let Some(up_idx) = self.resolve_upvalue(frame - 1, name)? {
            return Ok(Some(self.add_upvalue(frame, up_idx, false, name)?));
        }
        Ok(None)
    }

    fn named_variable_get(&mut self, name: &str, line: usize) -> CResult<()> {
        let frame = self.frame_idx();
        if let Some(idx) = self.resolve_local(frame, name) {
            self.emit(OpCode::GetLocal, Operand::Index(idx), line);
        } else if let Some(idx) = self.resolve_upvalue(frame, name)? {
            self.emit(OpCode::GetUpvalue, Operand::Index(idx), line);
        } else {
            let idx = self.identifier_constant(name);
            self.emit(OpCode::GetGlobal, Operand::Index(idx), line);
        }
        Ok(())
    }

    fn named_variable_set(&mut self, name: &str, line: usize) -> CResult<()> {
        let frame = self.frame_idx();
        if let Some(idx) = self.resolve_local(frame, name) {
            self.emit(OpCode::SetLocal, Operand::Index(idx), line);
        } else if let Some(idx) = self.resolve_upvalue(frame, name)? {
            self.emit(OpCode::SetUpvalue, Operand::Index(idx), line);
        } else {
            let idx = self.identifier_constant(name);
            self.emit(OpCode::SetGlobal, Operand::Index(idx), line);
        }
        Ok(())
    }

    fn declare_variable(&mut self, name: &str) -> CResult<()> {
        let depth = self.cur().scope_depth;
        if depth == 0 {
            return Ok(());
        }
        if self.cur().locals.iter().rev().take_while(|l| l.depth == depth).any(|l| l.name == name) {
            return Err(CompileError::new(
                format!("a variable named '{name}' is already declared in this scope"),
                SourceLocation::unknown(),
            ));
        }
        if self.cur().locals.len() >= MAX_LOCALS {
            return Err(CompileError::new("too many local variables in one function", SourceLocation::unknown()));
        }
        self.cur().locals.push(Local { name: name.to_string(), depth, captured: false });
        Ok(())
    }

    fn define_variable(&mut self, name: &str, line: usize) {
        if self.cur().scope_depth == 0 {
            let idx = self.identifier_constant(name);
            self.emit(OpCode::DefineGlobal, Operand::Index(idx), line);
        }
        // Locals need no instruction: the value is already sitting in the
        // slot that `declare_variable` reserved.
    }

    // ---- statements ----

    fn statement(&mut self, stmt: &Stmt) -> CResult<()> {
        match stmt {
            Stmt::Expr(e) => {
                self.expression(e)?;
                self.emit(OpCode::Pop, Operand::None, 0);
            }
            Stmt::Print(e) => {
                self.expression(e)?;
                self.emit(OpCode::Print, Operand::None, 0);
            }
            Stmt::VarDecl { name, init } => {
                match init {
                    Some(e) => self.expression(e)?,
                    None => {
                        self.emit(OpCode::Nil, Operand::None, 0);
                    }
                }
                self.declare_variable(name)?;
                self.define_variable(name, 0);
            }
            Stmt::Block(stmts) => {
                self.begin_scope();
                for s in stmts {
                    self.statement(s)?;
                }
                self.end_scope(0);
            }
            Stmt::If { condition, then_branch, else_branch } => self.if_stmt(condition, then_branch, else_branch)?,
            Stmt::While { condition, body } => self.while_stmt(condition, body)?,
            Stmt::Foreach { vars, iterable, body, line } => self.foreach_stmt(vars, iterable, body, *line)?,
            Stmt::Break => self.break_stmt()?,
            Stmt::Continue => self.continue_stmt()?,
            Stmt::Return(value, line) => {
                if self.cur().kind == FunctionKind::Script {
                    return Err(CompileError::new("cannot return from top-level code", SourceLocation::unknown()));
                }
                if self.cur().kind == FunctionKind::Initializer {
                    if value.is_some() {
                        return Err(CompileError::new("cannot return a value from 'init'", SourceLocation::unknown()));
                    }
                    self.emit(OpCode::GetLocal, Operand::Index(0), *line);
                } else {
                    match value {
                        Some(e) => self.expression(e)?,
                        None => {
                            self.emit(OpCode::Nil, Operand::None, *line);
                        }
                    }
                }
                self.emit(OpCode::Return, Operand::None, *line);
            }
            Stmt::FunctionDecl(node) => {
                let name = node.name.clone().expect("function declarations are always named");
                self.declare_variable(&name)?;
                let chunk = self.function(node, FunctionKind::Function)?;
                self.emit_closure(chunk, node.line);
                self.define_variable(&name, node.line);
            }
            Stmt::ClassDecl { name, superclass, methods, line } => {
                self.class_decl(name, superclass.as_deref(), methods, *line)?
            }
            Stmt::ModuleDecl { name, methods, line } => self.module_decl(name, methods, *line)?,
            Stmt::Try { body, catches, ensure } => self.try_stmt(body, catches, ensure)?,
            Stmt::Throw(e, line) => {
                self.expression(e)?;
                self.emit(OpCode::Throw, Operand::None, *line);
            }
        }
        Ok(())
    }

    fn if_stmt(&mut self, condition: &Expr, then_b: &[Stmt], else_b: &Option<Vec<Stmt>>) -> CResult<()> {
        self.expression(condition)?;
        let then_jump = self.cur().chunk.emit_jump(OpCode::JumpIfFalse, 0);
        self.emit(OpCode::Pop, Operand::None, 0);
        self.begin_scope();
        for s in then_b {
            self.statement(s)?;
        }
        self.end_scope(0);
        let else_jump = self.cur().chunk.emit_jump(OpCode::Jump, 0);
        self.cur().chunk.patch_jump(then_jump);
        self.emit(OpCode::Pop, Operand::None, 0);
        if let Some(else_stmts) = else_b {
            self.begin_scope();
            for s in else_stmts {
                self.statement(s)?;
            }
            self.end_scope(0);
        }
        self.cur().chunk.patch_jump(else_jump);
        Ok(())
    }

    fn while_stmt(&mut self, condition: &Expr, body: &[Stmt]) -> CResult<()> {
        let loop_start = self.cur().chunk.code.len();
        self.expression(condition)?;
        let exit_jump = self.cur().chunk.emit_jump(OpCode::JumpIfFalse, 0);
        self.emit(OpCode::Pop, Operand::None, 0);
        self.cur().loops.push(LoopCtx { start: loop_start, scope_depth: self.cur().scope_depth, break_jumps: Vec::new() });
        self.begin_scope();
        for s in body {
            self.statement(s)?;
        }
        self.end_scope(0);
        self.cur().chunk.emit_loop(loop_start, 0);
        self.cur().chunk.patch_jump(exit_jump);
        self.emit(OpCode::Pop, Operand::None, 0);
        let loop_ctx = self.cur().loops.pop().unwrap();
        for j in loop_ctx.break_jumps {
            self.cur().chunk.patch_jump(j);
        }
        Ok(())
    }

    fn foreach_stmt(&mut self, vars: &[String], iterable: &Expr, body: &[Stmt], line: usize) -> CResult<()> {
        self.begin_scope();
        self.expression(iterable)?;
        // GetIterator pushes two values: the iterator object and an arity
        // tag distinguishing single-value (array) from key/value (map)
        // iteration, so two anonymous locals are reserved to hold them.
        self.emit(OpCode::GetIterator, Operand::None, line);
        self.cur().locals.push(Local { name: String::new(), depth: self.cur().scope_depth, captured: false });
        self.cur().locals.push(Local { name: String::new(), depth: self.cur().scope_depth, captured: false });
        let iter_slot = self.cur().locals.len() - 2;

        let loop_start = self.cur().chunk.code.len();
        let exit_jump = self.emit(
            OpCode::IteratorNext,
            Operand::IterNext { iter_slot, count: vars.len(), exit: usize::MAX },
            line,
        );

        self.cur().loops.push(LoopCtx { start: loop_start, scope_depth: self.cur().scope_depth, break_jumps: Vec::new() });
        self.begin_scope();
        for v in vars {
            self.cur().locals.push(Local { name: v.clone(), depth: self.cur().scope_depth, captured: false });
        }
        for s in body {
            self.statement(s)?;
        }
        self.end_scope(line);
        self.cur().chunk.emit_loop(loop_start, line);
        self.cur().chunk.patch_iter_next(exit_jump);
        let loop_ctx = self.cur().loops.pop().unwrap();
        for j in loop_ctx.break_jumps {
            self.cur().chunk.patch_jump(j);
        }
        self.end_scope(line);
        Ok(())
    }

    fn loop_cleanup_pops(&mut self, target_depth: i32, line: usize) {
        let to_pop: Vec<bool> =
            self.cur().locals.iter().rev().take_while(|l| l.depth > target_depth).map(|l| l.captured).collect();
        for captured in to_pop {
            if captured {
                self.emit(OpCode::CloseUpvalue, Operand::None, line);
            } else {
                self.emit(OpCode::Pop, Operand::None, line);
            }
        }
    }

    fn break_stmt(&mut self) -> CResult<()> {
        let target_depth = {
            let l = self.cur().loops.last().ok_or_else(|| CompileError::new("'break' outside of a loop", SourceLocation::unknown()))?;
            l.scope_depth
        };
        self.loop_cleanup_pops(target_depth, 0);
        let jump = self.cur().chunk.emit_jump(OpCode::Jump, 0);
        self.cur().loops.last_mut().unwrap().break_jumps.push(jump);
        Ok(())
    }

    fn continue_stmt(&mut self) -> CResult<()> {
        let (target_depth, start) = {
            let l = self.cur().loops.last().ok_or_else(|| CompileError::new("'continue' outside of a loop", SourceLocation::unknown()))?;
            (l.scope_depth, l.start)
        };
        self.loop_cleanup_pops(target_depth, 0);
        self.cur().chunk.emit_loop(start, 0);
        Ok(())
    }

    fn function(&mut self, node: &FunctionNode, kind: FunctionKind) -> CResult<Rc<Chunk>> {
        self.frames.push(Frame::new(node.name.clone().unwrap_or_else(|| "<anonymous>".to_string()), kind));
        self.begin_scope();

        let mut required = 0usize;
        let mut params = Vec::new();
        for p in &node.params {
            self.cur().locals.push(Local { name: p.name.clone(), depth: self.cur().scope_depth, captured: false });
            let spec = match &p.kind {
                ParamKind::Required => {
                    required += 1;
                    ParamSpec::Required
                }
                ParamKind::Default(_) => ParamSpec::Optional,
                ParamKind::Splat => ParamSpec::Splat,
                ParamKind::Keyword(_) => ParamSpec::Keyword,
                ParamKind::Block => ParamSpec::Block,
            };
            params.push((p.name.clone(), spec));
        }
        self.cur().chunk.arity = required;
        self.cur().chunk.params = params;

        for (i, p) in node.params.iter().enumerate() {
            let default_expr = match &p.kind {
                ParamKind::Default(e) => Some(e),
                ParamKind::Keyword(Some(e)) => Some(e),
                _ => None,
            };
            if let Some(expr) = default_expr {
                // Params start at local index 1 — slot 0 is the reserved
                // "this"/closure slot every frame carries.
                let slot = i + 1;
                self.emit(OpCode::GetLocal, Operand::Index(slot), node.line);
                let skip = self.cur().chunk.emit_jump(OpCode::JumpIfNotUndef, node.line);
                self.emit(OpCode::Pop, Operand::None, node.line);
                self.expression(expr)?;
                self.emit(OpCode::SetLocal, Operand::Index(slot), node.line);
                self.cur().chunk.patch_jump(skip);
                self.emit(OpCode::Pop, Operand::None, node.line);
            }
        }

        for s in &node.body {
            self.statement(s)?;
        }
        if kind == FunctionKind::Initializer {
            self.emit(OpCode::GetLocal, Operand::Index(0), node.line);
        } else {
            self.emit(OpCode::Nil, Operand::None, node.line);
        }
        self.emit(OpCode::Return, Operand::None, node.line);
        self.cur().chunk.is_initializer = kind == FunctionKind::Initializer;

        let frame = self.frames.pop().unwrap();
        Ok(Rc::new(frame.chunk))
    }

    fn emit_closure(&mut self, chunk: Rc<Chunk>, line: usize) {
        let idx = self.cur().chunk.add_constant(ConstValue::Function(chunk));
        self.emit(OpCode::Closure, Operand::Index(idx), line);
    }

    fn method(&mut self, decl: &MethodDecl) -> CResult<()> {
        let kind = if decl.function.is_initializer { FunctionKind::Initializer } else { FunctionKind::Method };
        let chunk = self.function(&decl.function, kind)?;
        let line = decl.function.line;
        self.emit_closure(chunk, line);
        let name_idx = self.identifier_constant(decl.function.name.as_deref().unwrap_or(""));
        let op = match decl.kind {
            MethodKind::Method => OpCode::Method,
            MethodKind::Getter => OpCode::GetterDecl,
            MethodKind::Setter => OpCode::SetterDecl,
            MethodKind::StaticMethod => OpCode::StaticMethod,
        };
        self.emit(op, Operand::Index(name_idx), line);
        Ok(())
    }

    fn class_decl(&mut self, name: &str, superclass: Option<&str>, methods: &[MethodDecl], line: usize) -> CResult<()> {
        if superclass == Some(name) {
            return Err(CompileError::new(format!("class '{name}' cannot inherit from itself"), SourceLocation::unknown()));
        }
        let name_idx = self.identifier_constant(name);
        self.declare_variable(name)?;
        self.emit(OpCode::Class, Operand::Index(name_idx), line);
        self.define_variable(name, line);
        self.named_variable_get(name, line)?;

        self.classes.push(ClassCtx { has_superclass: superclass.is_some() });
        if let Some(super_name) = superclass {
            self.named_variable_get(super_name, line)?;
            self.emit(OpCode::Inherit, Operand::None, line);
            self.begin_scope();
            self.named_variable_get(super_name, line)?;
            self.cur().locals.push(Local { name: "super".to_string(), depth: self.cur().scope_depth, captured: false });
        }

        for m in methods {
            self.method(m)?;
        }
        self.emit(OpCode::Pop, Operand::None, line);

        if superclass.is_some() {
            self.end_scope(line);
        }
        self.classes.pop();
        Ok(())
    }

    fn module_decl(&mut self, name: &str, methods: &[MethodDecl], line: usize) -> CResult<()> {
        let name_idx = self.identifier_constant(name);
        self.declare_variable(name)?;
        self.emit(OpCode::Module, Operand::Index(name_idx), line);
        self.define_variable(name, line);
        self.named_variable_get(name, line)?;
        for m in methods {
            self.method(m)?;
        }
        self.emit(OpCode::Pop, Operand::None, line);
        Ok(())
    }

    fn try_stmt(&mut self, body: &[Stmt], catches: &[CatchClause], ensure: &Option<Vec<Stmt>>) -> CResult<()> {
        let body_start = self.cur().chunk.code.len();
        let stack_depth = self.cur().locals.len();
        self.begin_scope();
        for s in body {
            self.statement(s)?;
        }
        self.end_scope(0);
        let body_end = self.cur().chunk.code.len();

        let skip_catches = self.cur().chunk.emit_jump(OpCode::Jump, 0);
        let mut after_catch_jumps = Vec::new();

        for clause in catches {
            let target = self.cur().chunk.code.len();
            self.begin_scope();
            if let Some(binding) = &clause.binding {
                self.cur().locals.push(Local { name: binding.clone(), depth: self.cur().scope_depth, captured: false });
            } else {
                self.emit(OpCode::Pop, Operand::None, clause.line);
            }
            for s in &clause.body {
                self.statement(s)?;
            }
            self.end_scope(clause.line);
            after_catch_jumps.push(self.cur().chunk.emit_jump(OpCode::Jump, clause.line));
            self.cur().chunk.catch_table.push(CatchRow {
                from: body_start,
                to: body_end,
                target,
                class_name: Some(clause.class_name.clone()),
                is_ensure: false,
                stack_depth,
            });
        }

        self.cur().chunk.patch_jump(skip_catches);
        for j in &after_catch_jumps {
            self.cur().chunk.patch_jump(*j);
        }
        let catches_end = self.cur().chunk.code.len();

        if let Some(ensure_body) = ensure {
            let ensure_target = self.cur().chunk.code.len();
            self.begin_scope();
            for s in ensure_body {
                self.statement(s)?;
            }
            self.end_scope(0);
            self.cur().chunk.catch_table.push(CatchRow {
                from: body_start,
                to: catches_end,
                target: ensure_target,
                class_name: None,
                is_ensure: true,
                stack_depth,
            });
        }
        Ok(())
    }

    // ---- expressions ----

    fn expression(&mut self, expr: &Expr) -> CResult<()> {
        match expr {
            Expr::Nil => {
                self.emit(OpCode::Nil, Operand::None, 0);
            }
            Expr::True => {
                self.emit(OpCode::True, Operand::None, 0);
            }
            Expr::False => {
                self.emit(OpCode::False, Operand::None, 0);
            }
            Expr::Number(n) => {
                let idx = self.cur().chunk.add_constant(ConstValue::Number(*n));
                self.emit(OpCode::Constant, Operand::Index(idx), 0);
            }
            Expr::StringLit { value, kind } => {
                let idx = self.cur().chunk.add_constant(ConstValue::Str { value: value.clone(), kind: *kind });
                self.emit(OpCode::Constant, Operand::Index(idx), 0);
            }
            Expr::RegexLit { pattern, flags } => {
                let idx = self.cur().chunk.add_constant(ConstValue::Regex { pattern: pattern.clone(), flags: flags.clone() });
                self.emit(OpCode::Constant, Operand::Index(idx), 0);
            }
            Expr::Identifier(name) => self.named_variable_get(name, 0)?,
            Expr::This => {
                if self.classes.is_empty() {
                    return Err(CompileError::new("cannot use 'this' outside of a method", SourceLocation::unknown()));
                }
                self.named_variable_get("this", 0)?;
            }
            Expr::SuperGet(name) => {
                self.super_access_check()?;
                self.named_variable_get("this", 0)?;
                self.named_variable_get("super", 0)?;
                let idx = self.identifier_constant(name);
                self.emit(OpCode::GetSuper, Operand::Index(idx), 0);
            }
            Expr::SuperCall { method, args, line } => {
                self.super_access_check()?;
                self.named_variable_get("this", *line)?;
                self.compile_call_bundle(args, *line)?;
                self.named_variable_get("super", *line)?;
                let idx = self.identifier_constant(method);
                self.emit(OpCode::SuperInvoke, Operand::Index(idx), *line);
            }
            Expr::ArrayLit(elements) => {
                self.emit(OpCode::Array, Operand::None, 0);
                for el in elements {
                    match el {
                        ArrayElement::Single(e) => {
                            self.expression(e)?;
                            self.emit(OpCode::ArrayPush, Operand::None, 0);
                        }
                        ArrayElement::Spread(e) => {
                            self.expression(e)?;
                            self.emit(OpCode::ArraySpread, Operand::None, 0);
                        }
                    }
                }
            }
            Expr::Unary { op, expr, line } => {
                self.expression(expr)?;
                let opcode = match op {
                    UnaryOp::Negate => OpCode::Negate,
                    UnaryOp::Not => OpCode::Not,
                };
                self.emit(opcode, Operand::None, *line);
            }
            Expr::Binary { op, left, right, line } => {
                self.expression(left)?;
                self.expression(right)?;
                self.emit(binary_opcode(*op), Operand::None, *line);
            }
            Expr::Logical { op, left, right } => self.logical(*op, left, right)?,
            Expr::Call { callee, args, line } => {
                self.expression(callee)?;
                self.compile_call_bundle(args, *line)?;
                self.emit(OpCode::Call, Operand::None, *line);
            }
            Expr::Invoke { receiver, method, args, line } => {
                self.expression(receiver)?;
                self.compile_call_bundle(args, *line)?;
                let idx = self.identifier_constant(method);
                self.emit(OpCode::Invoke, Operand::Index(idx), *line);
            }
            Expr::Index { object, index, line } => {
                self.expression(object)?;
                self.expression(index)?;
                self.emit(OpCode::GetIndex, Operand::None, *line);
            }
            Expr::FieldGet { object, name } => {
                self.expression(object)?;
                let idx = self.identifier_constant(name);
                self.emit(OpCode::GetProperty, Operand::Index(idx), 0);
            }
            Expr::Function(node) => {
                let chunk = self.function(node, FunctionKind::Function)?;
                self.emit_closure(chunk, node.line);
            }
            Expr::Assign { target, value } => self.assign(target, value)?,
            Expr::Grouping(inner) => self.expression(inner)?,
        }
        Ok(())
    }

    fn super_access_check(&self) -> CResult<()> {
        match self.classes.last() {
            Some(c) if c.has_superclass => Ok(()),
            Some(_) => Err(CompileError::new("'super' used in a class with no superclass", SourceLocation::unknown())),
            None => Err(CompileError::new("'super' used outside of a class", SourceLocation::unknown())),
        }
    }

    fn logical(&mut self, op: LogicalOp, left: &Expr, right: &Expr) -> CResult<()> {
        self.expression(left)?;
        match op {
            LogicalOp::And => {
                let end_jump = self.cur().chunk.emit_jump(OpCode::JumpIfFalse, 0);
                self.emit(OpCode::Pop, Operand::None, 0);
                self.expression(right)?;
                self.cur().chunk.patch_jump(end_jump);
            }
            LogicalOp::Or => {
                let else_jump = self.cur().chunk.emit_jump(OpCode::JumpIfFalse, 0);
                let end_jump = self.cur().chunk.emit_jump(OpCode::Jump, 0);
                self.cur().chunk.patch_jump(else_jump);
                self.emit(OpCode::Pop, Operand::None, 0);
                self.expression(right)?;
                self.cur().chunk.patch_jump(end_jump);
            }
        }
        Ok(())
    }

    fn compile_call_bundle(&mut self, args: &[Arg], line: usize) -> CResult<()> {
        self.emit(OpCode::Array, Operand::None, line);
        let mut kw_pairs: Vec<(&str, &Expr)> = Vec::new();
        let mut block_expr: Option<&Expr> = None;
        for a in args {
            match a {
                Arg::Positional(e) => {
                    self.expression(e)?;
                    self.emit(OpCode::ArrayPush, Operand::None, line);
                }
                Arg::Splat(e) => {
                    self.expression(e)?;
                    self.emit(OpCode::ArraySpread, Operand::None, line);
                }
                Arg::Keyword(name, e) => kw_pairs.push((name, e)),
                Arg::Block(e) => block_expr = Some(e),
            }
        }
        if kw_pairs.is_empty() {
            self.emit(OpCode::Nil, Operand::None, line);
        } else {
            self.emit(OpCode::Map, Operand::None, line);
            for (name, e) in kw_pairs {
                let idx = self.cur().chunk.add_constant(ConstValue::Str { value: name.to_string(), kind: StringKind::Static });
                self.emit(OpCode::Constant, Operand::Index(idx), line);
                self.expression(e)?;
                self.emit(OpCode::MapSet, Operand::None, line);
            }
        }
        match block_expr {
            Some(e) => self.expression(e)?,
            None => {
                self.emit(OpCode::Nil, Operand::None, line);
            }
        }
        Ok(())
    }

    fn assign(&mut self, target: &Expr, value: &Expr) -> CResult<()> {
        match target {
            Expr::Identifier(name) => {
                self.expression(value)?;
                self.named_variable_set(name, 0)?;
            }
            Expr::Index { object, index, line } => {
                self.expression(object)?;
                self.expression(index)?;
                self.expression(value)?;
                self.emit(OpCode::SetIndex, Operand::None, *line);
            }
            Expr::FieldGet { object, name } => {
                self.expression(object)?;
                self.expression(value)?;
                let idx = self.identifier_constant(name);
                self.emit(OpCode::SetProperty, Operand::Index(idx), 0);
            }
            _ => return Err(CompileError::new("invalid assignment target", SourceLocation::unknown())),
        }
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Sub => OpCode::Subtract,
        BinaryOp::Mul => OpCode::Multiply,
        BinaryOp::Div => OpCode::Divide,
        BinaryOp::Mod => OpCode::Modulo,
        BinaryOp::Eq => OpCode::Equal,
        BinaryOp::NotEq => OpCode::NotEqual,
        BinaryOp::Less => OpCode::Less,
        BinaryOp::Greater => OpCode::Greater,
        BinaryOp::LessEq => OpCode::LessEqual,
        BinaryOp::GreaterEq => OpCode::GreaterEqual,
        BinaryOp::ShovelLeft => OpCode::ShovelLeft,
        BinaryOp::ShovelRight => OpCode::ShovelRight,
        BinaryOp::BitAnd => OpCode::BitAnd,
        BinaryOp::BitOr => OpCode::BitOr,
        BinaryOp::BitXor => OpCode::BitXor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn compile_src(src: &str) -> Chunk {
        let stmts = parse_source(src).unwrap();
        Compiler::compile(&stmts).unwrap()
    }

    #[test]
    fn compiles_arithmetic_to_constants_and_add() {
        let chunk = compile_src("1 + 2;");
        assert!(chunk.code.iter().any(|i| i.op == OpCode::Add));
        assert_eq!(chunk.constants.len(), 2);
    }

    #[test]
    fn local_scope_emits_pop_on_exit() {
        let chunk = compile_src("{ var a = 1; }");
        assert!(chunk.code.iter().any(|i| i.op == OpCode::Pop));
        assert!(!chunk.code.iter().any(|i| i.op == OpCode::DefineGlobal));
    }

    #[test]
    fn top_level_var_becomes_global() {
        let chunk = compile_src("var a = 1;");
        assert!(chunk.code.iter().any(|i| i.op == OpCode::DefineGlobal));
    }

    #[test]
    fn too_many_locals_is_a_compile_error() {
        let mut src = String::new();
        for i in 0..260 {
            src.push_str(&format!("var v{i} = {i};\n"));
        }
        let src = format!("{{ {src} }}");
        let stmts = parse_source(&src).unwrap();
        assert!(Compiler::compile(&stmts).is_err());
    }

    #[test]
    fn class_with_method_emits_class_and_method_ops() {
        let chunk = compile_src("class A { greet() { return 1; } }");
        assert!(chunk.code.iter().any(|i| i.op == OpCode::Class));
        assert!(chunk.code.iter().any(|i| i.op == OpCode::Method));
    }

    #[test]
    fn try_catch_builds_a_catch_table_row() {
        let chunk = compile_src("try { throw 1; } catch (Error e) { e; }");
        assert_eq!(chunk.catch_table.len(), 1);
        assert_eq!(chunk.catch_table[0].class_name.as_deref(), Some("Error"));
    }
}
