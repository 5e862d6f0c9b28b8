// File: src/optimizer.rs
//
// Peephole optimizer (spec.md §4.1 "Peephole optimization"), adapted to
// operate on a `Chunk`'s `Vec<Instruction>` with `usize` jump targets
// rather than the original's doubly-linked Iseq with byte offsets. Three
// rewrites run repeatedly to a fixed point: constant folding, zero-offset
// jump removal, and unused-pure-expression elision.

use crate::iseq::{Chunk, ConstValue, Instruction, Operand, OpCode};

/// Runs the optimizer to a fixed point. `repl_mode` suppresses the
/// unused-expression pass so a bare `1+1` at the REPL still leaves a
/// value on the stack for display.
pub fn optimize(chunk: &mut Chunk, repl_mode: bool) {
    if chunk.code.is_empty() {
        return;
    }
    loop {
        let mut changed = false;
        changed |= fold_constants(chunk);
        changed |= remove_zero_offset_jumps(chunk);
        if !repl_mode {
            changed |= remove_unused_pure_expressions(chunk);
        }
        if !changed {
            break;
        }
    }
}

fn const_number(chunk: &Chunk, instr: &Instruction) -> Option<f64> {
    if instr.op != OpCode::Constant {
        return None;
    }
    match instr.operand {
        Operand::Index(i) => match chunk.constants.get(i) {
            Some(ConstValue::Number(n)) => Some(*n),
            _ => None,
        },
        _ => None,
    }
}

fn binop_numeric(op: OpCode, a: f64, b: f64) -> Option<f64> {
    match op {
        OpCode::Add => Some(a + b),
        OpCode::Subtract => Some(a - b),
        OpCode::Multiply => Some(a * b),
        OpCode::Divide => {
            if b == 0.0 {
                None
            } else {
                Some(a / b)
            }
        }
        _ => None,
    }
}

/// Folds `CONSTANT a, CONSTANT b, <binop>` into a single `CONSTANT`.
/// Division by zero is left unfolded (spec.md §4.1 rewrite 1, §8 boundary
/// behavior "compile-time folded divisions by zero are left unfolded").
fn fold_constants(chunk: &mut Chunk) -> bool {
    let mut i = 0;
    let mut changed = false;
    while i + 2 < chunk.code.len() {
        let a = const_number(chunk, &chunk.code[i]);
        let b = const_number(chunk, &chunk.code[i + 1]);
        let op = chunk.code[i + 2].op;
        if let (Some(a), Some(b)) = (a, b) {
            if let Some(result) = binop_numeric(op, a, b) {
                let line = chunk.code[i].line;
                let idx = chunk.add_constant(ConstValue::Number(result));
                chunk.code.splice(i..=i + 2, [Instruction::new(OpCode::Constant, Operand::Index(idx), line)]);
                renumber_jump_targets(chunk, i + 1, 2);
                changed = true;
                continue;
            }
        }
        i += 1;
    }
    changed
}

/// After removing `removed` instructions starting at `at`, every jump
/// target index at or after `at` must shift down by `removed`.
fn renumber_jump_targets(chunk: &mut Chunk, at: usize, removed: usize) {
    for instr in chunk.code.iter_mut() {
        match instr.operand {
            Operand::Jump(target) if target >= at => {
                instr.operand = Operand::Jump(target - removed);
            }
            Operand::IterNext { iter_slot, count, exit } if exit >= at => {
                instr.operand = Operand::IterNext { iter_slot, count, exit: exit - removed };
            }
            _ => {}
        }
    }
    for row in chunk.catch_table.iter_mut() {
        if row.from >= at {
            row.from -= removed;
        }
        if row.to >= at {
            row.to -= removed;
        }
        if row.target >= at {
            row.target -= removed;
        }
    }
}

fn is_jump_op(op: OpCode) -> bool {
    matches!(op, OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpIfNotUndef)
}

/// Removes jumps whose target is the very next instruction. `JumpIfFalse`
/// with a zero offset still consumes the condition, so it is rewritten to
/// a plain `Pop` rather than dropped outright (spec.md §4.1 rewrite 2).
fn remove_zero_offset_jumps(chunk: &mut Chunk) -> bool {
    let mut i = 0;
    let mut changed = false;
    while i < chunk.code.len() {
        let instr = &chunk.code[i];
        let is_zero_offset = is_jump_op(instr.op) && matches!(instr.operand, Operand::Jump(t) if t == i + 1);
        if is_zero_offset {
            if chunk.code[i].op == OpCode::JumpIfFalse {
                let line = chunk.code[i].line;
                chunk.code[i] = Instruction::simple(OpCode::Pop, line);
                changed = true;
                i += 1;
                continue;
            }
            chunk.code.remove(i);
            renumber_jump_targets(chunk, i, 1);
            changed = true;
            continue;
        }
        i += 1;
    }
    changed
}

fn is_pure_value_producer(op: OpCode) -> bool {
    matches!(op, OpCode::Constant | OpCode::True | OpCode::False | OpCode::Nil)
}

/// A `Pop` immediately preceded by a pure value-producing opcode removes
/// both, since the value was never observable (spec.md §4.1 rewrite 3).
fn remove_unused_pure_expressions(chunk: &mut Chunk) -> bool {
    let mut i = 0;
    let mut changed = false;
    while i + 1 < chunk.code.len() {
        if is_pure_value_producer(chunk.code[i].op) && chunk.code[i + 1].op == OpCode::Pop {
            let jumps_into_range = chunk.code.iter().enumerate().any(|(j, instr)| {
                (j < i || j > i + 1) && matches!(instr.operand, Operand::Jump(t) if t == i || t == i + 1)
            });
            if jumps_into_range {
                i += 1;
                continue;
            }
            chunk.code.splice(i..=i + 1, []);
            renumber_jump_targets(chunk, i, 2);
            changed = true;
            continue;
        }
        i += 1;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::parser::parse_source;

    fn compiled(src: &str) -> Chunk {
        let stmts = parse_source(src).unwrap();
        Compiler::compile(&stmts).unwrap()
    }

    #[test]
    fn folds_constant_arithmetic() {
        let mut chunk = compiled("1+2*3;");
        optimize(&mut chunk, false);
        assert!(!chunk.code.iter().any(|i| matches!(i.op, OpCode::Add | OpCode::Multiply)));
    }

    #[test]
    fn leaves_division_by_zero_unfolded() {
        let mut chunk = compiled("1/0;");
        optimize(&mut chunk, false);
        assert!(chunk.code.iter().any(|i| i.op == OpCode::Divide));
    }

    #[test]
    fn repl_mode_keeps_bare_expression_value() {
        let mut chunk = compiled("1+1;");
        optimize(&mut chunk, true);
        assert!(chunk.code.iter().any(|i| i.op == OpCode::Pop));
    }

    #[test]
    fn running_twice_is_a_fixed_point() {
        let mut chunk = compiled("var a = 1 + 2; if (true) { 3; }");
        optimize(&mut chunk, false);
        let once = chunk.code.clone();
        optimize(&mut chunk, false);
        assert_eq!(once, chunk.code);
    }
}
