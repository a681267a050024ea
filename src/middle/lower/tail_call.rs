//! Tail-call elimination. A purely structural rewrite: when a function's
//! final block ends in `(call C, return)` and `C` belongs to the function's
//! recursion group, the pair becomes loop/dispatch markers plus a jump back
//! to `entry`. No tail-position analysis happens through branches.

use log::trace;

use crate::frontend::intern::Symbol;
use crate::middle::{ir, tables::RecursionSets};

pub fn eliminate_tail_calls(function: &mut ir::Function, recursion: &RecursionSets) {
    let name = function.name;
    let Some(block) = function.blocks.last_mut() else {
        return;
    };

    let len = block.instructions.len();
    if len < 2 {
        return;
    }
    if !matches!(block.instructions[len - 1], ir::Instruction::Return { .. }) {
        return;
    }
    let callee = match &block.instructions[len - 2] {
        ir::Instruction::Expr(expr) => expr.callee(),
        _ => None,
    };
    let Some(callee) = callee else {
        return;
    };

    let is_self = callee == name;
    if !is_self && !recursion.same_group(name, callee) {
        return;
    }

    trace!(
        "tail call in {}: {} ({})",
        name,
        callee,
        if is_self { "self" } else { "mutual" }
    );

    block.instructions.truncate(len - 2);
    block.instructions.push(ir::Instruction::Loop { name });
    if !is_self {
        block.instructions.push(ir::Instruction::Dispatch { label: callee });
    }
    block.instructions.push(ir::Instruction::Goto {
        label: Symbol::new("entry"),
    });
    // Unreachable, kept so the block still terminates in a return for the
    // backend.
    block.instructions.push(ir::Instruction::Return { values: Vec::new() });
}
