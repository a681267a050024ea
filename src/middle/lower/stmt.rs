//! Statement lowering. Walks a block's statements in order, emitting into
//! the current instruction stream and collecting extra blocks whenever a
//! conditional splits control flow. Ownership handles get their uniform
//! (pointer, length) shape here.

use crate::frontend::{
    ast::{self, ExpressionKind, StatementKind},
    intern::Symbol,
};
use crate::middle::{
    diag::Diagnostic,
    ir::{self, is_owned_type, is_slice_type},
    lower::{
        LowerCtx,
        cfg::{lower_value_sc, needs_short_circuit},
        expr::{lower_call_expr, lower_expr, lower_expr_nested},
    },
    pipeline::{atoi_safe, trim_quotes},
};

fn ends_with_return(instructions: &[ir::Instruction]) -> bool {
    matches!(instructions.last(), Some(ir::Instruction::Return { .. }))
}

/// Lowers a block into entry instructions plus any extra blocks synthesized
/// for control flow. Statements following a conditional are lowered into its
/// join block, so a `return` here appears once, reachable from both arms.
pub(crate) fn lower_block_cfg(
    ctx: &mut LowerCtx,
    block: &ast::Block,
) -> (Vec<ir::Instruction>, Vec<ir::Block>) {
    let mut out = Vec::new();
    let mut extras = Vec::new();

    for (i, statement) in block.statements.iter().enumerate() {
        match &statement.kind {
            StatementKind::Defer(inner) => {
                if let Some(instruction) = lower_defer(ctx, inner) {
                    out.push(instruction);
                } else {
                    ctx.diagnostics.push(Diagnostic::debug(
                        "defer with unsupported inner expression skipped",
                        statement.span,
                    ));
                }
            }
            StatementKind::If(if_stmt) => {
                if lower_if(ctx, if_stmt, rest_of(block, i), &mut out, &mut extras) {
                    // The remainder was lowered into the join block.
                    return (out, extras);
                }
            }
            StatementKind::Var(decl) => lower_var(ctx, decl, &mut out, &mut extras),
            StatementKind::Assign(assign) => {
                if let ExpressionKind::Conditional(conditional) = &assign.value.kind {
                    lower_ternary_assign(
                        ctx,
                        assign.name,
                        conditional,
                        rest_of(block, i),
                        &mut out,
                        &mut extras,
                    );
                    return (out, extras);
                }
                lower_assign(ctx, assign, &mut out, &mut extras);
            }
            StatementKind::Return(ret) => lower_return(ctx, ret, &mut out, &mut extras),
            StatementKind::Expr(e) => lower_expr_stmt(ctx, e, statement.span, &mut out, &mut extras),
            StatementKind::Gpu(gpu) => lower_gpu_block(ctx, gpu),
        }
    }

    (out, extras)
}

fn rest_of(block: &ast::Block, i: usize) -> Option<ast::Block> {
    if i + 1 < block.statements.len() {
        Some(ast::Block {
            span: block.span,
            statements: block.statements[i + 1..].to_vec(),
        })
    } else {
        None
    }
}

/// Lowers `if cond { then } else { else }` followed by `rest`. Returns
/// false when the condition cannot be lowered; the statement is skipped.
fn lower_if(
    ctx: &mut LowerCtx,
    if_stmt: &ast::IfStmt,
    rest: Option<ast::Block>,
    out: &mut Vec<ir::Instruction>,
    extras: &mut Vec<ir::Block>,
) -> bool {
    let Some(condition) = lower_expr_nested(ctx, &if_stmt.condition, out) else {
        return false;
    };
    let cond_id = condition.result.map(|r| r.id).unwrap_or_default();
    out.push(ir::Instruction::Expr(condition));

    let n = ctx.next_label();
    let then_name = Symbol::new(&format!("then{n}"));
    let else_name = Symbol::new(&format!("else{n}"));
    let join_name = Symbol::new(&format!("join{n}"));

    out.push(ir::Instruction::CondBr {
        cond: ir::Value::new(cond_id, Symbol::new("bool")),
        true_label: then_name,
        false_label: else_name,
    });

    let (mut then_instr, then_extra) = lower_block_cfg(ctx, &if_stmt.then_block);
    if !ends_with_return(&then_instr) {
        then_instr.push(ir::Instruction::Goto { label: join_name });
    }
    extras.push(ir::Block::new(then_name, then_instr));
    extras.extend(then_extra);

    let (mut else_instr, else_extra) = match &if_stmt.else_block {
        Some(else_block) => lower_block_cfg(ctx, else_block),
        None => (Vec::new(), Vec::new()),
    };
    if !ends_with_return(&else_instr) {
        else_instr.push(ir::Instruction::Goto { label: join_name });
    }
    extras.push(ir::Block::new(else_name, else_instr));
    extras.extend(else_extra);

    let (join_instr, join_extra) = match &rest {
        Some(rest) => lower_block_cfg(ctx, rest),
        None => (Vec::new(), Vec::new()),
    };
    extras.push(ir::Block::new(join_name, join_instr));
    extras.extend(join_extra);

    true
}

/// `x = cond ? a : b` - branch, assign in each arm, continue in the join.
fn lower_ternary_assign(
    ctx: &mut LowerCtx,
    dest: Symbol,
    conditional: &ast::ConditionalExpr,
    rest: Option<ast::Block>,
    out: &mut Vec<ir::Instruction>,
    extras: &mut Vec<ir::Block>,
) {
    let Some(condition) = lower_expr(ctx, &conditional.condition) else {
        return;
    };
    let cond_id = condition.result.map(|r| r.id).unwrap_or_default();
    out.push(ir::Instruction::Expr(condition));

    let n = ctx.next_label();
    let then_name = Symbol::new(&format!("then{n}"));
    let else_name = Symbol::new(&format!("else{n}"));
    let join_name = Symbol::new(&format!("join{n}"));

    out.push(ir::Instruction::CondBr {
        cond: ir::Value::new(cond_id, Symbol::new("bool")),
        true_label: then_name,
        false_label: else_name,
    });

    let mut then_instr = Vec::new();
    if let Some(expr) = lower_expr(ctx, &conditional.then_value) {
        let result = expr.result;
        then_instr.push(ir::Instruction::Expr(expr));
        if let Some(src) = result {
            then_instr.push(ir::Instruction::Assign { dest, src });
        }
    }
    then_instr.push(ir::Instruction::Goto { label: join_name });
    extras.push(ir::Block::new(then_name, then_instr));

    let mut else_instr = Vec::new();
    if let Some(expr) = lower_expr(ctx, &conditional.else_value) {
        let result = expr.result;
        else_instr.push(ir::Instruction::Expr(expr));
        if let Some(src) = result {
            else_instr.push(ir::Instruction::Assign { dest, src });
        }
    }
    else_instr.push(ir::Instruction::Goto { label: join_name });
    extras.push(ir::Block::new(else_name, else_instr));

    let (join_instr, join_extra) = match &rest {
        Some(rest) => lower_block_cfg(ctx, rest),
        None => (Vec::new(), Vec::new()),
    };
    extras.push(ir::Block::new(join_name, join_instr));
    extras.extend(join_extra);
}

/// Bare declaration: tracks the declared type and emits `Var`.
fn lower_stmt_var(ctx: &mut LowerCtx, decl: &ast::VarDecl) -> ir::Instruction {
    let ty = decl.ty.unwrap_or_default();
    if let Some(declared) = decl.ty {
        ctx.var_types.insert(decl.name, declared);
    }

    let result_ty = if ty.is_empty() { Symbol::new("any") } else { ty };
    ir::Instruction::Var {
        name: decl.name,
        ty,
        init: None,
        result: ir::Value::new(decl.name, result_ty),
    }
}

fn lower_var(
    ctx: &mut LowerCtx,
    decl: &ast::VarDecl,
    out: &mut Vec<ir::Instruction>,
    extras: &mut Vec<ir::Block>,
) {
    if let (Some(ty), Some(init)) = (decl.ty, decl.init.as_ref()) {
        if is_owned_type(ty) {
            lower_owned_var(ctx, decl, ty, init, out, extras);
            return;
        }
    }

    let Some(init) = &decl.init else {
        out.push(lower_stmt_var(ctx, decl));
        return;
    };

    if needs_short_circuit(init) {
        if let Some(sc) = lower_value_sc(ctx, init) {
            out.extend(sc.instructions);
            extras.extend(sc.extras);

            let ty = decl.ty.unwrap_or(sc.value.ty);
            out.push(ir::Instruction::Var {
                name: decl.name,
                ty,
                init: Some(sc.value),
                result: ir::Value::new(decl.name, ty),
            });

            if let Some(declared) = decl.ty {
                ctx.var_types.insert(decl.name, declared);
            } else if !ty.is_empty() && ty.value() != "any" {
                // `any` never overrides the absence of a tracked type.
                ctx.var_types.insert(decl.name, ty);
            }
            return;
        }
    }

    // General path: declare first so the identifier exists, then compute
    // the initializer and rebind.
    out.push(lower_stmt_var(ctx, decl));
    if let Some(expr) = lower_expr_nested(ctx, init, out) {
        let result = expr.result;
        out.push(ir::Instruction::Expr(expr));
        if let Some(src) = result {
            out.push(ir::Instruction::Assign {
                dest: decl.name,
                src,
            });
            if decl.ty.is_none() && !src.ty.is_empty() && src.ty.value() != "any" {
                ctx.var_types.insert(decl.name, src.ty);
            }
        }
    }
}

/// Ownership variables copy-on-new: whatever the initializer produced is
/// projected into a (pointer, length) pair and wrapped in a fresh handle.
fn lower_owned_var(
    ctx: &mut LowerCtx,
    decl: &ast::VarDecl,
    ty: Symbol,
    init: &ast::Expression,
    out: &mut Vec<ir::Instruction>,
    extras: &mut Vec<ir::Block>,
) {
    if needs_short_circuit(init) {
        if let Some(sc) = lower_value_sc(ctx, init) {
            out.extend(sc.instructions);
            extras.extend(sc.extras);
            if let Some(handle) = synthesize_owned_handle(ctx, out, sc.value, None) {
                out.push(ir::Instruction::Var {
                    name: decl.name,
                    ty,
                    init: Some(handle),
                    result: ir::Value::new(decl.name, ty),
                });
                ctx.var_types.insert(decl.name, ty);
                return;
            }
        }
    }

    if let Some(expr) = lower_expr_nested(ctx, init, out) {
        let source = expr.result;
        out.push(ir::Instruction::Expr(expr));

        let handle = source
            .and_then(|source| synthesize_owned_handle(ctx, out, source, literal_length(init)));

        if let Some(handle) = handle {
            out.push(ir::Instruction::Var {
                name: decl.name,
                ty,
                init: Some(handle),
                result: ir::Value::new(decl.name, ty),
            });
            ctx.var_types.insert(decl.name, ty);
            return;
        }
    }

    // No way to derive a (pointer, length) pair; declare plainly.
    out.push(lower_stmt_var(ctx, decl));
}

fn lower_assign(
    ctx: &mut LowerCtx,
    assign: &ast::AssignStmt,
    out: &mut Vec<ir::Instruction>,
    extras: &mut Vec<ir::Block>,
) {
    if needs_short_circuit(&assign.value) {
        if let Some(sc) = lower_value_sc(ctx, &assign.value) {
            out.extend(sc.instructions);
            extras.extend(sc.extras);
            out.push(ir::Instruction::Assign {
                dest: assign.name,
                src: sc.value,
            });
            return;
        }
    }

    // Ownership destinations re-wrap the source so the handle keeps its
    // uniform (pointer, length) shape.
    if ctx.tracked_type(assign.name).is_some_and(is_owned_type) {
        if let Some(expr) = lower_expr_nested(ctx, &assign.value, out) {
            let source = expr.result;
            out.push(ir::Instruction::Expr(expr));

            let handle = source.and_then(|source| {
                synthesize_owned_handle(ctx, out, source, literal_length(&assign.value))
            });

            if let Some(handle) = handle {
                out.push(ir::Instruction::Assign {
                    dest: assign.name,
                    src: handle,
                });
            } else {
                out.push(placeholder_assign(assign.name));
            }
            return;
        }
    }

    if let Some(expr) = lower_expr_nested(ctx, &assign.value, out) {
        if let Some(src) = expr.result {
            out.push(ir::Instruction::Expr(expr));
            out.push(ir::Instruction::Assign {
                dest: assign.name,
                src,
            });
            return;
        }
    }

    out.push(placeholder_assign(assign.name));
}

/// Fallback when the right-hand side produced no value.
fn placeholder_assign(dest: Symbol) -> ir::Instruction {
    ir::Instruction::Assign {
        dest,
        src: ir::Value::new(Symbol::default(), Symbol::new("any")),
    }
}

fn lower_return(
    ctx: &mut LowerCtx,
    ret: &ast::ReturnStmt,
    out: &mut Vec<ir::Instruction>,
    extras: &mut Vec<ir::Block>,
) {
    let mut values = Vec::with_capacity(ret.results.len());

    for (index, result_expr) in ret.results.iter().enumerate() {
        let mut value = None;

        if needs_short_circuit(result_expr) {
            if let Some(sc) = lower_value_sc(ctx, result_expr) {
                out.extend(sc.instructions);
                extras.extend(sc.extras);
                value = Some(sc.value);
            }
        } else if let Some(expr) = lower_expr_nested(ctx, result_expr, out) {
            let single = expr.result;
            let multi = expr.results.clone();
            out.push(ir::Instruction::Expr(expr));

            if let Some(single) = single {
                value = Some(single);
            } else if !multi.is_empty() {
                // A multi-result call fills several return slots at once.
                values.extend(multi);
                continue;
            }
        }

        let Some(mut value) = value else { continue };

        // Owned results are copied into a fresh handle at the return site.
        if ctx.declared_result_type(index).is_some_and(is_owned_type) {
            if let Some(handle) =
                synthesize_owned_handle(ctx, out, value, literal_length(result_expr))
            {
                value = handle;
            }
        }

        values.push(value);
    }

    out.push(ir::Instruction::Return { values });
}

fn lower_expr_stmt(
    ctx: &mut LowerCtx,
    e: &ast::Expression,
    span: crate::frontend::Span,
    out: &mut Vec<ir::Instruction>,
    extras: &mut Vec<ir::Block>,
) {
    if let ExpressionKind::Call(call) = &e.kind {
        // `release(x)` zeroizes the memory behind the handle.
        if call.name.value() == "release" && call.args.len() == 1 {
            if let Some(arg) = lower_expr(ctx, &call.args[0]) {
                let handle = arg
                    .result
                    .unwrap_or_else(|| ir::Value::new(Symbol::default(), Symbol::new("ptr")));
                out.push(ir::Instruction::Expr(arg));
                out.push(ir::Instruction::Expr(ir::Expr::call(
                    "rill_rt_zeroize_owned",
                    vec![handle],
                    None,
                )));
            }
            return;
        }
    }

    if needs_short_circuit(e) {
        // Computed for its side effects; the value is dropped.
        if let Some(sc) = lower_value_sc(ctx, e) {
            out.extend(sc.instructions);
            extras.extend(sc.extras);
        }
        return;
    }

    if let Some(expr) = lower_expr_nested(ctx, e, out) {
        out.push(ir::Instruction::Expr(expr));
    } else {
        ctx.diagnostics.push(Diagnostic::debug(
            "unsupported expression statement skipped",
            span,
        ));
    }
}

fn lower_defer(ctx: &mut LowerCtx, inner: &ast::Expression) -> Option<ir::Instruction> {
    let ExpressionKind::Call(call) = &inner.kind else {
        return None;
    };

    if call.name.value() == "release" && call.args.len() == 1 {
        let arg = lower_expr(ctx, &call.args[0])?;
        let handle = arg
            .result
            .unwrap_or_else(|| ir::Value::new(Symbol::default(), Symbol::new("ptr")));
        return Some(ir::Instruction::Defer(ir::Expr::call(
            "rill_rt_zeroize_owned",
            vec![handle],
            None,
        )));
    }

    Some(ir::Instruction::Defer(lower_call_expr(ctx, call)))
}

/// Lengths known at compile time for literal sources of Owned handles.
fn literal_length(e: &ast::Expression) -> Option<i64> {
    match &e.kind {
        ExpressionKind::StringLit(text) => Some(text.value().len() as i64),
        ExpressionKind::SliceLit(lit) => Some(lit.elems.len() as i64),
        _ => None,
    }
}

/// Projects a (pointer, length) pair from `source` and constructs a fresh
/// ownership handle from it. Handles are always this two-word shape no
/// matter where the payload came from; the release path depends on it.
pub(crate) fn synthesize_owned_handle(
    ctx: &mut LowerCtx,
    out: &mut Vec<ir::Instruction>,
    source: ir::Value,
    literal_len: Option<i64>,
) -> Option<ir::Value> {
    let (data, length) = if let Some(len) = literal_len {
        let length = ir::Value::new(ctx.new_temp(), Symbol::new("int64"));
        out.push(ir::Instruction::Expr(ir::Expr::lit(&len.to_string(), length)));
        (source, length)
    } else if is_owned_type(source.ty) {
        let pointer = ir::Value::new(ctx.new_temp(), Symbol::new("ptr"));
        out.push(ir::Instruction::Expr(ir::Expr::call(
            "rill_rt_owned_ptr",
            vec![source],
            Some(pointer),
        )));
        let length = ir::Value::new(ctx.new_temp(), Symbol::new("int64"));
        out.push(ir::Instruction::Expr(ir::Expr::call(
            "rill_rt_owned_len",
            vec![source],
            Some(length),
        )));
        (pointer, length)
    } else if source.ty.value() == "string" {
        let length = ir::Value::new(ctx.new_temp(), Symbol::new("int64"));
        out.push(ir::Instruction::Expr(ir::Expr::call(
            "rill_rt_string_len",
            vec![source],
            Some(length),
        )));
        (source, length)
    } else if is_slice_type(source.ty) {
        let length = ir::Value::new(ctx.new_temp(), Symbol::new("int64"));
        out.push(ir::Instruction::Expr(ir::Expr::call(
            "rill_rt_slice_len",
            vec![source],
            Some(length),
        )));
        (source, length)
    } else {
        return None;
    };

    let handle = ir::Value::new(ctx.new_temp(), Symbol::new("Owned"));
    out.push(ir::Instruction::Expr(ir::Expr::call(
        "rill_rt_owned_new",
        vec![data, length],
        Some(handle),
    )));
    Some(handle)
}

fn lower_gpu_block(ctx: &mut LowerCtx, gpu: &ast::GpuBlockStmt) {
    let mut block = ir::GpuBlock {
        source: gpu.source,
        ..Default::default()
    };

    for attr in &gpu.attrs {
        let first = attr.args.first().map(|a| a.text.value()).unwrap_or("");
        match attr.name.value() {
            "family" => block.family = Symbol::new(trim_quotes(first)),
            "name" => block.kernel = Symbol::new(trim_quotes(first)),
            "n" => {
                if let Some(n) = atoi_safe(first) {
                    block.n = n;
                }
            }
            "grid" => block.grid = int_triple(attr),
            "tpg" => block.tpg = int_triple(attr),
            _ => {}
        }
    }

    ctx.gpu_blocks.push(block);
}

fn int_triple(attr: &ast::Attribute) -> [i64; 3] {
    let mut triple = [0; 3];
    for (slot, arg) in triple.iter_mut().zip(&attr.args) {
        if let Some(n) = atoi_safe(arg.text.value()) {
            *slot = n;
        }
    }
    triple
}
