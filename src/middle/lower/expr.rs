//! Expression lowering. Each call produces at most one instruction for the
//! node itself plus a best-effort typed result value; nested calls used as
//! arguments are pre-emitted by [`lower_expr_nested`] so their temporaries
//! are defined before use.

use itertools::Itertools;

use crate::frontend::{
    ast::{self, ExpressionKind, UnaryOperatorKind},
    intern::Symbol,
};
use crate::middle::{
    ir,
    lower::{LowerCtx, fold, intrinsics},
    pipeline::parse_duration_ms,
};

/// Lowers `e` into a single (not yet emitted) instruction. Returns `None`
/// for shapes that need control flow or cannot be lowered; callers must
/// tolerate the absence and skip the node.
pub(crate) fn lower_expr(ctx: &mut LowerCtx, e: &ast::Expression) -> Option<ir::Expr> {
    // Fold literal arithmetic first so a folded literal takes the ordinary
    // literal path below.
    let folded = fold::fold_expression(e);
    let e = folded.as_ref().unwrap_or(e);

    match &e.kind {
        ExpressionKind::Identifier(name) => {
            let ty = ctx.tracked_type(*name).unwrap_or(Symbol::new("any"));
            Some(ir::Expr::ident(ir::Value::new(*name, ty)))
        }
        ExpressionKind::StringLit(text) => {
            let id = ctx.new_temp();
            Some(ir::Expr::lit(
                &format!("{:?}", text.value()),
                ir::Value::new(id, Symbol::new("string")),
            ))
        }
        ExpressionKind::NumberLit(text) => {
            let id = ctx.new_temp();
            Some(ir::Expr::lit(
                text.value(),
                ir::Value::new(id, Symbol::new("int")),
            ))
        }
        ExpressionKind::DurationLit(text) => {
            let ms = parse_duration_ms(text.value())?;
            let id = ctx.new_temp();
            Some(ir::Expr::lit(
                &ms.to_string(),
                ir::Value::new(id, Symbol::new("int64")),
            ))
        }
        ExpressionKind::Binary { operator, lhs, rhs } => {
            let lx = lower_expr(ctx, lhs)?;
            let rx = lower_expr(ctx, rhs)?;
            let id = ctx.new_temp();

            let mut args = Vec::with_capacity(2);
            args.extend(lx.result);
            args.extend(rx.result);

            Some(ir::Expr {
                op: ir::ExprOp::Binary(*operator),
                args,
                result: Some(ir::Value::new(id, Symbol::new("any"))),
                results: Vec::new(),
            })
        }
        ExpressionKind::Unary { operator, operand } => {
            let ox = lower_expr(ctx, operand)?;
            let operand_value = ox.result?;
            let id = ctx.new_temp();
            let ty = match operator {
                UnaryOperatorKind::LogicalNot => Symbol::new("bool"),
                UnaryOperatorKind::Negate => operand_value.ty,
            };

            Some(ir::Expr {
                op: ir::ExprOp::Unary(*operator),
                args: vec![operand_value],
                result: Some(ir::Value::new(id, ty)),
                results: Vec::new(),
            })
        }
        ExpressionKind::Call(call) => Some(lower_call_expr(ctx, call)),
        ExpressionKind::Selector(selector) => lower_selector(ctx, selector),
        // Value-position conditionals need branching; the short-circuit
        // path owns them.
        ExpressionKind::Conditional(_) => None,
        ExpressionKind::SliceLit(lit) => {
            let id = ctx.new_temp();
            let ty = Symbol::new(&format!("slice<{}>", lit.elem_ty));
            Some(lower_container(ctx, ir::ContainerKind::Slice, id, ty, &lit.elems))
        }
        ExpressionKind::SetLit(lit) => {
            let id = ctx.new_temp();
            let ty = Symbol::new(&format!("set<{}>", lit.elem_ty));
            Some(lower_container(ctx, ir::ContainerKind::Set, id, ty, &lit.elems))
        }
        ExpressionKind::MapLit(lit) => {
            let id = ctx.new_temp();
            let ty = Symbol::new(&format!("map<{},{}>", lit.key_ty, lit.val_ty));

            // Flatten key/value pairs: [k1, v1, k2, v2, ...]
            let mut args = Vec::with_capacity(lit.entries.len() * 2);
            for (key, value) in &lit.entries {
                if let Some(kx) = lower_expr(ctx, key) {
                    args.extend(kx.result);
                }
                if let Some(vx) = lower_expr(ctx, value) {
                    args.extend(vx.result);
                }
            }

            Some(ir::Expr {
                op: ir::ExprOp::Container(ir::ContainerKind::Map),
                args,
                result: Some(ir::Value::new(id, ty)),
                results: Vec::new(),
            })
        }
    }
}

/// Lowers `e` like [`lower_expr`], but first emits any call expressions
/// nested in call-argument position into `out`, depth first, so that
/// `f(g(x), h(y))` sees `g` and `h` materialized before `f`.
pub(crate) fn lower_expr_nested(
    ctx: &mut LowerCtx,
    e: &ast::Expression,
    out: &mut Vec<ir::Instruction>,
) -> Option<ir::Expr> {
    match &e.kind {
        ExpressionKind::Call(call) => Some(lower_call_nested(ctx, call, out)),
        _ => lower_expr(ctx, e),
    }
}

fn lower_call_nested(
    ctx: &mut LowerCtx,
    call: &ast::CallExpr,
    out: &mut Vec<ir::Instruction>,
) -> ir::Expr {
    if let Some(expr) = intrinsics::lower_stdlib_call(ctx, call) {
        return expr;
    }

    let mut args = Vec::new();
    for arg in &call.args {
        if let ExpressionKind::Call(inner) = &arg.kind {
            let inner_expr = lower_call_nested(ctx, inner, out);
            let result = inner_expr.result.or_else(|| inner_expr.results.first().copied());
            out.push(ir::Instruction::Expr(inner_expr));
            args.extend(result);
        } else if let Some(expr) = lower_expr(ctx, arg) {
            args.extend(expr.result);
        }
    }

    lower_call_args_ready(ctx, call.name, args)
}

/// Generic call lowering without nested emission. Signature lookup falls
/// back to a single `any`-typed result for unknown callees.
pub(crate) fn lower_call_expr(ctx: &mut LowerCtx, call: &ast::CallExpr) -> ir::Expr {
    if let Some(expr) = intrinsics::lower_stdlib_call(ctx, call) {
        return expr;
    }

    let mut args = Vec::new();
    for arg in &call.args {
        if let Some(expr) = lower_expr(ctx, arg) {
            args.extend(expr.result);
        }
    }

    lower_call_args_ready(ctx, call.name, args)
}

/// Builds the call instruction once the argument values are in hand.
pub(crate) fn lower_call_args_ready(ctx: &mut LowerCtx, callee: Symbol, args: Vec<ir::Value>) -> ir::Expr {
    let signature = ctx.signatures.get(callee).cloned();

    if let Some(sig) = &signature {
        if sig.results.len() > 1 {
            let results: Vec<ir::Value> = sig
                .results
                .iter()
                .map(|ty| ir::Value::new(ctx.new_temp(), *ty))
                .collect();

            return ir::Expr {
                op: ir::ExprOp::Call(ir::CallTarget {
                    callee,
                    param_types: sig.params.clone(),
                    param_names: recorded_or_synthesized_names(sig.param_names.clone(), sig.params.len()),
                    result_types: sig.results.clone(),
                }),
                args,
                result: None,
                results,
            };
        }
    }

    let id = ctx.new_temp();
    let result_ty = signature
        .as_ref()
        .and_then(|sig| sig.results.first())
        .copied()
        .filter(|ty| !ty.is_empty())
        .unwrap_or(Symbol::new("any"));

    let (param_types, param_names, result_types) = match &signature {
        Some(sig) => (
            sig.params.clone(),
            recorded_or_synthesized_names(sig.param_names.clone(), sig.params.len()),
            sig.results.clone(),
        ),
        None => (
            Vec::new(),
            recorded_or_synthesized_names(Vec::new(), args.len()),
            Vec::new(),
        ),
    };

    ir::Expr {
        op: ir::ExprOp::Call(ir::CallTarget {
            callee,
            param_types,
            param_names,
            result_types,
        }),
        args,
        result: Some(ir::Value::new(id, result_ty)),
        results: Vec::new(),
    }
}

/// Parameter names for diagnostics: the recorded ones when present,
/// otherwise `p0, p1, ...`.
fn recorded_or_synthesized_names(recorded: Vec<Symbol>, count: usize) -> Vec<Symbol> {
    if !recorded.is_empty() {
        return recorded;
    }
    (0..count).map(|i| Symbol::new(&format!("p{i}"))).collect()
}

fn lower_selector(ctx: &mut LowerCtx, selector: &ast::SelectorExpr) -> Option<ir::Expr> {
    // Enum-shaped selectors (signal-name constants) fold to fixed integers.
    if selector.path.len() == 1 {
        if let Some(value) = intrinsics::signal_constant(selector.path[0]) {
            let id = ctx.new_temp();
            return Some(ir::Expr::lit(
                &value.to_string(),
                ir::Value::new(id, Symbol::new("int64")),
            ));
        }
    }

    let base_ty = ctx.tracked_type(selector.base)?;
    let mut field_ty = base_ty;
    for field in &selector.path {
        field_ty = ctx.types.field_type(field_ty, *field)?;
    }

    let path = selector.path.iter().map(|p| p.value()).join(".");
    let id = ctx.new_temp();

    Some(ir::Expr {
        op: ir::ExprOp::Field(Symbol::new(&path)),
        args: vec![ir::Value::new(selector.base, base_ty)],
        result: Some(ir::Value::new(id, field_ty)),
        results: Vec::new(),
    })
}

fn lower_container(
    ctx: &mut LowerCtx,
    kind: ir::ContainerKind,
    id: Symbol,
    ty: Symbol,
    elems: &[ast::Expression],
) -> ir::Expr {
    let mut args = Vec::with_capacity(elems.len());
    for elem in elems {
        if let Some(expr) = lower_expr(ctx, elem) {
            args.extend(expr.result);
        }
    }

    ir::Expr {
        op: ir::ExprOp::Container(kind),
        args,
        result: Some(ir::Value::new(id, ty)),
        results: Vec::new(),
    }
}
