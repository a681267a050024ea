//! Value-producing control-flow lowering: short-circuit `&&`/`||` and
//! ternary expressions become explicit branches whose arms each compute
//! their value into an own block, reconciled by a single `Phi` at the join.

use crate::frontend::{
    ast::{self, BinaryOperatorKind, ExpressionKind},
    intern::Symbol,
};
use crate::middle::{
    ir,
    lower::{LowerCtx, expr::lower_expr},
};

/// Whether `e` contains a conditional or a boolean `&&`/`||` that must be
/// lowered with control flow rather than eager evaluation. Eager evaluation
/// would run both operands, which is wrong when an operand is a call.
pub(crate) fn needs_short_circuit(e: &ast::Expression) -> bool {
    match &e.kind {
        ExpressionKind::Conditional(_) => true,
        ExpressionKind::Binary { operator, lhs, rhs } => {
            if matches!(
                operator,
                BinaryOperatorKind::LogicalAnd | BinaryOperatorKind::LogicalOr
            ) {
                return true;
            }
            needs_short_circuit(lhs) || needs_short_circuit(rhs)
        }
        ExpressionKind::Unary { operand, .. } => needs_short_circuit(operand),
        ExpressionKind::Call(call) => call.args.iter().any(needs_short_circuit),
        ExpressionKind::SliceLit(lit) | ExpressionKind::SetLit(lit) => {
            lit.elems.iter().any(needs_short_circuit)
        }
        ExpressionKind::MapLit(lit) => lit
            .entries
            .iter()
            .any(|(k, v)| needs_short_circuit(k) || needs_short_circuit(v)),
        _ => false,
    }
}

/// The outcome of lowering an expression with short-circuit semantics:
/// instructions for the current block, extra synthesized blocks, and the
/// value holding the result. A void call yields an empty value.
pub(crate) struct ScValue {
    pub value: ir::Value,
    pub instructions: Vec<ir::Instruction>,
    pub extras: Vec<ir::Block>,
}

pub(crate) fn lower_value_sc(ctx: &mut LowerCtx, e: &ast::Expression) -> Option<ScValue> {
    match &e.kind {
        ExpressionKind::Conditional(conditional) => lower_conditional_sc(ctx, conditional),
        ExpressionKind::Binary { operator, lhs, rhs }
            if matches!(
                operator,
                BinaryOperatorKind::LogicalAnd | BinaryOperatorKind::LogicalOr
            ) =>
        {
            lower_boolean_sc(ctx, *operator, lhs, rhs)
        }
        ExpressionKind::Call(call) => lower_call_sc(ctx, call),
        _ => {
            // Eager lowering is safe for literals, identifiers, selectors,
            // and arithmetic.
            let expr = lower_expr(ctx, e)?;
            let value = expr.result?;
            Some(ScValue {
                value,
                instructions: vec![ir::Instruction::Expr(expr)],
                extras: Vec::new(),
            })
        }
    }
}

fn lower_conditional_sc(
    ctx: &mut LowerCtx,
    conditional: &ast::ConditionalExpr,
) -> Option<ScValue> {
    let mut instructions = Vec::new();
    let mut extras = Vec::new();

    let condition = lower_expr(ctx, &conditional.condition)?;
    let cond_id = condition.result.map(|r| r.id).unwrap_or_default();
    instructions.push(ir::Instruction::Expr(condition));

    let n = ctx.next_label();
    let then_name = Symbol::new(&format!("then{n}"));
    let else_name = Symbol::new(&format!("else{n}"));
    let join_name = Symbol::new(&format!("join{n}"));

    instructions.push(ir::Instruction::CondBr {
        cond: ir::Value::new(cond_id, Symbol::new("bool")),
        true_label: then_name,
        false_label: else_name,
    });

    let then_arm = lower_value_sc(ctx, &conditional.then_value)?;
    extras.extend(then_arm.extras);
    let mut then_instr = then_arm.instructions;
    then_instr.push(ir::Instruction::Goto { label: join_name });
    extras.push(ir::Block::new(then_name, then_instr));

    let else_arm = lower_value_sc(ctx, &conditional.else_value)?;
    extras.extend(else_arm.extras);
    let mut else_instr = else_arm.instructions;
    else_instr.push(ir::Instruction::Goto { label: join_name });
    extras.push(ir::Block::new(else_name, else_instr));

    // Branch types must agree for the phi to be typed; otherwise fall back
    // to `any`.
    let mut result_ty = then_arm.value.ty;
    if result_ty.is_empty()
        || (!else_arm.value.ty.is_empty() && else_arm.value.ty != result_ty)
    {
        result_ty = Symbol::new("any");
    }

    let result = ir::Value::new(ctx.new_temp(), result_ty);
    extras.push(ir::Block::new(
        join_name,
        vec![ir::Instruction::Phi {
            result,
            incomings: vec![
                ir::PhiIncoming {
                    value: then_arm.value,
                    label: then_name,
                },
                ir::PhiIncoming {
                    value: else_arm.value,
                    label: else_name,
                },
            ],
        }],
    ));

    Some(ScValue {
        value: result,
        instructions,
        extras,
    })
}

fn lower_boolean_sc(
    ctx: &mut LowerCtx,
    operator: BinaryOperatorKind,
    lhs: &ast::Expression,
    rhs: &ast::Expression,
) -> Option<ScValue> {
    let left = lower_value_sc(ctx, lhs)?;
    let mut instructions = left.instructions;
    let mut extras = left.extras;

    let n = ctx.next_label();
    let then_name = Symbol::new(&format!("sc_then{n}"));
    let else_name = Symbol::new(&format!("sc_else{n}"));
    let join_name = Symbol::new(&format!("sc_join{n}"));

    instructions.push(ir::Instruction::CondBr {
        cond: left.value,
        true_label: then_name,
        false_label: else_name,
    });

    let mut then_instr;
    let mut else_instr;
    let then_value;
    let else_value;

    if operator == BinaryOperatorKind::LogicalAnd {
        // true -> evaluate RHS; false -> literal false.
        let rhs_arm = lower_value_sc(ctx, rhs)?;
        extras.extend(rhs_arm.extras);
        then_instr = rhs_arm.instructions;
        then_value = rhs_arm.value;

        let literal = ir::Value::new(ctx.new_temp(), Symbol::new("bool"));
        else_instr = vec![ir::Instruction::Expr(ir::Expr::lit("0", literal))];
        else_value = literal;
    } else {
        // true -> literal true; false -> evaluate RHS.
        let literal = ir::Value::new(ctx.new_temp(), Symbol::new("bool"));
        then_instr = vec![ir::Instruction::Expr(ir::Expr::lit("1", literal))];
        then_value = literal;

        let rhs_arm = lower_value_sc(ctx, rhs)?;
        extras.extend(rhs_arm.extras);
        else_instr = rhs_arm.instructions;
        else_value = rhs_arm.value;
    }

    then_instr.push(ir::Instruction::Goto { label: join_name });
    else_instr.push(ir::Instruction::Goto { label: join_name });
    extras.push(ir::Block::new(then_name, then_instr));
    extras.push(ir::Block::new(else_name, else_instr));

    let result = ir::Value::new(ctx.new_temp(), Symbol::new("bool"));
    extras.push(ir::Block::new(
        join_name,
        vec![ir::Instruction::Phi {
            result,
            incomings: vec![
                ir::PhiIncoming {
                    value: then_value,
                    label: then_name,
                },
                ir::PhiIncoming {
                    value: else_value,
                    label: else_name,
                },
            ],
        }],
    ));

    Some(ScValue {
        value: result,
        instructions,
        extras,
    })
}

/// Calls in value position lower their arguments through the short-circuit
/// path so argument side effects branch correctly.
fn lower_call_sc(ctx: &mut LowerCtx, call: &ast::CallExpr) -> Option<ScValue> {
    let mut instructions = Vec::new();
    let mut extras = Vec::new();

    let mut args = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        if let Some(lowered) = lower_value_sc(ctx, arg) {
            instructions.extend(lowered.instructions);
            extras.extend(lowered.extras);
            args.push(lowered.value);
        }
    }

    let expr = super::expr::lower_call_args_ready(ctx, call.name, args);
    let value = expr
        .result
        .or_else(|| expr.results.first().copied())
        .unwrap_or_else(|| ir::Value::new(Symbol::default(), Symbol::default()));
    instructions.push(ir::Instruction::Expr(expr));

    Some(ScValue {
        value,
        instructions,
        extras,
    })
}
