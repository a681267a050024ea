//! Compile-time folding of literal arithmetic. Runs before any other
//! lowering of an expression, so a folded literal flows through the rest of
//! the pipeline as an ordinary literal node.

use crate::frontend::{
    ast::{BinaryOperatorKind, Expression, ExpressionKind},
    intern::Symbol,
};

/// Folds `e` bottom-up. Returns `None` when nothing was folded, so callers
/// can keep borrowing the original tree in the common case.
pub(crate) fn fold_expression(e: &Expression) -> Option<Expression> {
    let ExpressionKind::Binary { operator, lhs, rhs } = &e.kind else {
        return None;
    };

    let folded_lhs = fold_expression(lhs);
    let folded_rhs = fold_expression(rhs);
    let left = folded_lhs.as_ref().unwrap_or(lhs);
    let right = folded_rhs.as_ref().unwrap_or(rhs);

    if let Some(kind) = fold_binary(*operator, left, right) {
        return Some(Expression::new(kind, e.span));
    }

    // No algebraic fold at this node, but a child may have changed.
    if folded_lhs.is_some() || folded_rhs.is_some() {
        return Some(Expression::new(
            ExpressionKind::Binary {
                operator: *operator,
                lhs: Box::new(left.clone()),
                rhs: Box::new(right.clone()),
            },
            e.span,
        ));
    }

    None
}

fn fold_binary(
    operator: BinaryOperatorKind,
    lhs: &Expression,
    rhs: &Expression,
) -> Option<ExpressionKind> {
    match (&lhs.kind, &rhs.kind) {
        (ExpressionKind::NumberLit(a), ExpressionKind::NumberLit(b)) => {
            let a = parse_int_literal(a.value())?;
            let b = parse_int_literal(b.value())?;
            let folded = match operator {
                BinaryOperatorKind::Add => a.checked_add(b)?,
                BinaryOperatorKind::Subtract => a.checked_sub(b)?,
                BinaryOperatorKind::Multiply => a.checked_mul(b)?,
                BinaryOperatorKind::Divide => a.checked_div(b)?,
                BinaryOperatorKind::Modulus => a.checked_rem(b)?,
                _ => return None,
            };
            Some(ExpressionKind::NumberLit(Symbol::new(&folded.to_string())))
        }
        (ExpressionKind::StringLit(a), ExpressionKind::StringLit(b))
            if operator == BinaryOperatorKind::Add =>
        {
            let mut joined = String::with_capacity(a.value().len() + b.value().len());
            joined.push_str(a.value());
            joined.push_str(b.value());
            Some(ExpressionKind::StringLit(Symbol::new(&joined)))
        }
        _ => None,
    }
}

/// Parses an integer literal in decimal, `0x`, `0b`, or `0o` notation.
pub(crate) fn parse_int_literal(text: &str) -> Option<i64> {
    let text = text.trim();
    let (digits, radix) = match text.get(..2) {
        Some("0x") | Some("0X") => (&text[2..], 16),
        Some("0b") | Some("0B") => (&text[2..], 2),
        Some("0o") | Some("0O") => (&text[2..], 8),
        _ => (text, 10),
    };
    i64::from_str_radix(digits, radix).ok()
}
