//! Equality predicate optimizer.
//!
//! `x = 1 OR x = 2 OR x = 3` becomes `x IN (1, 2, 3)` and
//! `x <> 1 AND x <> 2` becomes `x NOT IN (1, 2)`. Only member comparisons
//! against non-null constants participate.

use crate::model::{BinaryOp, Expr};
use crate::value::Value;

/// Rewrites same-member equality chains into IN lists, operands first.
pub fn optimize_equality(expr: Expr) -> Expr {
    match expr {
        Expr::Binary { op, left, right } if op.is_logical() => {
            let left = optimize_equality(*left);
            let right = optimize_equality(*right);
            let negated = op == BinaryOp::And;
            let merged = match (membership(&left, negated), membership(&right, negated)) {
                (Some((l_member, l_values)), Some((r_member, r_values)))
                    if l_member == r_member =>
                {
                    let mut values = l_values;
                    for v in r_values {
                        if !values.contains(&v) {
                            values.push(v);
                        }
                    }
                    Some(Expr::In {
                        operand: Box::new(l_member.clone()),
                        values,
                        negated,
                    })
                }
                _ => None,
            };
            merged.unwrap_or_else(|| Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            })
        }
        Expr::Not(inner) => Expr::Not(Box::new(optimize_equality(*inner))),
        other => other,
    }
}

/// `member = constant` (or `<>` when `negated`), or a matching IN list.
fn membership(expr: &Expr, negated: bool) -> Option<(&Expr, Vec<Value>)> {
    let wanted = if negated { BinaryOp::Ne } else { BinaryOp::Eq };
    match expr {
        Expr::Binary { op, left, right } if *op == wanted => match (&**left, &**right) {
            (member @ Expr::Member { .. }, Expr::Constant(v))
            | (Expr::Constant(v), member @ Expr::Member { .. })
                if !v.is_null() =>
            {
                Some((member, vec![v.clone()]))
            }
            _ => None,
        },
        Expr::In {
            operand,
            values,
            negated: n,
        } if *n == negated
            && matches!(**operand, Expr::Member { .. })
            && values.iter().all(|v| !v.is_null()) =>
        {
            Some((&**operand, values.clone()))
        }
        _ => None,
    }
}
