//! Model expression to SQL expression translation.
//!
//! Comparisons are compensated so that the server agrees with client
//! evaluation, where NULL equals NULL and a NULL operand never makes a
//! comparison true.

use crate::command::ParamSlot;
use crate::error::{QuarryError, Result};
use crate::model::{BinaryOp, Expr, Method};
use crate::select::{ExprId, SqlExpr};
use crate::value::Value;

use super::TranslationContext;

impl TranslationContext<'_> {
    /// Translates `expr`; `Ok(None)` when it has no SQL form.
    pub(crate) fn translate(&mut self, expr: &Expr) -> Result<Option<ExprId>> {
        match expr {
            Expr::Source(_) | Expr::Tuple(_) | Expr::Client { .. } => Ok(None),
            Expr::Constant(value) => Ok(Some(self.constant(value.clone()))),
            Expr::Parameter(name) => Ok(Some(
                self.arena
                    .add(SqlExpr::Parameter(ParamSlot::named(name.clone()))),
            )),
            Expr::Member { source, name } => {
                self.bindings
                    .column(self.metadata, &mut self.arena, *source, name)
            }
            Expr::Binary { op, left, right } => self.translate_binary(*op, left, right),
            Expr::Not(inner) => self.translate_not(inner),
            Expr::In {
                operand,
                values,
                negated,
            } => self.translate_in(operand, values, *negated),
            Expr::Call {
                method,
                target,
                args,
            } => self.translate_call(*method, target, args),
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                let Some(test) = self.translate(test)? else {
                    return Ok(None);
                };
                let Some(then) = self.translate(then)? else {
                    return Ok(None);
                };
                let Some(otherwise) = self.translate(otherwise)? else {
                    return Ok(None);
                };
                Ok(Some(self.arena.add(SqlExpr::Case {
                    whens: vec![(test, then)],
                    otherwise: Some(otherwise),
                })))
            }
        }
    }

    fn translate_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Option<ExprId>> {
        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            let other = match (left.is_null_constant(), right.is_null_constant()) {
                (true, true) => return Ok(Some(self.truth(op == BinaryOp::Eq))),
                (false, true) => Some(left),
                (true, false) => Some(right),
                (false, false) => None,
            };
            if let Some(other) = other {
                let Some(id) = self.translate(other)? else {
                    return Ok(None);
                };
                let test = if op == BinaryOp::Eq {
                    SqlExpr::IsNull(id)
                } else {
                    SqlExpr::IsNotNull(id)
                };
                return Ok(Some(self.arena.add(test)));
            }
        }

        let Some(l) = self.translate(left)? else {
            return Ok(None);
        };
        let Some(r) = self.translate(right)? else {
            return Ok(None);
        };
        Ok(Some(match op {
            BinaryOp::Eq => self.equal(l, r),
            BinaryOp::Ne => self.not_equal(l, r),
            _ => self.arena.binary(op, l, r),
        }))
    }

    /// `l = r`, plus `OR (l IS NULL AND r IS NULL)` when both can be NULL.
    pub(crate) fn equal(&mut self, l: ExprId, r: ExprId) -> ExprId {
        let eq = self.arena.binary(BinaryOp::Eq, l, r);
        if !(self.arena.is_nullable(l) && self.arena.is_nullable(r)) {
            return eq;
        }
        let l_null = self.arena.add(SqlExpr::IsNull(l));
        let r_null = self.arena.add(SqlExpr::IsNull(r));
        let both_null = self.arena.and(l_null, r_null);
        self.arena.or(eq, both_null)
    }

    fn not_equal(&mut self, l: ExprId, r: ExprId) -> ExprId {
        let ne = self.arena.binary(BinaryOp::Ne, l, r);
        match (self.arena.is_nullable(l), self.arena.is_nullable(r)) {
            (false, false) => ne,
            (true, false) => {
                let l_null = self.arena.add(SqlExpr::IsNull(l));
                self.arena.or(ne, l_null)
            }
            (false, true) => {
                let r_null = self.arena.add(SqlExpr::IsNull(r));
                self.arena.or(ne, r_null)
            }
            (true, true) => {
                let l_null = self.arena.add(SqlExpr::IsNull(l));
                let r_null = self.arena.add(SqlExpr::IsNull(r));
                let differ = self.arena.or(ne, l_null);
                let differ = self.arena.or(differ, r_null);
                let l_set = self.arena.add(SqlExpr::IsNotNull(l));
                let r_set = self.arena.add(SqlExpr::IsNotNull(r));
                let any_set = self.arena.or(l_set, r_set);
                self.arena.and(differ, any_set)
            }
        }
    }

    fn translate_not(&mut self, inner: &Expr) -> Result<Option<ExprId>> {
        match inner {
            Expr::Binary {
                op: BinaryOp::Eq,
                left,
                right,
            } => self.translate_binary(BinaryOp::Ne, left, right),
            Expr::Binary {
                op: BinaryOp::Ne,
                left,
                right,
            } => self.translate_binary(BinaryOp::Eq, left, right),
            Expr::In {
                operand,
                values,
                negated,
            } => self.translate_in(operand, values, !negated),
            Expr::Not(twice) => self.translate(twice),
            other => {
                let Some(id) = self.translate(other)? else {
                    return Ok(None);
                };
                if !self.arena.is_nullable(id) {
                    return Ok(Some(self.arena.add(SqlExpr::Not(id))));
                }
                // NULL must negate to true: CASE WHEN x THEN 0 ELSE 1 END = 1
                let zero = self.arena.add(SqlExpr::Number(0));
                let one = self.arena.add(SqlExpr::Number(1));
                let case = self.arena.add(SqlExpr::Case {
                    whens: vec![(id, zero)],
                    otherwise: Some(one),
                });
                Ok(Some(self.arena.binary(BinaryOp::Eq, case, one)))
            }
        }
    }

    fn translate_in(&mut self, operand: &Expr, values: &[Value], negated: bool) -> Result<Option<ExprId>> {
        let Some(operand) = self.translate(operand)? else {
            return Ok(None);
        };
        let has_null = values.iter().any(Value::is_null);
        let items = values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| self.constant(v.clone()))
            .collect();
        let list = self.arena.add(SqlExpr::In {
            operand,
            values: items,
            negated,
        });
        if !self.arena.is_nullable(operand) {
            return Ok(Some(list));
        }
        Ok(Some(match (negated, has_null) {
            (false, false) => list,
            (false, true) | (true, false) => {
                let is_null = self.arena.add(SqlExpr::IsNull(operand));
                self.arena.or(list, is_null)
            }
            (true, true) => {
                let is_set = self.arena.add(SqlExpr::IsNotNull(operand));
                self.arena.and(list, is_set)
            }
        }))
    }

    fn translate_call(&mut self, method: Method, target: &Expr, args: &[Expr]) -> Result<Option<ExprId>> {
        if args.len() != method.arity() {
            return Err(QuarryError::InvalidQuery(format!(
                "{method:?} takes {} argument(s), got {}",
                method.arity(),
                args.len()
            )));
        }
        let Some(target) = self.translate(target)? else {
            return Ok(None);
        };
        let function = match method {
            Method::StartsWith | Method::EndsWith | Method::Contains => {
                let Some(pattern) = self.translate(&args[0])? else {
                    return Ok(None);
                };
                return Ok(Some(self.arena.add(SqlExpr::Match {
                    method,
                    target,
                    pattern,
                })));
            }
            Method::ToUpper => "upper",
            Method::ToLower => "lower",
            Method::Length => "length",
            Method::Trim => "trim",
        };
        Ok(Some(self.arena.add(SqlExpr::Function {
            name: function,
            args: vec![target],
        })))
    }

    /// Constant predicate `1 = 1` or `1 = 0`.
    pub(crate) fn truth(&mut self, value: bool) -> ExprId {
        let one = self.arena.add(SqlExpr::Number(1));
        let rhs = self.arena.add(SqlExpr::Number(i64::from(value)));
        self.arena.binary(BinaryOp::Eq, one, rhs)
    }
}
