use core::cmp::Ordering as CmpOrdering;

use crate::command::Parameters;
use crate::error::{QuarryError, Result};
use crate::model::{BinaryOp, Expr, Method};
use crate::row::ValueRow;
use crate::value::Value;

use super::RowLayout;

/// Evaluates model expressions against environment rows with host semantics:
/// NULL equals NULL, ordered comparisons against NULL are false, and the
/// negation of a NULL predicate is true.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    layout: Option<&'a RowLayout>,
    params: &'a Parameters,
}

impl<'a> Evaluator<'a> {
    pub fn new(layout: Option<&'a RowLayout>, params: &'a Parameters) -> Self {
        Self { layout, params }
    }

    fn layout(&self) -> Result<&'a RowLayout> {
        self.layout.ok_or_else(|| {
            QuarryError::InvalidQuery("member access outside client evaluation".into())
        })
    }

    /// Evaluates an expression that does not read any row.
    pub fn eval_free(&self, expr: &Expr) -> Result<Value> {
        self.eval(expr, &[])
    }

    pub fn eval(&self, expr: &Expr, env: &[Value]) -> Result<Value> {
        match expr {
            Expr::Constant(v) => Ok(v.clone()),
            Expr::Parameter(name) => self.params.require(name).cloned(),
            Expr::Member { source, name } => {
                let position = self.layout()?.position(*source, name).ok_or_else(|| {
                    QuarryError::Mapping(format!("member `{name}` is not part of the row"))
                })?;
                env.get(position).cloned().ok_or_else(|| {
                    QuarryError::Mapping(format!("row has no column {position}"))
                })
            }
            Expr::Binary { op, left, right } => {
                // short-circuit like the host language
                match op {
                    BinaryOp::And => {
                        if !self.eval(left, env)?.is_truthy() {
                            return Ok(Value::from(false));
                        }
                        return Ok(Value::from(self.eval(right, env)?.is_truthy()));
                    }
                    BinaryOp::Or => {
                        if self.eval(left, env)?.is_truthy() {
                            return Ok(Value::from(true));
                        }
                        return Ok(Value::from(self.eval(right, env)?.is_truthy()));
                    }
                    _ => {}
                }
                let l = self.eval(left, env)?;
                let r = self.eval(right, env)?;
                Ok(binary(*op, &l, &r))
            }
            // NULL negates to true, as `CASE WHEN p THEN 0 ELSE 1 END = 1` does
            Expr::Not(inner) => Ok(Value::from(!self.eval(inner, env)?.is_truthy())),
            Expr::In {
                operand,
                values,
                negated,
            } => {
                let v = self.eval(operand, env)?;
                Ok(Value::from(values.contains(&v) != *negated))
            }
            Expr::Call {
                method,
                target,
                args,
            } => {
                let target = self.eval(target, env)?;
                let args = args
                    .iter()
                    .map(|a| self.eval(a, env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(call(*method, &target, &args))
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                if self.eval(test, env)?.is_truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(otherwise, env)
                }
            }
            Expr::Client { function, args } => {
                let args = args
                    .iter()
                    .map(|a| self.eval(a, env))
                    .collect::<Result<Vec<_>>>()?;
                Ok(function.call(&args))
            }
            Expr::Source(_) | Expr::Tuple(_) => Err(QuarryError::InvalidQuery(
                "entity or tuple used where a scalar is expected".into(),
            )),
        }
    }

    /// Evaluates a selector into a flat output row.
    pub fn project(&self, selector: &Expr, env: &[Value], out: &mut ValueRow) -> Result<()> {
        match selector {
            Expr::Source(source) => {
                let layout = self.layout()?;
                for position in layout.source_positions(*source) {
                    out.push(env.get(position).cloned().unwrap_or_default());
                }
                Ok(())
            }
            Expr::Tuple(items) => {
                for item in items {
                    self.project(item, env, out)?;
                }
                Ok(())
            }
            scalar => {
                out.push(self.eval(scalar, env)?);
                Ok(())
            }
        }
    }

    /// Evaluates a row count (`Skip`/`Take`), clamping negatives to zero.
    pub fn count(&self, expr: &Expr) -> Result<usize> {
        let value = self.eval_free(expr)?;
        let n = value.as_i64().ok_or_else(|| {
            QuarryError::InvalidQuery(format!("row count must be an integer, got {value}"))
        })?;
        Ok(usize::try_from(n.max(0)).unwrap_or(usize::MAX))
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Eq => Value::from(l == r),
        BinaryOp::Ne => Value::from(l != r),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if l.is_null() || r.is_null() {
                return Value::from(false);
            }
            let ord = l.sql_cmp(r);
            Value::from(match op {
                BinaryOp::Lt => ord == CmpOrdering::Less,
                BinaryOp::Le => ord != CmpOrdering::Greater,
                BinaryOp::Gt => ord == CmpOrdering::Greater,
                _ => ord != CmpOrdering::Less,
            })
        }
        BinaryOp::And => Value::from(l.is_truthy() && r.is_truthy()),
        BinaryOp::Or => Value::from(l.is_truthy() || r.is_truthy()),
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arithmetic(op, l, r),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match (l, r) {
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                BinaryOp::Add => a.checked_add(*b),
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                _ => a.checked_div(*b),
            };
            result.map_or(Value::Null, Value::Integer)
        }
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => match op {
                BinaryOp::Add => Value::Real(a + b),
                BinaryOp::Sub => Value::Real(a - b),
                BinaryOp::Mul => Value::Real(a * b),
                _ if b == 0.0 => Value::Null,
                _ => Value::Real(a / b),
            },
            _ => Value::Null,
        },
    }
}

/// String methods with the same semantics as their SQL renderings.
fn call(method: Method, target: &Value, args: &[Value]) -> Value {
    let Some(s) = target.as_str() else {
        return Value::Null;
    };
    let arg = args.first().and_then(Value::as_str);
    match method {
        Method::StartsWith => arg.map_or(Value::Null, |p| Value::from(s.starts_with(p))),
        Method::EndsWith => arg.map_or(Value::Null, |p| Value::from(s.ends_with(p))),
        Method::Contains => arg.map_or(Value::Null, |p| Value::from(s.contains(p))),
        Method::ToUpper => Value::from(s.to_ascii_uppercase()),
        Method::ToLower => Value::from(s.to_ascii_lowercase()),
        Method::Length => Value::Integer(s.chars().count() as i64),
        Method::Trim => Value::from(s.trim_matches(' ')),
    }
}
