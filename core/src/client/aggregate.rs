use std::collections::VecDeque;

use crate::error::{QuarryError, Result};
use crate::model::Expr;
use crate::row::ValueRow;
use crate::value::Value;

use super::{Evaluator, NullAggregate, Terminal};

/// Running state of a [`Terminal`].
///
/// `push` returns `true` once the result is decided and no further rows can
/// change it.
#[derive(Debug)]
pub enum Aggregator {
    Collect,
    Scalar {
        on_null: NullAggregate,
        value: Option<Value>,
    },
    Count(i64),
    Any {
        predicate: Option<Expr>,
        found: bool,
    },
    All {
        predicate: Expr,
        holds: bool,
    },
    Min {
        nullable: bool,
        best: Option<Value>,
    },
    Max {
        nullable: bool,
        best: Option<Value>,
    },
    Sum(Option<Value>),
    Average {
        nullable: bool,
        total: f64,
        count: u64,
    },
    First {
        or_default: bool,
        row: Option<ValueRow>,
    },
    Single {
        or_default: bool,
        row: Option<ValueRow>,
    },
    Last {
        or_default: bool,
        row: Option<ValueRow>,
    },
    Contains {
        item: Value,
        found: bool,
    },
}

impl Aggregator {
    pub fn new(terminal: &Terminal, eval: &Evaluator<'_>) -> Result<Self> {
        Ok(match terminal {
            Terminal::Sequence => Self::Collect,
            Terminal::Scalar(on_null) => Self::Scalar {
                on_null: *on_null,
                value: None,
            },
            Terminal::Count => Self::Count(0),
            Terminal::Any(predicate) => Self::Any {
                predicate: predicate.clone(),
                found: false,
            },
            Terminal::All(predicate) => Self::All {
                predicate: predicate.clone(),
                holds: true,
            },
            Terminal::Min { nullable } => Self::Min {
                nullable: *nullable,
                best: None,
            },
            Terminal::Max { nullable } => Self::Max {
                nullable: *nullable,
                best: None,
            },
            Terminal::Sum => Self::Sum(None),
            Terminal::Average { nullable } => Self::Average {
                nullable: *nullable,
                total: 0.0,
                count: 0,
            },
            Terminal::First { or_default } => Self::First {
                or_default: *or_default,
                row: None,
            },
            Terminal::Single { or_default } => Self::Single {
                or_default: *or_default,
                row: None,
            },
            Terminal::Last { or_default } => Self::Last {
                or_default: *or_default,
                row: None,
            },
            Terminal::Contains(item) => Self::Contains {
                item: eval.eval_free(item)?,
                found: false,
            },
        })
    }

    /// Feeds one projected row; `env` is the row it was projected from.
    pub fn push(
        &mut self,
        eval: &Evaluator<'_>,
        env: &[Value],
        row: ValueRow,
        emit: &mut VecDeque<ValueRow>,
    ) -> Result<bool> {
        match self {
            Self::Collect => {
                emit.push_back(row);
                Ok(false)
            }
            Self::Scalar { value, .. } => {
                *value = Some(first_value(row));
                Ok(true)
            }
            Self::Count(n) => {
                *n += 1;
                Ok(false)
            }
            Self::Any { predicate, found } => {
                *found = match predicate {
                    Some(p) => eval.eval(p, env)?.is_truthy(),
                    None => true,
                };
                Ok(*found)
            }
            Self::All { predicate, holds } => {
                *holds = eval.eval(predicate, env)?.is_truthy();
                Ok(!*holds)
            }
            Self::Min { best, .. } => {
                let v = first_value(row);
                if !v.is_null() && best.as_ref().is_none_or(|b| v < *b) {
                    *best = Some(v);
                }
                Ok(false)
            }
            Self::Max { best, .. } => {
                let v = first_value(row);
                if !v.is_null() && best.as_ref().is_none_or(|b| v > *b) {
                    *best = Some(v);
                }
                Ok(false)
            }
            Self::Sum(total) => {
                let v = first_value(row);
                if !v.is_null() {
                    *total = Some(match total.take() {
                        None => v,
                        Some(acc) => add(&acc, &v)?,
                    });
                }
                Ok(false)
            }
            Self::Average { total, count, .. } => {
                let v = first_value(row);
                if let Some(f) = v.as_f64() {
                    *total += f;
                    *count += 1;
                }
                Ok(false)
            }
            Self::First { row: slot, .. } => {
                *slot = Some(row);
                Ok(true)
            }
            Self::Single { row: slot, .. } => {
                if slot.is_some() {
                    return Err(QuarryError::MultipleElements);
                }
                *slot = Some(row);
                Ok(false)
            }
            Self::Last { row: slot, .. } => {
                *slot = Some(row);
                Ok(false)
            }
            Self::Contains { item, found } => {
                *found = first_value(row) == *item;
                Ok(*found)
            }
        }
    }

    /// Emits the final result, if the terminal produces one.
    pub fn finish(&mut self, emit: &mut VecDeque<ValueRow>) -> Result<()> {
        let result = match self {
            Self::Collect => return Ok(()),
            Self::Scalar { on_null, value } => match (value.take(), on_null) {
                (Some(v), _) if !v.is_null() => v,
                (_, NullAggregate::Keep) => Value::Null,
                (_, NullAggregate::Zero) => Value::Integer(0),
                (_, NullAggregate::Empty) => return Err(QuarryError::EmptySequence),
            },
            Self::Count(n) => Value::Integer(*n),
            Self::Any { found, .. } => Value::from(*found),
            Self::All { holds, .. } => Value::from(*holds),
            Self::Min { nullable, best } | Self::Max { nullable, best } => match best.take() {
                Some(v) => v,
                None if *nullable => Value::Null,
                None => return Err(QuarryError::EmptySequence),
            },
            Self::Sum(total) => total.take().unwrap_or(Value::Integer(0)),
            Self::Average {
                nullable,
                total,
                count,
            } => match *count {
                0 if *nullable => Value::Null,
                0 => return Err(QuarryError::EmptySequence),
                n => Value::Real(*total / n as f64),
            },
            Self::First { or_default, row }
            | Self::Single { or_default, row }
            | Self::Last { or_default, row } => {
                match row.take() {
                    Some(row) => emit.push_back(row),
                    None if *or_default => {}
                    None => return Err(QuarryError::EmptySequence),
                }
                return Ok(());
            }
            Self::Contains { found, .. } => Value::from(*found),
        };
        emit.push_back(smallvec::smallvec![result]);
        Ok(())
    }
}

fn first_value(row: ValueRow) -> Value {
    row.into_iter().next().unwrap_or_default()
}

fn add(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x
            .checked_add(*y)
            .map(Value::Integer)
            .ok_or_else(|| QuarryError::Execution("integer overflow in sum".into())),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::Real(x + y)),
            _ => Err(QuarryError::Mapping(format!("cannot sum {a} and {b}"))),
        },
    }
}
