//! Result operator handling.
//!
//! Each operator is either folded into the select tree or evaluated on the
//! client. Falling back is sticky: once an operator runs on the client, every
//! later operator does too. When the server tree was already reshaped
//! (distinct, derived table) the handler restores the tree captured before
//! the first operator and replays the pushed operators on the client.

use compact_str::CompactString;

use crate::client::{NullAggregate, ResultStage, Terminal};
use crate::command::ParamSlot;
use crate::error::{QuarryError, Result};
use crate::model::{BinaryOp, Expr, ResultOperator, SourceHandle};
use crate::query::ResultShape;
use crate::select::{ExprId, ProjectionItem, SelectExpression, SelectId, SqlExpr};
use crate::value::Value;

use super::{BindingMap, TranslationContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Translating,
    PushedToServer,
    FallbackToClient,
    Finalized,
}

#[derive(Debug, Clone)]
struct Snapshot {
    select: SelectId,
    bindings: BindingMap,
}

#[derive(Debug)]
pub struct ResultOperatorHandler {
    state: HandlerState,
    base: Option<Snapshot>,
    server_ops: Vec<ResultOperator>,
    /// The server projection no longer matches plain source rows.
    shape_locked: bool,
}

impl ResultOperatorHandler {
    pub(crate) fn new(ctx: &mut TranslationContext<'_>) -> Self {
        if ctx.requires_client_eval {
            return Self {
                state: HandlerState::FallbackToClient,
                base: None,
                server_ops: Vec::new(),
                shape_locked: false,
            };
        }
        let select = ctx.arena.clone_select(ctx.current);
        Self {
            state: HandlerState::Translating,
            base: Some(Snapshot {
                select,
                bindings: ctx.bindings.clone(),
            }),
            server_ops: Vec::new(),
            shape_locked: false,
        }
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub(crate) fn handle(
        &mut self,
        ctx: &mut TranslationContext<'_>,
        op: &ResultOperator,
    ) -> Result<()> {
        match self.state {
            HandlerState::Finalized => {
                return Err(QuarryError::InvalidQuery(
                    "result operator after finalization".into(),
                ));
            }
            HandlerState::FallbackToClient => return client(ctx, op),
            HandlerState::Translating | HandlerState::PushedToServer => {}
        }
        if self.server(ctx, op)? {
            self.state = HandlerState::PushedToServer;
            if !op.is_terminal() {
                self.server_ops.push(op.clone());
            }
            return Ok(());
        }
        self.fall_back(ctx, op.name())?;
        client(ctx, op)
    }

    pub(crate) fn finish(&mut self) {
        self.state = HandlerState::Finalized;
    }

    fn fall_back(&mut self, ctx: &mut TranslationContext<'_>, stage: &'static str) -> Result<()> {
        crate::quarry_trace_fallback!(stage, "result operator evaluated on the client");
        #[cfg(not(feature = "tracing"))]
        let _ = stage;
        self.state = HandlerState::FallbackToClient;
        ctx.requires_client_eval = true;
        if self.shape_locked
            && let Some(base) = &self.base
        {
            ctx.current = ctx.arena.clone_select(base.select);
            ctx.bindings = base.bindings.clone();
            for op in std::mem::take(&mut self.server_ops) {
                client(ctx, &op)?;
            }
        }
        ctx.refresh_projection()
    }

    fn lock_shape(&mut self, ctx: &TranslationContext<'_>) {
        if !ctx.env_mode() {
            self.shape_locked = true;
        }
    }

    fn push_down(&mut self, ctx: &mut TranslationContext<'_>) {
        self.lock_shape(ctx);
        ctx.push_down();
    }

    /// Folds `op` into the select tree; `Ok(false)` when it must run on the client.
    fn server(&mut self, ctx: &mut TranslationContext<'_>, op: &ResultOperator) -> Result<bool> {
        match op {
            ResultOperator::Count | ResultOperator::LongCount => {
                let select = ctx.select();
                if select.is_distinct || select.has_limit_or_offset() {
                    self.push_down(ctx);
                }
                let count = ctx.arena.add(SqlExpr::CountStar);
                ctx.set_scalar_projection(count);
                ctx.terminal = Terminal::Scalar(NullAggregate::Keep);
                Ok(true)
            }
            ResultOperator::Any(predicate) => {
                if let Some(predicate) = predicate {
                    if ctx.select().is_distinct || ctx.select().has_limit_or_offset() {
                        self.push_down(ctx);
                    }
                    let Some(predicate) = ctx.translate(predicate)? else {
                        return Ok(false);
                    };
                    ctx.arena.and_where(ctx.current, predicate);
                }
                wrap_exists(ctx, false);
                Ok(true)
            }
            ResultOperator::All(predicate) => {
                if ctx.select().is_distinct || ctx.select().has_limit_or_offset() {
                    self.push_down(ctx);
                }
                let Some(predicate) = ctx.translate(predicate)? else {
                    return Ok(false);
                };
                // rows where the predicate is false or NULL
                let one = ctx.arena.add(SqlExpr::Number(1));
                let zero = ctx.arena.add(SqlExpr::Number(0));
                let case = ctx.arena.add(SqlExpr::Case {
                    whens: vec![(predicate, one)],
                    otherwise: Some(zero),
                });
                let failing = ctx.arena.binary(BinaryOp::Eq, case, zero);
                ctx.arena.and_where(ctx.current, failing);
                wrap_exists(ctx, true);
                Ok(true)
            }
            ResultOperator::Distinct => {
                if ctx.client_projection {
                    return Ok(false);
                }
                if ctx.select().has_limit_or_offset() {
                    self.push_down(ctx);
                }
                let select = ctx.select();
                let all_projected = select.orderings.iter().all(|o| {
                    select
                        .projection
                        .iter()
                        .any(|item| ctx.arena.same(item.expr, o.expr))
                });
                let select = ctx.select_mut();
                select.is_distinct = true;
                if !all_projected {
                    select.orderings.clear();
                }
                self.lock_shape(ctx);
                Ok(true)
            }
            ResultOperator::Min => self.aggregate(ctx, "MIN"),
            ResultOperator::Max => self.aggregate(ctx, "MAX"),
            ResultOperator::Sum => self.aggregate(ctx, "SUM"),
            ResultOperator::Average => self.aggregate(ctx, "AVG"),
            ResultOperator::Skip(count) => {
                let Some(offset) = row_count(ctx, count) else {
                    return Ok(false);
                };
                if ctx.select().has_limit_or_offset() {
                    self.push_down(ctx);
                }
                ctx.select_mut().offset = Some(offset);
                Ok(true)
            }
            ResultOperator::Take(count) => {
                let Some(limit) = row_count(ctx, count) else {
                    return Ok(false);
                };
                if ctx.select().limit.is_some() {
                    self.push_down(ctx);
                }
                ctx.select_mut().limit = Some(limit);
                Ok(true)
            }
            ResultOperator::First { or_default } => {
                self.limit_to(ctx, 1);
                ctx.terminal = Terminal::First {
                    or_default: *or_default,
                };
                ctx.shape = ResultShape::Element;
                Ok(true)
            }
            ResultOperator::Single { or_default } => {
                // two rows are enough to detect a second element
                self.limit_to(ctx, 2);
                ctx.terminal = Terminal::Single {
                    or_default: *or_default,
                };
                ctx.shape = ResultShape::Element;
                Ok(true)
            }
            ResultOperator::Last { or_default } => {
                if ctx.select().orderings.is_empty() {
                    return Ok(false);
                }
                if ctx.select().has_limit_or_offset() {
                    self.push_down(ctx);
                    if ctx.select().orderings.is_empty() {
                        return Ok(false);
                    }
                }
                for ordering in &mut ctx.select_mut().orderings {
                    ordering.direction = ordering.direction.reversed();
                }
                let one = ctx.arena.add(SqlExpr::Number(1));
                ctx.select_mut().limit = Some(one);
                ctx.terminal = Terminal::First {
                    or_default: *or_default,
                };
                ctx.shape = ResultShape::Element;
                Ok(true)
            }
            ResultOperator::OfType(entity) => {
                let Expr::Source(source) = ctx.selector else {
                    return Err(QuarryError::InvalidQuery(
                        "of_type requires an entity selector".into(),
                    ));
                };
                let Some((member, values)) = of_type_filter(ctx, source, entity)? else {
                    return Ok(true);
                };
                if ctx.select().has_limit_or_offset() {
                    self.push_down(ctx);
                }
                let Some(column) =
                    ctx.bindings
                        .column(ctx.metadata, &mut ctx.arena, source, &member)?
                else {
                    return Ok(false);
                };
                let predicate = ctx.in_values(column, &values);
                ctx.arena.and_where(ctx.current, predicate);
                Ok(true)
            }
            ResultOperator::Contains(item) => {
                if ctx.client_projection || ctx.select().projection.len() != 1 {
                    return Ok(false);
                }
                match item {
                    Expr::Constant(value) if !value.is_null() => {
                        // ? IN (SELECT col ...)
                        let inner = ctx.current;
                        if !ctx.select().has_limit_or_offset() {
                            ctx.select_mut().orderings.clear();
                        }
                        let value = ctx.constant(value.clone());
                        let test = ctx.arena.add(SqlExpr::InSubquery {
                            operand: value,
                            select: inner,
                        });
                        finish_case(ctx, test);
                    }
                    other => {
                        let select = ctx.select();
                        if select.is_distinct || select.has_limit_or_offset() {
                            self.push_down(ctx);
                        }
                        let Some(item) = ctx.translate(other)? else {
                            return Ok(false);
                        };
                        let column = ctx.select().projection[0].expr;
                        let matches = ctx.equal(column, item);
                        ctx.arena.and_where(ctx.current, matches);
                        wrap_exists(ctx, false);
                    }
                }
                Ok(true)
            }
        }
    }

    fn aggregate(&mut self, ctx: &mut TranslationContext<'_>, function: &'static str) -> Result<bool> {
        if ctx.client_projection || ctx.select().projection.len() != 1 {
            return Ok(false);
        }
        let select = ctx.select();
        if select.is_distinct || select.has_limit_or_offset() {
            self.push_down(ctx);
        }
        let column = ctx.select().projection[0].expr;
        let nullable = ctx.arena.is_nullable(column);
        let aggregate = ctx.arena.add(SqlExpr::Function {
            name: function,
            args: vec![column],
        });
        ctx.set_scalar_projection(aggregate);
        ctx.terminal = Terminal::Scalar(match function {
            "SUM" => NullAggregate::Zero,
            _ if nullable => NullAggregate::Keep,
            _ => NullAggregate::Empty,
        });
        Ok(true)
    }

    /// `LIMIT n`, over a derived table when a limit is already set.
    fn limit_to(&mut self, ctx: &mut TranslationContext<'_>, n: i64) {
        if ctx.select().limit.is_some() {
            self.push_down(ctx);
        }
        let limit = ctx.arena.add(SqlExpr::Number(n));
        ctx.select_mut().limit = Some(limit);
    }
}

/// Records `op` as a client stage or terminal.
fn client(ctx: &mut TranslationContext<'_>, op: &ResultOperator) -> Result<()> {
    let scalar_terminal = |ctx: &mut TranslationContext<'_>, terminal: Terminal| {
        ctx.terminal = terminal;
        ctx.shape = ResultShape::Scalar;
    };
    match op {
        ResultOperator::Count | ResultOperator::LongCount => {
            scalar_terminal(ctx, Terminal::Count);
        }
        ResultOperator::Any(predicate) => scalar_terminal(ctx, Terminal::Any(predicate.clone())),
        ResultOperator::All(predicate) => scalar_terminal(ctx, Terminal::All(predicate.clone())),
        ResultOperator::Distinct => ctx.results.push(ResultStage::Distinct),
        ResultOperator::Min | ResultOperator::Max | ResultOperator::Average => {
            require_scalar_selector(ctx, op)?;
            let nullable = ctx.selector_nullable()?;
            let terminal = match op {
                ResultOperator::Min => Terminal::Min { nullable },
                ResultOperator::Max => Terminal::Max { nullable },
                _ => Terminal::Average { nullable },
            };
            scalar_terminal(ctx, terminal);
        }
        ResultOperator::Sum => {
            require_scalar_selector(ctx, op)?;
            scalar_terminal(ctx, Terminal::Sum);
        }
        ResultOperator::Skip(count) => {
            require_row_free(count)?;
            ctx.results.push(ResultStage::Skip(count.clone()));
        }
        ResultOperator::Take(count) => {
            require_row_free(count)?;
            ctx.results.push(ResultStage::Take(count.clone()));
        }
        ResultOperator::First { or_default } => {
            ctx.terminal = Terminal::First {
                or_default: *or_default,
            };
            ctx.shape = ResultShape::Element;
        }
        ResultOperator::Single { or_default } => {
            ctx.terminal = Terminal::Single {
                or_default: *or_default,
            };
            ctx.shape = ResultShape::Element;
        }
        ResultOperator::Last { or_default } => {
            ctx.terminal = Terminal::Last {
                or_default: *or_default,
            };
            ctx.shape = ResultShape::Element;
        }
        ResultOperator::OfType(entity) => {
            let Expr::Source(source) = ctx.selector else {
                return Err(QuarryError::InvalidQuery(
                    "of_type requires an entity selector".into(),
                ));
            };
            if let Some((member, values)) = of_type_filter(ctx, source, entity)? {
                ctx.results.push(ResultStage::OfType {
                    source,
                    discriminator: Some(member),
                    values,
                });
            }
        }
        ResultOperator::Contains(item) => {
            require_scalar_selector(ctx, op)?;
            require_row_free(item)?;
            scalar_terminal(ctx, Terminal::Contains(item.clone()));
        }
    }
    Ok(())
}

/// Discriminator filter for `of_type(entity)` on `source`, `None` when no
/// predicate is needed.
fn of_type_filter(
    ctx: &TranslationContext<'_>,
    source: SourceHandle,
    entity: &str,
) -> Result<Option<(CompactString, Vec<Value>)>> {
    let source_entity = ctx.entity_of(source)?;
    let target_root = ctx.metadata.root_type(entity)?;
    let source_root = ctx.metadata.root_type(&source_entity)?;
    if target_root.name != source_root.name {
        return Err(QuarryError::InvalidQuery(format!(
            "`{entity}` is not in the hierarchy of `{source_entity}`"
        )));
    }
    ctx.type_filter(entity)
}

fn require_scalar_selector(ctx: &TranslationContext<'_>, op: &ResultOperator) -> Result<()> {
    if ctx.selector_is_scalar() {
        Ok(())
    } else {
        Err(QuarryError::InvalidQuery(format!(
            "{} needs a single-value selector",
            op.name()
        )))
    }
}

fn require_row_free(expr: &Expr) -> Result<()> {
    let mut reads_row = false;
    expr.walk(&mut |e| {
        if matches!(e, Expr::Member { .. } | Expr::Source(_)) {
            reads_row = true;
        }
    });
    if reads_row {
        return Err(QuarryError::InvalidQuery(
            "argument must not depend on the current row".into(),
        ));
    }
    Ok(())
}

/// Row count for `LIMIT`/`OFFSET`: an integer constant or a named parameter.
fn row_count(ctx: &mut TranslationContext<'_>, expr: &Expr) -> Option<ExprId> {
    let slot = match expr {
        Expr::Constant(value) => ParamSlot::Constant(Value::Integer(value.as_i64()?.max(0))),
        Expr::Parameter(name) => ParamSlot::Named {
            name: name.clone(),
            clamp_non_negative: true,
        },
        _ => return None,
    };
    Some(ctx.arena.add(SqlExpr::Parameter(slot)))
}

/// `SELECT CASE WHEN [NOT] EXISTS (current) THEN 1 ELSE 0 END`.
fn wrap_exists(ctx: &mut TranslationContext<'_>, negate: bool) {
    let inner = ctx.current;
    let select = ctx.select_mut();
    select.projection.clear();
    select.is_distinct = false;
    if !select.has_limit_or_offset() {
        select.orderings.clear();
    }
    let exists = ctx.arena.add(SqlExpr::Exists(inner));
    let test = if negate {
        ctx.arena.add(SqlExpr::Not(exists))
    } else {
        exists
    };
    finish_case(ctx, test);
}

/// Makes `CASE WHEN test THEN 1 ELSE 0 END` the whole query.
fn finish_case(ctx: &mut TranslationContext<'_>, test: ExprId) {
    let one = ctx.arena.add(SqlExpr::Number(1));
    let zero = ctx.arena.add(SqlExpr::Number(0));
    let case = ctx.arena.add(SqlExpr::Case {
        whens: vec![(test, one)],
        otherwise: Some(zero),
    });
    ctx.current = ctx.arena.add_select(SelectExpression {
        projection: vec![ProjectionItem::new(case)],
        ..SelectExpression::default()
    });
    ctx.projection_final = true;
    ctx.shape = ResultShape::Scalar;
    ctx.terminal = Terminal::Scalar(NullAggregate::Keep);
}
