//! Composable query model.
//!
//! A [`QueryModel`] is an ordered pipeline: a main source, body clauses
//! (filters, orderings, joins, additional sources), a selector and terminal
//! result operators. It is assembled with [`QueryBuilder`] and immutable
//! afterwards.
//!
//! ```ignore
//! let mut query = QueryBuilder::from("Customer");
//! let c = query.root();
//! query
//!     .filter(c.member("age").gt(30))
//!     .order_by([Ordering::asc(c.member("name"))])
//!     .take(10);
//! let model = query.build()?;
//! ```

mod expr;

pub use expr::*;

use compact_str::CompactString;

use crate::error::{QuarryError, Result};

/// A logical query source over an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct FromClause {
    pub source: SourceHandle,
    pub entity: CompactString,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyClause {
    Where(Expr),
    /// Replaces any previous ordering; later keys break ties of earlier ones.
    OrderBy(Vec<Ordering>),
    /// Inner join on `outer_key == inner_key`.
    Join {
        from: FromClause,
        outer_key: Expr,
        inner_key: Expr,
    },
    /// Cross join.
    AdditionalFrom(FromClause),
}

/// Terminal and sequence operators applied after the selector.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultOperator {
    Count,
    LongCount,
    Any(Option<Expr>),
    All(Expr),
    Distinct,
    Min,
    Max,
    Sum,
    Average,
    Skip(Expr),
    Take(Expr),
    First { or_default: bool },
    Single { or_default: bool },
    Last { or_default: bool },
    OfType(CompactString),
    Contains(Expr),
}

impl ResultOperator {
    /// Operators that end the pipeline with a single value or element.
    pub const fn is_terminal(&self) -> bool {
        !matches!(
            self,
            ResultOperator::Distinct
                | ResultOperator::Skip(_)
                | ResultOperator::Take(_)
                | ResultOperator::OfType(_)
        )
    }

    pub(crate) const fn name(&self) -> &'static str {
        match self {
            ResultOperator::Count => "count",
            ResultOperator::LongCount => "long_count",
            ResultOperator::Any(_) => "any",
            ResultOperator::All(_) => "all",
            ResultOperator::Distinct => "distinct",
            ResultOperator::Min => "min",
            ResultOperator::Max => "max",
            ResultOperator::Sum => "sum",
            ResultOperator::Average => "average",
            ResultOperator::Skip(_) => "skip",
            ResultOperator::Take(_) => "take",
            ResultOperator::First { .. } => "first",
            ResultOperator::Single { .. } => "single",
            ResultOperator::Last { .. } => "last",
            ResultOperator::OfType(_) => "of_type",
            ResultOperator::Contains(_) => "contains",
        }
    }
}

/// Collection navigation of the main source to load alongside each result.
#[derive(Debug, Clone, PartialEq)]
pub struct Include {
    pub navigation: CompactString,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryModel {
    pub main: FromClause,
    pub body: Vec<BodyClause>,
    pub selector: Expr,
    pub result_operators: Vec<ResultOperator>,
    pub includes: Vec<Include>,
}

impl QueryModel {
    /// Every source declared by the model, main source first.
    pub fn sources(&self) -> impl Iterator<Item = &FromClause> {
        core::iter::once(&self.main).chain(self.body.iter().filter_map(|c| match c {
            BodyClause::Join { from, .. } | BodyClause::AdditionalFrom(from) => Some(from),
            BodyClause::Where(_) | BodyClause::OrderBy(_) => None,
        }))
    }

    /// Every expression of the model, in pipeline order.
    pub fn expressions(&self) -> impl Iterator<Item = &Expr> {
        let body = self.body.iter().flat_map(|c| -> Vec<&Expr> {
            match c {
                BodyClause::Where(e) => vec![e],
                BodyClause::OrderBy(ords) => ords.iter().map(|o| &o.expr).collect(),
                BodyClause::Join {
                    outer_key,
                    inner_key,
                    ..
                } => vec![outer_key, inner_key],
                BodyClause::AdditionalFrom(_) => Vec::new(),
            }
        });
        let ops = self.result_operators.iter().filter_map(|op| match op {
            ResultOperator::Any(Some(e))
            | ResultOperator::All(e)
            | ResultOperator::Skip(e)
            | ResultOperator::Take(e)
            | ResultOperator::Contains(e) => Some(e),
            _ => None,
        });
        body.chain(core::iter::once(&self.selector)).chain(ops)
    }
}

// =============================================================================
// QueryBuilder
// =============================================================================

/// Builder for [`QueryModel`].
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    main: FromClause,
    body: Vec<BodyClause>,
    selector: Option<Expr>,
    result_operators: Vec<ResultOperator>,
    includes: Vec<Include>,
    next_source: u32,
}

impl QueryBuilder {
    /// Starts a query over `entity`.
    pub fn from(entity: impl Into<CompactString>) -> Self {
        Self {
            main: FromClause {
                source: SourceHandle(0),
                entity: entity.into(),
            },
            body: Vec::new(),
            selector: None,
            result_operators: Vec::new(),
            includes: Vec::new(),
            next_source: 1,
        }
    }

    /// Handle of the main source.
    pub fn root(&self) -> SourceHandle {
        self.main.source
    }

    fn next_handle(&mut self) -> SourceHandle {
        let handle = SourceHandle(self.next_source);
        self.next_source += 1;
        handle
    }

    pub fn filter(&mut self, predicate: Expr) -> &mut Self {
        self.body.push(BodyClause::Where(predicate));
        self
    }

    pub fn order_by(&mut self, orderings: impl IntoIterator<Item = Ordering>) -> &mut Self {
        self.body
            .push(BodyClause::OrderBy(orderings.into_iter().collect()));
        self
    }

    /// Inner join against `entity`. `inner_key` receives the new source's handle.
    pub fn join(
        &mut self,
        entity: impl Into<CompactString>,
        outer_key: Expr,
        inner_key: impl FnOnce(SourceHandle) -> Expr,
    ) -> SourceHandle {
        let source = self.next_handle();
        self.body.push(BodyClause::Join {
            from: FromClause {
                source,
                entity: entity.into(),
            },
            outer_key,
            inner_key: inner_key(source),
        });
        source
    }

    /// Additional source, cross joined with everything before it.
    pub fn add_from(&mut self, entity: impl Into<CompactString>) -> SourceHandle {
        let source = self.next_handle();
        self.body.push(BodyClause::AdditionalFrom(FromClause {
            source,
            entity: entity.into(),
        }));
        source
    }

    /// Sets the selector. Defaults to the main source's entity.
    pub fn select(&mut self, selector: Expr) -> &mut Self {
        self.selector = Some(selector);
        self
    }

    pub fn include(&mut self, navigation: impl Into<CompactString>) -> &mut Self {
        self.includes.push(Include {
            navigation: navigation.into(),
        });
        self
    }

    pub fn result(&mut self, op: ResultOperator) -> &mut Self {
        self.result_operators.push(op);
        self
    }

    pub fn count(&mut self) -> &mut Self {
        self.result(ResultOperator::Count)
    }

    pub fn long_count(&mut self) -> &mut Self {
        self.result(ResultOperator::LongCount)
    }

    pub fn any(&mut self, predicate: Option<Expr>) -> &mut Self {
        self.result(ResultOperator::Any(predicate))
    }

    pub fn all(&mut self, predicate: Expr) -> &mut Self {
        self.result(ResultOperator::All(predicate))
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.result(ResultOperator::Distinct)
    }

    pub fn min(&mut self) -> &mut Self {
        self.result(ResultOperator::Min)
    }

    pub fn max(&mut self) -> &mut Self {
        self.result(ResultOperator::Max)
    }

    pub fn sum(&mut self) -> &mut Self {
        self.result(ResultOperator::Sum)
    }

    pub fn average(&mut self) -> &mut Self {
        self.result(ResultOperator::Average)
    }

    pub fn skip(&mut self, count: impl Into<Expr>) -> &mut Self {
        self.result(ResultOperator::Skip(count.into()))
    }

    pub fn take(&mut self, count: impl Into<Expr>) -> &mut Self {
        self.result(ResultOperator::Take(count.into()))
    }

    pub fn first(&mut self) -> &mut Self {
        self.result(ResultOperator::First { or_default: false })
    }

    pub fn first_or_default(&mut self) -> &mut Self {
        self.result(ResultOperator::First { or_default: true })
    }

    pub fn single(&mut self) -> &mut Self {
        self.result(ResultOperator::Single { or_default: false })
    }

    pub fn single_or_default(&mut self) -> &mut Self {
        self.result(ResultOperator::Single { or_default: true })
    }

    pub fn last(&mut self) -> &mut Self {
        self.result(ResultOperator::Last { or_default: false })
    }

    pub fn last_or_default(&mut self) -> &mut Self {
        self.result(ResultOperator::Last { or_default: true })
    }

    pub fn of_type(&mut self, entity: impl Into<CompactString>) -> &mut Self {
        self.result(ResultOperator::OfType(entity.into()))
    }

    pub fn contains(&mut self, value: impl Into<Expr>) -> &mut Self {
        self.result(ResultOperator::Contains(value.into()))
    }

    /// Finishes the model. Fails if an operator follows a terminal operator.
    pub fn build(&self) -> Result<QueryModel> {
        if let Some((i, op)) = self
            .result_operators
            .iter()
            .enumerate()
            .find(|(i, op)| op.is_terminal() && i + 1 < self.result_operators.len())
        {
            return Err(QuarryError::InvalidQuery(format!(
                "`{}` at position {} must be the last result operator",
                op.name(),
                i
            )));
        }
        Ok(QueryModel {
            main: self.main.clone(),
            body: self.body.clone(),
            selector: self
                .selector
                .clone()
                .unwrap_or(Expr::Source(self.main.source)),
            result_operators: self.result_operators.clone(),
            includes: self.includes.clone(),
        })
    }
}
