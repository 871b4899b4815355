//! Client-side evaluation of everything the server could not run.
//!
//! The compiler emits a [`ClientPlan`]: body stages over full source rows
//! ("environment" rows laid out by a [`RowLayout`]), an optional projector,
//! sequence stages over projected rows and one terminal [`Terminal`].
//! [`ClientPipeline`] runs a plan push-style, so the same code serves the
//! synchronous and asynchronous executors.

mod aggregate;
mod eval;
mod pipeline;

pub use aggregate::Aggregator;
pub use eval::Evaluator;
pub use pipeline::ClientPipeline;

use compact_str::CompactString;
use hashbrown::HashMap;

use crate::model::{Expr, Ordering, SourceHandle};
use crate::value::Value;

/// Positions of source members within a server row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowLayout {
    columns: Vec<(SourceHandle, CompactString)>,
    index: HashMap<(SourceHandle, CompactString), usize>,
}

impl RowLayout {
    pub fn new(columns: Vec<(SourceHandle, CompactString)>) -> Self {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            index.entry(column.clone()).or_insert(i);
        }
        Self { columns, index }
    }

    pub fn position(&self, source: SourceHandle, member: &str) -> Option<usize> {
        self.index.get(&(source, CompactString::from(member))).copied()
    }

    /// Every column of `source`, in row order.
    pub fn source_positions(&self, source: SourceHandle) -> impl Iterator<Item = usize> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter(move |(_, (h, _))| *h == source)
            .map(|(i, _)| i)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Client stage over environment rows, before projection.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyStage {
    Filter(Expr),
    /// Join condition evaluated on the client; NULL keys never match.
    JoinFilter { outer: Expr, inner: Expr },
    /// Stable sort of everything seen so far.
    OrderBy(Vec<Ordering>),
}

/// Client stage over projected rows.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultStage {
    Skip(Expr),
    Take(Expr),
    Distinct,
    OfType {
        source: SourceHandle,
        /// Discriminator member; `None` keeps every row.
        discriminator: Option<CompactString>,
        values: Vec<Value>,
    },
}

/// What a NULL produced by a server aggregate means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullAggregate {
    /// Pass NULL through (nullable element type).
    Keep,
    /// `SUM` over nothing is zero.
    Zero,
    /// Empty input for a non-nullable element type.
    Empty,
}

/// How the pipeline ends.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminal {
    /// Every row is a result.
    Sequence,
    /// The server computed a single value.
    Scalar(NullAggregate),
    Count,
    Any(Option<Expr>),
    All(Expr),
    Min { nullable: bool },
    Max { nullable: bool },
    Sum,
    Average { nullable: bool },
    First { or_default: bool },
    Single { or_default: bool },
    Last { or_default: bool },
    Contains(Expr),
}

/// Everything left for the client after translation.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientPlan {
    /// Set when server rows are environment rows rather than results.
    pub layout: Option<RowLayout>,
    pub body: Vec<BodyStage>,
    pub projector: Option<Expr>,
    pub results: Vec<ResultStage>,
    pub terminal: Terminal,
}

impl ClientPlan {
    /// Plan for a query the server answers completely.
    pub fn server(terminal: Terminal) -> Self {
        Self {
            layout: None,
            body: Vec::new(),
            projector: None,
            results: Vec::new(),
            terminal,
        }
    }

    /// Whether rows come out in server order, one result per kept row.
    pub fn preserves_server_order(&self) -> bool {
        self.layout.is_none() && self.body.is_empty() && self.results.is_empty()
    }
}
