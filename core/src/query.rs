//! Compilation entry point and result sequences.
//!
//! [`compile`] turns a [`QueryModel`] into a [`CompiledQuery`]: one server
//! command, the client plan for whatever the server cannot run, and one
//! dependent command per include. Compiling is pure; nothing touches a store
//! until a result sequence is pulled.
//!
//! ```ignore
//! let compiled = compile(&model, &metadata, CompileOptions::default())?;
//! for customer in compiled.run(&store, &params, RowMaterializer::<(i64, String)>::new())? {
//!     let (id, name) = customer?;
//! }
//! ```

use std::collections::VecDeque;

use futures_util::Stream;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientPipeline, ClientPlan};
use crate::command::{Command, Parameters};
use crate::connection::{AsyncDataStore, DataStore};
use crate::cursor::{AsyncRowCursor, RowCursor};
use crate::dialect::Dialect;
use crate::error::{QuarryError, Result};
use crate::include::{
    IncludeBinding, IncludeLookup, IncludePlan, IncludeState, MergeStep, collect_children,
    merge_step,
};
use crate::metadata::MetadataLookup;
use crate::model::QueryModel;
use crate::row::{FromRow, FromValue, Materializer, RowMaterializer, ValueRow};
use crate::translate::QueryModelVisitor;
use crate::value::Value;

/// What a compiled query yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Zero or more rows.
    Sequence,
    /// At most one row (`first`, `single`, `last`).
    Element,
    /// Exactly one single-column row (aggregates, `any`, `all`, `contains`).
    Scalar,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub dialect: Dialect,
}

impl CompileOptions {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }
}

/// Compiles `model` against `metadata`.
///
/// Unmapped entity types or members fail here, before anything executes.
pub fn compile(
    model: &QueryModel,
    metadata: &dyn MetadataLookup,
    options: CompileOptions,
) -> Result<CompiledQuery> {
    crate::quarry_profile_function!();
    let translation = QueryModelVisitor::new(metadata, options.dialect).visit(model)?;
    Ok(CompiledQuery {
        command: translation.command,
        plan: translation.plan,
        shape: translation.shape,
        includes: translation.includes,
    })
}

/// Output of [`compile`]; immutable and reusable across executions.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    command: Command,
    plan: ClientPlan,
    shape: ResultShape,
    includes: Vec<IncludePlan>,
}

impl CompiledQuery {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn sql(&self) -> &str {
        self.command.sql()
    }

    pub fn plan(&self) -> &ClientPlan {
        &self.plan
    }

    pub fn shape(&self) -> ResultShape {
        self.shape
    }

    /// Whether part of the query runs on the client.
    pub fn requires_client_eval(&self) -> bool {
        !self.plan.preserves_server_order()
    }

    pub fn includes(&self) -> &[IncludePlan] {
        &self.includes
    }

    pub fn include_plan(&self, navigation: &str) -> Option<&IncludePlan> {
        self.includes.iter().find(|i| i.navigation == navigation)
    }

    fn require_include(&self, navigation: &str) -> Result<&IncludePlan> {
        self.include_plan(navigation).ok_or_else(|| {
            QuarryError::InvalidQuery(format!("query has no include `{navigation}`"))
        })
    }

    // ==================== sync ====================

    /// Lazy result sequence. Parameters are resolved now; the store is
    /// opened on the first pull.
    pub fn run<'q, S, M>(
        &'q self,
        store: &'q S,
        params: &'q Parameters,
        materializer: M,
    ) -> Result<QueryResults<'q, S, M>>
    where
        S: DataStore,
        M: Materializer,
    {
        let command = self.command.bind(params)?;
        Ok(QueryResults {
            query: self,
            store,
            params,
            cursor: RowCursor::new(store, command),
            pipeline: ClientPipeline::new(&self.plan, params)?,
            materializer,
            includes: Vec::new(),
            cancel: None,
            started: false,
            drained: false,
            failed: false,
        })
    }

    pub fn fetch_all<T: FromRow, S: DataStore>(
        &self,
        store: &S,
        params: &Parameters,
    ) -> Result<Vec<T>> {
        self.run(store, params, RowMaterializer::<T>::new())?.collect()
    }

    /// Single value of an aggregate-like query.
    pub fn fetch_scalar<T: FromValue, S: DataStore>(
        &self,
        store: &S,
        params: &Parameters,
    ) -> Result<T> {
        self.expect_shape(ResultShape::Scalar)?;
        let row = self
            .run(store, params, |row: ValueRow| -> Result<ValueRow> { Ok(row) })?
            .next();
        scalar_from(row)
    }

    /// Result of `first`, `single` or `last`; `None` for an empty or-default.
    pub fn fetch_element<T: FromRow, S: DataStore>(
        &self,
        store: &S,
        params: &Parameters,
    ) -> Result<Option<T>> {
        self.expect_shape(ResultShape::Element)?;
        self.run(store, params, RowMaterializer::<T>::new())?
            .next()
            .transpose()
    }

    // ==================== async ====================

    /// Async mirror of [`run`](Self::run).
    pub fn run_async<'q, S, M>(
        &'q self,
        store: &'q S,
        params: &'q Parameters,
        materializer: M,
    ) -> Result<AsyncQueryResults<'q, S, M>>
    where
        S: AsyncDataStore,
        M: Materializer,
    {
        let command = self.command.bind(params)?;
        Ok(AsyncQueryResults {
            query: self,
            store,
            params,
            cursor: AsyncRowCursor::new(store, command),
            pipeline: ClientPipeline::new(&self.plan, params)?,
            materializer,
            includes: Vec::new(),
            cancel: None,
            started: false,
            drained: false,
            failed: false,
        })
    }

    pub async fn fetch_all_async<T: FromRow, S: AsyncDataStore>(
        &self,
        store: &S,
        params: &Parameters,
    ) -> Result<Vec<T>> {
        let mut results = self.run_async(store, params, RowMaterializer::<T>::new())?;
        let mut out = Vec::new();
        while let Some(item) = results.next().await {
            out.push(item?);
        }
        Ok(out)
    }

    pub async fn fetch_scalar_async<T: FromValue, S: AsyncDataStore>(
        &self,
        store: &S,
        params: &Parameters,
    ) -> Result<T> {
        self.expect_shape(ResultShape::Scalar)?;
        let row = self
            .run_async(store, params, |row: ValueRow| -> Result<ValueRow> { Ok(row) })?
            .next()
            .await;
        scalar_from(row)
    }

    pub async fn fetch_element_async<T: FromRow, S: AsyncDataStore>(
        &self,
        store: &S,
        params: &Parameters,
    ) -> Result<Option<T>> {
        self.expect_shape(ResultShape::Element)?;
        self.run_async(store, params, RowMaterializer::<T>::new())?
            .next()
            .await
            .transpose()
    }

    fn expect_shape(&self, shape: ResultShape) -> Result<()> {
        if self.shape == shape {
            Ok(())
        } else {
            Err(QuarryError::InvalidQuery(format!(
                "query yields {:?}, not {shape:?}",
                self.shape
            )))
        }
    }
}

fn scalar_from<T: FromValue>(row: Option<Result<ValueRow>>) -> Result<T> {
    let row = row.ok_or(QuarryError::EmptySequence)??;
    T::from_value(row.into_iter().next().unwrap_or(Value::Null))
}

// =============================================================================
// Sync results
// =============================================================================

enum Dependents {
    Streaming(IncludeState),
    Buffered {
        rows: VecDeque<ValueRow>,
        state: IncludeState,
    },
    Lookup(IncludeLookup),
}

struct ActiveInclude<'q, C, P> {
    plan: &'q IncludePlan,
    binding: Box<dyn IncludeBinding<P> + Send + 'q>,
    cursor: C,
    dependents: Dependents,
}

/// How an include reads its dependents, decided once before the first parent.
///
/// Streaming holds one cursor per include next to the primary cursor.
fn include_mode(
    query: &CompiledQuery,
    cursor_limit: Option<usize>,
    includes: usize,
) -> (bool, bool) {
    let merge = query.plan.preserves_server_order();
    let fits = cursor_limit.is_none_or(|limit| limit > includes);
    (merge, merge && fits)
}

/// Lazy synchronous result sequence of a [`CompiledQuery`].
pub struct QueryResults<'q, S: DataStore, M: Materializer> {
    query: &'q CompiledQuery,
    store: &'q S,
    params: &'q Parameters,
    cursor: RowCursor<'q, S>,
    pipeline: ClientPipeline<'q>,
    materializer: M,
    includes: Vec<ActiveInclude<'q, RowCursor<'q, S>, M::Output>>,
    cancel: Option<CancellationToken>,
    started: bool,
    drained: bool,
    failed: bool,
}

impl<'q, S: DataStore, M: Materializer> QueryResults<'q, S, M> {
    /// Loads `navigation` alongside every result through `binding`.
    pub fn include(
        mut self,
        navigation: &str,
        binding: impl IncludeBinding<M::Output> + Send + 'q,
    ) -> Result<Self> {
        if self.started {
            return Err(QuarryError::InvalidQuery(
                "includes must be added before iteration".into(),
            ));
        }
        let plan = self.query.require_include(navigation)?;
        let mut cursor = RowCursor::new(self.store, plan.command.bind(self.params)?);
        if let Some(token) = &self.cancel {
            cursor = cursor.with_cancellation(token.clone());
        }
        self.includes.push(ActiveInclude {
            plan,
            binding: Box::new(binding),
            cursor,
            dependents: Dependents::Streaming(IncludeState::new()),
        });
        Ok(self)
    }

    /// Stops pulling rows once `token` fires. Rows already yielded stay valid.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cursor = self.cursor.with_cancellation(token.clone());
        self.includes = self
            .includes
            .into_iter()
            .map(|mut include| {
                include.cursor = include.cursor.with_cancellation(token.clone());
                include
            })
            .collect();
        self.cancel = Some(token);
        self
    }

    /// Releases every cursor without reading further.
    pub fn close(&mut self) {
        self.cursor.close();
        for include in &mut self.includes {
            include.cursor.close();
        }
    }

    fn start(&mut self) -> Result<()> {
        let (merge, streaming) = include_mode(
            self.query,
            self.store.max_active_cursors(),
            self.includes.len(),
        );
        for include in &mut self.includes {
            include.dependents = if streaming {
                Dependents::Streaming(IncludeState::new())
            } else if merge {
                let mut rows = VecDeque::new();
                while let Some(row) = include.cursor.next_row()? {
                    rows.push_back(row);
                }
                Dependents::Buffered {
                    rows,
                    state: IncludeState::new(),
                }
            } else {
                let mut lookup = IncludeLookup::new(include.plan.child_key.clone());
                while let Some(row) = include.cursor.next_row()? {
                    lookup.insert(row);
                }
                Dependents::Lookup(lookup)
            };
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<M::Output>> {
        if !self.started {
            self.started = true;
            self.start()?;
        }
        loop {
            if let Some(row) = self.pipeline.pop() {
                return self.shape(row).map(Some);
            }
            if self.drained {
                return Ok(None);
            }
            if self.pipeline.is_saturated() {
                self.cursor.close();
                self.drained = true;
                self.pipeline.finish()?;
                continue;
            }
            match self.cursor.next_row()? {
                Some(row) => self.pipeline.push(row)?,
                None => {
                    self.drained = true;
                    self.pipeline.finish()?;
                }
            }
        }
    }

    fn shape(&mut self, row: ValueRow) -> Result<M::Output> {
        let keys: Vec<Vec<Value>> = self
            .includes
            .iter()
            .map(|include| include.plan.parent_key_of(&row))
            .collect();
        let mut parent = self.materializer.shape_row(row)?;
        for (include, key) in self.includes.iter_mut().zip(keys) {
            let children = match &mut include.dependents {
                Dependents::Streaming(state) => {
                    let cursor = &mut include.cursor;
                    let (next, children) = collect_children(
                        std::mem::take(state),
                        &key,
                        &include.plan.child_key,
                        || cursor.next_row(),
                    )?;
                    *state = next;
                    children
                }
                Dependents::Buffered { rows, state } => {
                    let (next, children) = collect_children(
                        std::mem::take(state),
                        &key,
                        &include.plan.child_key,
                        || Ok(rows.pop_front()),
                    )?;
                    *state = next;
                    children
                }
                Dependents::Lookup(lookup) => lookup.children(&key),
            };
            include.binding.attach(&mut parent, children)?;
        }
        Ok(parent)
    }
}

impl<S: DataStore, M: Materializer> Iterator for QueryResults<'_, S, M> {
    type Item = Result<M::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.close();
                None
            }
            Err(e) => {
                self.failed = true;
                self.close();
                Some(Err(e))
            }
        }
    }
}

// =============================================================================
// Async results
// =============================================================================

/// Lazy asynchronous result sequence of a [`CompiledQuery`].
///
/// Yields exactly what [`QueryResults`] yields for the same query and data.
pub struct AsyncQueryResults<'q, S: AsyncDataStore, M: Materializer> {
    query: &'q CompiledQuery,
    store: &'q S,
    params: &'q Parameters,
    cursor: AsyncRowCursor<'q, S>,
    pipeline: ClientPipeline<'q>,
    materializer: M,
    includes: Vec<ActiveInclude<'q, AsyncRowCursor<'q, S>, M::Output>>,
    cancel: Option<CancellationToken>,
    started: bool,
    drained: bool,
    failed: bool,
}

impl<'q, S: AsyncDataStore, M: Materializer> AsyncQueryResults<'q, S, M> {
    pub fn include(
        mut self,
        navigation: &str,
        binding: impl IncludeBinding<M::Output> + Send + 'q,
    ) -> Result<Self> {
        if self.started {
            return Err(QuarryError::InvalidQuery(
                "includes must be added before iteration".into(),
            ));
        }
        let plan = self.query.require_include(navigation)?;
        let mut cursor = AsyncRowCursor::new(self.store, plan.command.bind(self.params)?);
        if let Some(token) = &self.cancel {
            cursor = cursor.with_cancellation(token.clone());
        }
        self.includes.push(ActiveInclude {
            plan,
            binding: Box::new(binding),
            cursor,
            dependents: Dependents::Streaming(IncludeState::new()),
        });
        Ok(self)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cursor = self.cursor.with_cancellation(token.clone());
        self.includes = self
            .includes
            .into_iter()
            .map(|mut include| {
                include.cursor = include.cursor.with_cancellation(token.clone());
                include
            })
            .collect();
        self.cancel = Some(token);
        self
    }

    pub fn close(&mut self) {
        self.cursor.close();
        for include in &mut self.includes {
            include.cursor.close();
        }
    }

    /// Next result, suspending only while a row is read.
    pub async fn next(&mut self) -> Option<Result<M::Output>> {
        if self.failed {
            return None;
        }
        match self.advance().await {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.close();
                None
            }
            Err(e) => {
                self.failed = true;
                self.close();
                Some(Err(e))
            }
        }
    }

    /// Adapts the sequence into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<M::Output>> + 'q
    where
        M: 'q,
    {
        futures_util::stream::unfold(self, |mut results| async move {
            let item = results.next().await?;
            Some((item, results))
        })
    }

    async fn start(&mut self) -> Result<()> {
        let (merge, streaming) = include_mode(
            self.query,
            self.store.max_active_cursors(),
            self.includes.len(),
        );
        for include in &mut self.includes {
            include.dependents = if streaming {
                Dependents::Streaming(IncludeState::new())
            } else if merge {
                let mut rows = VecDeque::new();
                while let Some(row) = include.cursor.next_row().await? {
                    rows.push_back(row);
                }
                Dependents::Buffered {
                    rows,
                    state: IncludeState::new(),
                }
            } else {
                let mut lookup = IncludeLookup::new(include.plan.child_key.clone());
                while let Some(row) = include.cursor.next_row().await? {
                    lookup.insert(row);
                }
                Dependents::Lookup(lookup)
            };
        }
        Ok(())
    }

    async fn advance(&mut self) -> Result<Option<M::Output>> {
        if !self.started {
            self.started = true;
            self.start().await?;
        }
        loop {
            if let Some(row) = self.pipeline.pop() {
                return self.shape(row).await.map(Some);
            }
            if self.drained {
                return Ok(None);
            }
            if self.pipeline.is_saturated() {
                self.cursor.close();
                self.drained = true;
                self.pipeline.finish()?;
                continue;
            }
            match self.cursor.next_row().await? {
                Some(row) => self.pipeline.push(row)?,
                None => {
                    self.drained = true;
                    self.pipeline.finish()?;
                }
            }
        }
    }

    async fn shape(&mut self, row: ValueRow) -> Result<M::Output> {
        let keys: Vec<Vec<Value>> = self
            .includes
            .iter()
            .map(|include| include.plan.parent_key_of(&row))
            .collect();
        let mut parent = self.materializer.shape_row(row)?;
        for (include, key) in self.includes.iter_mut().zip(keys) {
            let children = match &mut include.dependents {
                Dependents::Streaming(state) => {
                    let mut current = std::mem::take(state);
                    let mut children = Vec::new();
                    loop {
                        let (next, step) = merge_step(current, &key, &include.plan.child_key);
                        current = match step {
                            MergeStep::Attach(row) => {
                                children.push(row);
                                next
                            }
                            MergeStep::NeedRow => next.fed(include.cursor.next_row().await?),
                            MergeStep::Done => {
                                *state = next;
                                break;
                            }
                        };
                    }
                    children
                }
                Dependents::Buffered { rows, state } => {
                    let (next, children) = collect_children(
                        std::mem::take(state),
                        &key,
                        &include.plan.child_key,
                        || Ok(rows.pop_front()),
                    )?;
                    *state = next;
                    children
                }
                Dependents::Lookup(lookup) => lookup.children(&key),
            };
            include.binding.attach(&mut parent, children)?;
        }
        Ok(parent)
    }
}
