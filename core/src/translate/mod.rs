//! Query model translation.
//!
//! [`QueryModelVisitor`] walks a [`QueryModel`](crate::model::QueryModel) and
//! builds one select tree in a [`QueryArena`]. Anything the server cannot
//! evaluate is handed to the client plan instead; once that happens every
//! later clause runs on the client as well.

mod binding;
mod optimizer;
mod result_ops;
mod sql_translator;
mod visitor;

pub use binding::{BindingMap, DerivedColumn, SourceBinding};
pub use optimizer::optimize_equality;
pub use result_ops::{HandlerState, ResultOperatorHandler};
pub use visitor::{QueryModelVisitor, Translation};

use compact_str::CompactString;
use hashbrown::HashSet;

use crate::client::{BodyStage, ResultStage, RowLayout, Terminal};
use crate::command::ParamSlot;
use crate::error::{QuarryError, Result};
use crate::metadata::MetadataLookup;
use crate::model::{Expr, FromClause, SourceHandle};
use crate::query::ResultShape;
use crate::select::{
    ExprId, JoinKind, ProjectionItem, QueryArena, SelectExpression, SelectId, SqlExpr, TableKind,
    TableSource, unique_name,
};
use crate::value::Value;

/// Hands out table aliases that are unique within one compilation.
#[derive(Debug, Clone, Default)]
pub(crate) struct AliasGenerator {
    used: HashSet<CompactString>,
}

impl AliasGenerator {
    pub(crate) fn next(&mut self, hint: &str) -> CompactString {
        unique_name(&mut self.used, hint.into())
    }

    /// `Customer` becomes `c`, then `c0`, `c1`, ...
    pub(crate) fn for_entity(&mut self, entity: &str) -> CompactString {
        let hint: CompactString = entity
            .chars()
            .next()
            .filter(char::is_ascii_alphabetic)
            .map(|c| c.to_ascii_lowercase().to_string().into())
            .unwrap_or_else(|| "t".into());
        self.next(&hint)
    }
}

/// Mutable state shared by the visitor, the expression translator and the
/// result operator handler.
pub(crate) struct TranslationContext<'m> {
    pub(crate) metadata: &'m dyn MetadataLookup,
    pub(crate) arena: QueryArena,
    pub(crate) aliases: AliasGenerator,
    pub(crate) bindings: BindingMap,
    pub(crate) current: SelectId,
    pub(crate) selector: Expr,
    pub(crate) body: Vec<BodyStage>,
    pub(crate) results: Vec<ResultStage>,
    pub(crate) terminal: Terminal,
    pub(crate) shape: ResultShape,
    /// Sticky: set once any clause falls back to the client.
    pub(crate) requires_client_eval: bool,
    /// The selector itself cannot be rendered as SQL.
    pub(crate) client_projection: bool,
    /// A result operator replaced the projection with a single value.
    pub(crate) projection_final: bool,
}

impl<'m> TranslationContext<'m> {
    pub(crate) fn new(metadata: &'m dyn MetadataLookup, selector: Expr) -> Self {
        let mut arena = QueryArena::new();
        let current = arena.add_select(SelectExpression::default());
        Self {
            metadata,
            arena,
            aliases: AliasGenerator::default(),
            bindings: BindingMap::new(),
            current,
            selector,
            body: Vec::new(),
            results: Vec::new(),
            terminal: Terminal::Sequence,
            shape: ResultShape::Sequence,
            requires_client_eval: false,
            client_projection: false,
            projection_final: false,
        }
    }

    /// Server rows are full source rows for the client to evaluate.
    pub(crate) fn env_mode(&self) -> bool {
        (self.requires_client_eval || self.client_projection) && !self.projection_final
    }

    pub(crate) fn select(&self) -> &SelectExpression {
        self.arena.select(self.current)
    }

    pub(crate) fn select_mut(&mut self) -> &mut SelectExpression {
        self.arena.select_mut(self.current)
    }

    // ==================== sources ====================

    /// Adds a table source for `from` to the current select and binds it.
    pub(crate) fn add_source(&mut self, from: &FromClause, join: JoinKind) -> Result<()> {
        let table = self.metadata.resolve_table(&from.entity)?;
        let alias = self.aliases.for_entity(&from.entity);
        self.select_mut().tables.push(TableSource {
            alias: alias.clone(),
            kind: TableKind::Table(table),
            join,
        });
        self.bindings.bind(
            from.source,
            SourceBinding::Table {
                entity: from.entity.clone(),
                alias,
            },
        );

        // rows of a derived type share the root's table
        let root = self.metadata.root_type(&from.entity)?;
        if root.name != from.entity
            && let Some((member, values)) = self.type_filter(&from.entity)?
        {
            let column = self
                .bindings
                .column(self.metadata, &mut self.arena, from.source, &member)?
                .ok_or_else(|| QuarryError::unmapped_member(&from.entity, &member))?;
            let predicate = self.in_values(column, &values);
            self.arena.and_where(self.current, predicate);
        }
        Ok(())
    }

    /// Discriminator member and values selecting `entity` and its concrete
    /// descendants. `None` when the hierarchy has a single concrete type.
    pub(crate) fn type_filter(&self, entity: &str) -> Result<Option<(CompactString, Vec<Value>)>> {
        let root = self.metadata.root_type(entity)?;
        let concrete = self.metadata.concrete_types(entity)?;
        if concrete.len() == 1 && concrete[0].name == root.name {
            return Ok(None);
        }
        let member = root.discriminator.clone().ok_or_else(|| {
            QuarryError::InvalidQuery(format!("hierarchy of `{entity}` has no discriminator"))
        })?;
        let values = concrete
            .iter()
            .map(|t| {
                t.discriminator_value.clone().ok_or_else(|| {
                    QuarryError::InvalidQuery(format!(
                        "`{}` has no discriminator value",
                        t.name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some((member, values)))
    }

    pub(crate) fn in_values(&mut self, operand: ExprId, values: &[Value]) -> ExprId {
        let values = values
            .iter()
            .map(|v| self.constant(v.clone()))
            .collect();
        self.arena.add(SqlExpr::In {
            operand,
            values,
            negated: false,
        })
    }

    pub(crate) fn constant(&mut self, value: Value) -> ExprId {
        self.arena.add(SqlExpr::Parameter(ParamSlot::Constant(value)))
    }

    pub(crate) fn entity_of(&self, source: SourceHandle) -> Result<CompactString> {
        self.bindings
            .get(source)
            .map(|b| CompactString::from(b.entity()))
            .ok_or_else(|| QuarryError::InvalidQuery("unknown query source".into()))
    }

    // ==================== projection ====================

    /// Recomputes the projection for the current mode.
    ///
    /// Client-evaluated queries project every column of every source; otherwise
    /// the selector is rendered, falling back to the client when it cannot be.
    pub(crate) fn refresh_projection(&mut self) -> Result<()> {
        if self.projection_final {
            return Ok(());
        }
        if !self.env_mode() {
            let mut items = Vec::new();
            let selector = self.selector.clone();
            if self.project_selector(&selector, &mut items)? {
                self.select_mut().projection = items;
                return Ok(());
            }
            crate::quarry_trace_fallback!("selector", "untranslatable projection");
            self.client_projection = true;
        }
        let items = self.env_projection()?;
        self.select_mut().projection = items;
        Ok(())
    }

    fn env_projection(&mut self) -> Result<Vec<ProjectionItem>> {
        let handles: Vec<_> = self.bindings.handles().collect();
        let mut items = Vec::new();
        for handle in handles {
            for member in self.bindings.entity_members(self.metadata, handle)? {
                let Some(column) =
                    self.bindings
                        .column(self.metadata, &mut self.arena, handle, &member)?
                else {
                    continue;
                };
                items.push(ProjectionItem::member(column, handle, member));
            }
        }
        Ok(items)
    }

    fn project_selector(&mut self, expr: &Expr, out: &mut Vec<ProjectionItem>) -> Result<bool> {
        match expr {
            Expr::Source(handle) => {
                for member in self.bindings.entity_members(self.metadata, *handle)? {
                    let Some(column) =
                        self.bindings
                            .column(self.metadata, &mut self.arena, *handle, &member)?
                    else {
                        return Ok(false);
                    };
                    out.push(ProjectionItem::member(column, *handle, member));
                }
                Ok(true)
            }
            Expr::Tuple(items) => {
                for item in items {
                    if !self.project_selector(item, out)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Expr::Member { source, name } => match self.translate(expr)? {
                Some(column) => {
                    out.push(ProjectionItem::member(column, *source, name.clone()));
                    Ok(true)
                }
                None => Ok(false),
            },
            other => match self.translate(other)? {
                Some(id) => {
                    out.push(ProjectionItem::new(id));
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }

    /// Layout of env rows, from the projection origins.
    pub(crate) fn row_layout(&self) -> RowLayout {
        RowLayout::new(
            self.select()
                .projection
                .iter()
                .filter_map(|item| item.origin.clone())
                .collect(),
        )
    }

    /// Replaces the projection with a single value and drops the ordering.
    pub(crate) fn set_scalar_projection(&mut self, expr: ExprId) {
        let select = self.select_mut();
        select.projection = vec![ProjectionItem::new(expr)];
        select.orderings.clear();
        self.projection_final = true;
        self.shape = ResultShape::Scalar;
    }

    /// Turns the current select into a derived table and rebinds every
    /// source to its output columns.
    pub(crate) fn push_down(&mut self) {
        crate::quarry_profile_scope!("translate", "push_down");
        let alias = self.aliases.next("t");
        let outer = self.arena.push_down(self.current, alias.clone());
        self.bindings
            .rebind_derived(&self.arena, self.arena.select(outer), &alias);
        self.current = outer;
    }

    /// Whether the selector yields exactly one scalar per row.
    pub(crate) fn selector_is_scalar(&self) -> bool {
        !matches!(self.selector, Expr::Source(_) | Expr::Tuple(_))
    }

    /// Nullability of a scalar selector, judged from metadata.
    pub(crate) fn selector_nullable(&self) -> Result<bool> {
        Ok(match &self.selector {
            Expr::Member { source, name } => {
                let entity = self.entity_of(*source)?;
                binding::member_property(self.metadata, &entity, name)?
                    .column
                    .nullable
            }
            Expr::Constant(v) => v.is_null(),
            _ => true,
        })
    }
}
