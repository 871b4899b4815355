//! Source bindings: which table alias and column a member access resolves to.

use compact_str::CompactString;

use crate::error::{QuarryError, Result};
use crate::metadata::{MetadataLookup, Property};
use crate::model::SourceHandle;
use crate::select::{QueryArena, SelectExpression, SqlExpr};

/// Output column of a derived table that carries a source member.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedColumn {
    pub member: CompactString,
    pub output: CompactString,
    pub nullable: bool,
}

/// Where one query source's members live in the current select.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceBinding {
    /// Mapped table (or hierarchy table) under `alias`.
    Table {
        entity: CompactString,
        alias: CompactString,
    },
    /// Projection of a derived table; members not listed are out of reach.
    Derived {
        entity: CompactString,
        alias: CompactString,
        columns: Vec<DerivedColumn>,
    },
}

impl SourceBinding {
    pub fn entity(&self) -> &str {
        match self {
            SourceBinding::Table { entity, .. } | SourceBinding::Derived { entity, .. } => entity,
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            SourceBinding::Table { alias, .. } | SourceBinding::Derived { alias, .. } => alias,
        }
    }
}

/// Per-compilation map from source handle to binding, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingMap {
    sources: Vec<(SourceHandle, SourceBinding)>,
}

impl BindingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, source: SourceHandle, binding: SourceBinding) {
        match self.sources.iter_mut().find(|(h, _)| *h == source) {
            Some((_, existing)) => *existing = binding,
            None => self.sources.push((source, binding)),
        }
    }

    pub fn get(&self, source: SourceHandle) -> Option<&SourceBinding> {
        self.sources
            .iter()
            .find(|(h, _)| *h == source)
            .map(|(_, b)| b)
    }

    fn require(&self, source: SourceHandle) -> Result<&SourceBinding> {
        self.get(source).ok_or_else(|| {
            QuarryError::InvalidQuery(format!("source {} is not part of the query", source.0))
        })
    }

    pub fn handles(&self) -> impl Iterator<Item = SourceHandle> + '_ {
        self.sources.iter().map(|(h, _)| *h)
    }

    /// Column expression for `source.member`.
    ///
    /// `Ok(None)` means the member exists but is not reachable from the
    /// current select (it was not carried through a derived table).
    pub fn column(
        &self,
        metadata: &dyn MetadataLookup,
        arena: &mut QueryArena,
        source: SourceHandle,
        member: &str,
    ) -> Result<Option<crate::select::ExprId>> {
        match self.require(source)? {
            SourceBinding::Table { entity, alias } => {
                let property = member_property(metadata, entity, member)?;
                let column = &property.column;
                Ok(Some(arena.column(
                    alias.clone(),
                    column.name.clone(),
                    column.nullable,
                )))
            }
            SourceBinding::Derived {
                alias, columns, ..
            } => Ok(columns
                .iter()
                .find(|c| c.member == member)
                .map(|c| arena.column(alias.clone(), c.output.clone(), c.nullable))),
        }
    }

    /// Members a full row of `source` carries, in projection order.
    pub fn entity_members(
        &self,
        metadata: &dyn MetadataLookup,
        source: SourceHandle,
    ) -> Result<Vec<CompactString>> {
        match self.require(source)? {
            SourceBinding::Table { entity, .. } => Ok(metadata
                .hierarchy_properties(entity)?
                .into_iter()
                .map(|p| p.name.clone())
                .collect()),
            SourceBinding::Derived { columns, .. } => {
                Ok(columns.iter().map(|c| c.member.clone()).collect())
            }
        }
    }

    /// Rebinds every source to the output columns of a pushed-down select.
    pub fn rebind_derived(
        &mut self,
        arena: &QueryArena,
        outer: &SelectExpression,
        alias: &CompactString,
    ) {
        for (handle, binding) in &mut self.sources {
            let handle = *handle;
            let columns = outer
                .projection
                .iter()
                .filter_map(|item| {
                    let (origin, member) = item.origin.as_ref()?;
                    if *origin != handle {
                        return None;
                    }
                    match arena.expr(item.expr) {
                        SqlExpr::Column { name, nullable, .. } => Some(DerivedColumn {
                            member: member.clone(),
                            output: name.clone(),
                            nullable: *nullable,
                        }),
                        _ => None,
                    }
                })
                .collect();
            *binding = SourceBinding::Derived {
                entity: binding.entity().into(),
                alias: alias.clone(),
                columns,
            };
        }
    }
}

/// Resolves a member anywhere in the entity's hierarchy, so members of
/// derived types are reachable after `of_type`.
pub(crate) fn member_property<'m>(
    metadata: &'m dyn MetadataLookup,
    entity: &str,
    member: &str,
) -> Result<&'m Property> {
    metadata
        .hierarchy_properties(entity)?
        .into_iter()
        .find(|p| p.name == member)
        .ok_or_else(|| QuarryError::unmapped_member(entity, member))
}
