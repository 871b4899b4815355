//! Object-relational metadata consumed by the compiler.
//!
//! The compiler only talks to [`MetadataLookup`]. [`Model`] is an in-memory
//! implementation assembled with [`EntityBuilder`]s; hosts with their own
//! metadata store implement the two required methods and inherit the rest.

use compact_str::CompactString;
use hashbrown::HashMap;

use crate::error::{QuarryError, Result};
use crate::value::Value;

// =============================================================================
// Descriptors
// =============================================================================

/// Declared storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
}

/// Table name with optional schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub name: CompactString,
    pub schema: Option<CompactString>,
}

impl TableName {
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            schema: None,
        }
    }
}

/// Column a property maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDescriptor {
    pub name: CompactString,
    pub ty: ColumnType,
    pub nullable: bool,
}

/// A mapped scalar property.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: CompactString,
    pub column: ColumnDescriptor,
}

/// A collection navigation from a principal entity to its dependents.
#[derive(Debug, Clone)]
pub struct Navigation {
    pub name: CompactString,
    /// Dependent entity type.
    pub target: CompactString,
    /// Foreign key properties on the dependent.
    pub foreign_key: Vec<CompactString>,
    /// Principal key properties on the declaring entity (its key when empty).
    pub principal_key: Vec<CompactString>,
}

/// A mapped entity type.
#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: CompactString,
    /// Table for root types. Derived types share their root's table.
    pub table: Option<TableName>,
    pub base: Option<CompactString>,
    pub is_abstract: bool,
    /// Properties declared on this type, in declaration order.
    pub properties: Vec<Property>,
    pub key: Vec<CompactString>,
    /// Discriminator property, declared on the root of a hierarchy.
    pub discriminator: Option<CompactString>,
    pub discriminator_value: Option<Value>,
    pub navigations: Vec<Navigation>,
}

impl EntityType {
    fn declared_property(&self, member: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == member)
    }
}

// =============================================================================
// MetadataLookup
// =============================================================================

/// Narrow metadata interface consumed by the compiler.
pub trait MetadataLookup {
    /// Entity type by name.
    fn entity_type(&self, name: &str) -> Option<&EntityType>;

    /// Types whose `base` is `name`, in registration order.
    fn derived_types(&self, name: &str) -> Vec<&EntityType>;

    fn require_entity(&self, name: &str) -> Result<&EntityType> {
        self.entity_type(name)
            .ok_or_else(|| QuarryError::UnmappedEntity(name.into()))
    }

    /// Base chain from `name` up to the hierarchy root, starting with `name`.
    fn base_chain(&self, name: &str) -> Result<Vec<&EntityType>> {
        let mut chain = vec![self.require_entity(name)?];
        while let Some(base) = chain.last().and_then(|e| e.base.as_deref()) {
            if chain.iter().any(|e| e.name == base) {
                return Err(QuarryError::InvalidQuery(format!(
                    "inheritance cycle through `{base}`"
                )));
            }
            chain.push(self.require_entity(base)?);
        }
        Ok(chain)
    }

    fn root_type(&self, name: &str) -> Result<&EntityType> {
        let chain = self.base_chain(name)?;
        chain
            .last()
            .copied()
            .ok_or_else(|| QuarryError::UnmappedEntity(name.into()))
    }

    fn resolve_table(&self, entity: &str) -> Result<TableName> {
        self.base_chain(entity)?
            .iter()
            .find_map(|e| e.table.clone())
            .ok_or_else(|| QuarryError::UnmappedEntity(entity.into()))
    }

    fn resolve_property(&self, entity: &str, member: &str) -> Result<&Property> {
        self.base_chain(entity)?
            .into_iter()
            .find_map(|e| e.declared_property(member))
            .ok_or_else(|| QuarryError::unmapped_member(entity, member))
    }

    fn resolve_column(&self, entity: &str, member: &str) -> Result<ColumnDescriptor> {
        Ok(self.resolve_property(entity, member)?.column.clone())
    }

    fn discriminator_property(&self, entity: &str) -> Result<Option<&Property>> {
        let root = self.root_type(entity)?;
        match &root.discriminator {
            Some(member) => self.resolve_property(&root.name, member).map(Some),
            None => Ok(None),
        }
    }

    fn discriminator_column(&self, entity: &str) -> Result<Option<ColumnDescriptor>> {
        Ok(self.discriminator_property(entity)?.map(|p| p.column.clone()))
    }

    /// Every property a row of `entity` carries: the base chain root-first,
    /// then the properties declared by derived types, depth-first.
    fn hierarchy_properties(&self, entity: &str) -> Result<Vec<&Property>> {
        let mut out: Vec<&Property> = Vec::new();
        for e in self.base_chain(entity)?.into_iter().rev() {
            out.extend(e.properties.iter());
        }
        let mut pending = self.derived_types(entity);
        pending.reverse();
        while let Some(derived) = pending.pop() {
            out.extend(derived.properties.iter());
            let mut children = self.derived_types(&derived.name);
            children.reverse();
            pending.extend(children);
        }
        Ok(out)
    }

    /// `entity` and its descendants that can be instantiated.
    fn concrete_types(&self, entity: &str) -> Result<Vec<&EntityType>> {
        let mut out = Vec::new();
        let mut pending = vec![self.require_entity(entity)?];
        while let Some(e) = pending.pop() {
            if !e.is_abstract {
                out.push(e);
            }
            let mut children = self.derived_types(&e.name);
            children.reverse();
            pending.extend(children);
        }
        Ok(out)
    }

    fn navigation(&self, entity: &str, name: &str) -> Result<&Navigation> {
        self.base_chain(entity)?
            .into_iter()
            .find_map(|e| e.navigations.iter().find(|n| n.name == name))
            .ok_or_else(|| QuarryError::unmapped_member(entity, name))
    }

    /// Key properties of the hierarchy root.
    fn key_properties(&self, entity: &str) -> Result<Vec<CompactString>> {
        let root = self.root_type(entity)?;
        Ok(root.key.clone())
    }
}

// =============================================================================
// Model
// =============================================================================

/// In-memory metadata model.
#[derive(Debug, Clone, Default)]
pub struct Model {
    entities: Vec<EntityType>,
    index: HashMap<CompactString, usize>,
}

impl Model {
    pub fn builder() -> ModelBuilder {
        ModelBuilder::default()
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.iter()
    }
}

impl MetadataLookup for Model {
    fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.index.get(name).map(|&i| &self.entities[i])
    }

    fn derived_types(&self, name: &str) -> Vec<&EntityType> {
        self.entities
            .iter()
            .filter(|e| e.base.as_deref() == Some(name))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct ModelBuilder {
    entities: Vec<EntityType>,
}

impl ModelBuilder {
    pub fn entity(mut self, entity: EntityBuilder) -> Self {
        self.entities.push(entity.meta);
        self
    }

    /// Validates references between entity types and builds the model.
    pub fn build(self) -> Result<Model> {
        let mut index = HashMap::with_capacity(self.entities.len());
        for (i, e) in self.entities.iter().enumerate() {
            if index.insert(e.name.clone(), i).is_some() {
                return Err(QuarryError::InvalidQuery(format!(
                    "entity type `{}` registered twice",
                    e.name
                )));
            }
        }
        let mut model = Model {
            entities: self.entities,
            index,
        };

        for i in 0..model.entities.len() {
            let name = model.entities[i].name.clone();
            model.resolve_table(&name)?;
            let key = model.key_properties(&name)?;
            for k in &key {
                model.resolve_property(&name, k)?;
            }
            let mut navigations = model.entities[i].navigations.clone();
            for nav in &mut navigations {
                model.require_entity(&nav.target)?;
                if nav.principal_key.is_empty() {
                    nav.principal_key = key.clone();
                }
                if nav.principal_key.len() != nav.foreign_key.len() {
                    return Err(QuarryError::InvalidQuery(format!(
                        "navigation `{}.{}` has mismatched key arity",
                        name, nav.name
                    )));
                }
                for fk in &nav.foreign_key {
                    model.resolve_property(&nav.target, fk)?;
                }
            }
            model.entities[i].navigations = navigations;
        }
        Ok(model)
    }
}

/// Builder for one entity type.
#[derive(Debug, Clone)]
pub struct EntityBuilder {
    meta: EntityType,
}

impl EntityBuilder {
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self {
            meta: EntityType {
                name: name.into(),
                table: None,
                base: None,
                is_abstract: false,
                properties: Vec::new(),
                key: Vec::new(),
                discriminator: None,
                discriminator_value: None,
                navigations: Vec::new(),
            },
        }
    }

    pub fn table(mut self, name: impl Into<CompactString>) -> Self {
        self.meta.table = Some(TableName::new(name));
        self
    }

    pub fn schema(mut self, schema: impl Into<CompactString>) -> Self {
        if let Some(table) = &mut self.meta.table {
            table.schema = Some(schema.into());
        }
        self
    }

    pub fn base(mut self, base: impl Into<CompactString>) -> Self {
        self.meta.base = Some(base.into());
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.meta.is_abstract = true;
        self
    }

    pub fn key(mut self, member: impl Into<CompactString>) -> Self {
        self.meta.key.push(member.into());
        self
    }

    /// Non-nullable property stored in a column of the same name.
    pub fn property(self, name: impl Into<CompactString>, ty: ColumnType) -> Self {
        let name = name.into();
        self.column(name.clone(), name, ty, false)
    }

    pub fn nullable_property(self, name: impl Into<CompactString>, ty: ColumnType) -> Self {
        let name = name.into();
        self.column(name.clone(), name, ty, true)
    }

    pub fn column(
        mut self,
        name: impl Into<CompactString>,
        column: impl Into<CompactString>,
        ty: ColumnType,
        nullable: bool,
    ) -> Self {
        self.meta.properties.push(Property {
            name: name.into(),
            column: ColumnDescriptor {
                name: column.into(),
                ty,
                nullable,
            },
        });
        self
    }

    /// Declares the discriminator property of a hierarchy root.
    pub fn discriminator(mut self, member: impl Into<CompactString>) -> Self {
        self.meta.discriminator = Some(member.into());
        self
    }

    pub fn discriminator_value(mut self, value: impl Into<Value>) -> Self {
        self.meta.discriminator_value = Some(value.into());
        self
    }

    /// Collection navigation to `target`, joined on `foreign_key` against this
    /// type's key.
    pub fn has_many(
        mut self,
        name: impl Into<CompactString>,
        target: impl Into<CompactString>,
        foreign_key: impl Into<CompactString>,
    ) -> Self {
        self.meta.navigations.push(Navigation {
            name: name.into(),
            target: target.into(),
            foreign_key: vec![foreign_key.into()],
            principal_key: Vec::new(),
        });
        self
    }
}
