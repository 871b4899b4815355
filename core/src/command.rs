//! Command descriptors and parameter binding.
//!
//! A [`Command`] is immutable SQL text plus the ordered list of value slots its
//! placeholders refer to. Binding resolves every slot against a [`Parameters`]
//! map, so the same command runs with different values.

use compact_str::CompactString;
use hashbrown::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{QuarryError, Result};
use crate::value::Value;

/// Source of one placeholder's value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamSlot {
    /// Constant captured from the query model.
    Constant(Value),
    /// Named parameter resolved at execution time.
    Named {
        name: CompactString,
        /// Row counts (`LIMIT`/`OFFSET`) clamp negative values to zero.
        clamp_non_negative: bool,
    },
}

impl ParamSlot {
    pub fn named(name: impl Into<CompactString>) -> Self {
        Self::Named {
            name: name.into(),
            clamp_non_negative: false,
        }
    }

    fn resolve(&self, params: &Parameters) -> Result<Value> {
        match self {
            ParamSlot::Constant(value) => Ok(value.clone()),
            ParamSlot::Named {
                name,
                clamp_non_negative,
            } => {
                let value = params.require(name)?.clone();
                Ok(match value {
                    Value::Integer(i) if *clamp_non_negative => Value::Integer(i.max(0)),
                    other => other,
                })
            }
        }
    }
}

/// Runtime parameter values, by name.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Parameters {
    values: HashMap<CompactString, Value>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<CompactString>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<CompactString>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| QuarryError::MissingParameter(name.into()))
    }
}

impl<K: Into<CompactString>, V: Into<Value>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Immutable SQL text and its ordered parameter slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    sql: String,
    slots: Vec<ParamSlot>,
    dialect: Dialect,
}

impl Command {
    pub(crate) fn new(sql: String, slots: Vec<ParamSlot>, dialect: Dialect) -> Self {
        Self {
            sql,
            slots,
            dialect,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn slots(&self) -> &[ParamSlot] {
        &self.slots
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Names of the runtime parameters this command needs.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().filter_map(|slot| match slot {
            ParamSlot::Named { name, .. } => Some(name.as_str()),
            ParamSlot::Constant(_) => None,
        })
    }

    /// Resolves every slot. Fails before anything executes if a name is missing.
    pub fn bind(&self, params: &Parameters) -> Result<BoundCommand> {
        let values = self
            .slots
            .iter()
            .map(|slot| slot.resolve(params))
            .collect::<Result<Vec<_>>>()?;
        Ok(BoundCommand {
            sql: self.sql.clone(),
            values,
        })
    }
}

/// A command whose placeholder values are resolved, ready for a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCommand {
    sql: String,
    values: Vec<Value>,
}

impl BoundCommand {
    pub fn new(sql: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Values in placeholder order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}
