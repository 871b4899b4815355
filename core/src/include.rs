//! Include iterators.
//!
//! Each include runs one dependent query whose rows are sorted by the
//! correlation key in the same order the primary query yields its parents.
//! Attaching is then a merge join with a single buffered row: for every
//! parent, take dependents while their key matches and leave the first
//! differing row buffered for the next parent. Nothing is sorted here; a
//! stream out of order leaves dependents unattached.
//!
//! When the client re-orders or filters parents the merge order no longer
//! holds, so the dependents are collected into an [`IncludeLookup`] instead.

use compact_str::CompactString;
use hashbrown::HashMap;

use crate::command::Command;
use crate::error::Result;
use crate::row::ValueRow;
use crate::value::Value;

/// Compiled dependent query of one include.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludePlan {
    pub navigation: CompactString,
    pub command: Command,
    /// Principal key positions in a parent result row.
    pub parent_key: Vec<usize>,
    /// Foreign key positions in a dependent row.
    pub child_key: Vec<usize>,
}

impl IncludePlan {
    pub fn parent_key_of(&self, row: &[Value]) -> Vec<Value> {
        key_of(row, &self.parent_key)
    }
}

fn key_of(row: &[Value], positions: &[usize]) -> Vec<Value> {
    positions
        .iter()
        .map(|&i| row.get(i).cloned().unwrap_or_default())
        .collect()
}

/// Attaches dependent rows to a materialized parent.
pub trait IncludeBinding<P> {
    fn attach(&mut self, parent: &mut P, children: Vec<ValueRow>) -> Result<()>;
}

impl<P, F> IncludeBinding<P> for F
where
    F: FnMut(&mut P, Vec<ValueRow>) -> Result<()>,
{
    fn attach(&mut self, parent: &mut P, children: Vec<ValueRow>) -> Result<()> {
        self(parent, children)
    }
}

// =============================================================================
// Merge join
// =============================================================================

/// Buffering state carried between parents.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeState {
    buffered: Option<ValueRow>,
    has_more: bool,
}

impl Default for IncludeState {
    fn default() -> Self {
        Self::new()
    }
}

impl IncludeState {
    pub fn new() -> Self {
        Self {
            buffered: None,
            has_more: true,
        }
    }

    /// State after pulling `row` in answer to [`MergeStep::NeedRow`];
    /// `None` marks the end of the dependent stream.
    pub fn fed(self, row: Option<ValueRow>) -> Self {
        match row {
            Some(row) => Self {
                buffered: Some(row),
                has_more: true,
            },
            None => Self {
                buffered: None,
                has_more: false,
            },
        }
    }

    pub fn buffered(&self) -> Option<&ValueRow> {
        self.buffered.as_ref()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeStep {
    /// The row belongs to the current parent.
    Attach(ValueRow),
    /// Pull the next dependent row and feed it back with [`IncludeState::fed`].
    NeedRow,
    /// The current parent has no further dependents.
    Done,
}

/// One step of the merge for the parent keyed `parent_key`.
pub fn merge_step(
    state: IncludeState,
    parent_key: &[Value],
    child_key: &[usize],
) -> (IncludeState, MergeStep) {
    match state.buffered {
        Some(row) => {
            let matches = child_key.len() == parent_key.len()
                && child_key
                    .iter()
                    .zip(parent_key)
                    .all(|(&i, key)| row.get(i).is_some_and(|v| !v.is_null() && v == key));
            if matches {
                let state = IncludeState {
                    buffered: None,
                    has_more: state.has_more,
                };
                (state, MergeStep::Attach(row))
            } else {
                let state = IncludeState {
                    buffered: Some(row),
                    has_more: state.has_more,
                };
                (state, MergeStep::Done)
            }
        }
        None if state.has_more => (state, MergeStep::NeedRow),
        None => (state, MergeStep::Done),
    }
}

/// Runs the merge for one parent against a synchronous row source.
pub fn collect_children(
    mut state: IncludeState,
    parent_key: &[Value],
    child_key: &[usize],
    mut pull: impl FnMut() -> Result<Option<ValueRow>>,
) -> Result<(IncludeState, Vec<ValueRow>)> {
    let mut children = Vec::new();
    loop {
        let (next, step) = merge_step(state, parent_key, child_key);
        state = match step {
            MergeStep::Attach(row) => {
                children.push(row);
                next
            }
            MergeStep::NeedRow => next.fed(pull()?),
            MergeStep::Done => return Ok((next, children)),
        };
    }
}

// =============================================================================
// Lookup
// =============================================================================

/// Dependent rows grouped by correlation key.
#[derive(Debug, Clone, Default)]
pub struct IncludeLookup {
    child_key: Vec<usize>,
    groups: HashMap<Vec<Value>, Vec<ValueRow>>,
}

impl IncludeLookup {
    pub fn new(child_key: Vec<usize>) -> Self {
        Self {
            child_key,
            groups: HashMap::new(),
        }
    }

    pub fn insert(&mut self, row: ValueRow) {
        let key = key_of(&row, &self.child_key);
        if key.iter().any(Value::is_null) {
            return;
        }
        self.groups.entry(key).or_default().push(row);
    }

    pub fn children(&self, parent_key: &[Value]) -> Vec<ValueRow> {
        self.groups.get(parent_key).cloned().unwrap_or_default()
    }
}
