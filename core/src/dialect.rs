//! SQL dialects the generator can target.

use std::borrow::Cow;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Dialect {
    #[default]
    SQLite,
    PostgreSQL,
}

impl Dialect {
    /// Renders a placeholder for this dialect with the given 1-based index.
    ///
    /// Returns `Cow::Borrowed("?")` for SQLite (zero allocation),
    /// `Cow::Owned` for PostgreSQL numbered placeholders.
    #[inline]
    pub fn render_placeholder(&self, index: usize) -> Cow<'static, str> {
        match self {
            Dialect::PostgreSQL => Cow::Owned(format!("${index}")),
            Dialect::SQLite => Cow::Borrowed("?"),
        }
    }

    /// Writes a placeholder without allocating.
    pub(crate) fn write_placeholder(&self, index: usize, buf: &mut impl core::fmt::Write) {
        let _ = match self {
            Dialect::PostgreSQL => write!(buf, "${index}"),
            Dialect::SQLite => buf.write_char('?'),
        };
    }

    /// `LIMIT` count to emit when only an `OFFSET` is present.
    ///
    /// SQLite's grammar requires a `LIMIT` before `OFFSET`; `-1` means unbounded.
    #[inline]
    pub(crate) const fn unbounded_limit(&self) -> Option<i64> {
        match self {
            Dialect::SQLite => Some(-1),
            Dialect::PostgreSQL => None,
        }
    }

    /// Name of the function returning the 1-based position of a substring.
    #[inline]
    pub(crate) const fn position_function(&self) -> &'static str {
        match self {
            Dialect::SQLite => "instr",
            Dialect::PostgreSQL => "strpos",
        }
    }
}
