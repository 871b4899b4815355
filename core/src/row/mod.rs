//! Row shaping.
//!
//! Server rows, client results and include rows are all [`ValueRow`]s. A
//! [`Materializer`] turns each result row into the caller's type; it is
//! invoked once per row the cursor advances past, never ahead of it.
//!
//! [`FromRow`] reads a type from a row at a column offset, so tuples can split
//! one row across several values:
//!
//! ```ignore
//! let rows: Vec<(i64, String)> = compiled.fetch_all(&store, &params)?;
//! ```

use core::marker::PhantomData;

use smallvec::SmallVec;

use crate::error::{QuarryError, Result};
use crate::value::Value;

/// One row of values, inline up to eight columns.
pub type ValueRow = SmallVec<[Value; 8]>;

// =============================================================================
// FromValue
// =============================================================================

/// Conversion of a single column value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: &str, value: &Value) -> QuarryError {
    QuarryError::Mapping(format!("expected {expected}, found {value:?}"))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i),
            other => Err(mismatch("integer", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| QuarryError::Mapping(format!("{wide} overflows i32")))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Real(r) => Ok(r),
            Value::Integer(i) => Ok(i as f64),
            other => Err(mismatch("real", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(i != 0),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch("text", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(b) => Ok(b.into_vec()),
            other => Err(mismatch("blob", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

// =============================================================================
// FromRow
// =============================================================================

/// Extracts a value from a row starting at a column offset.
///
/// Tuple impls compose: `(A, B)` reads `A` at `offset`, then `B` at
/// `offset + A::COLUMN_COUNT`.
#[diagnostic::on_unimplemented(
    message = "cannot read `{Self}` from a query row",
    label = "this type does not implement FromRow",
    note = "implement FromRow, or pass a closure materializer to `run`"
)]
pub trait FromRow: Sized {
    /// Number of columns this type reads.
    const COLUMN_COUNT: usize;

    fn from_row_at(row: &[Value], offset: usize) -> Result<Self>;

    fn from_row(row: &[Value]) -> Result<Self> {
        Self::from_row_at(row, 0)
    }
}

macro_rules! impl_from_row_scalar {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl FromRow for $ty {
                const COLUMN_COUNT: usize = 1;

                fn from_row_at(row: &[Value], offset: usize) -> Result<Self> {
                    let value = row.get(offset).cloned().ok_or_else(|| {
                        QuarryError::Mapping(format!(
                            "row has {} column(s), no column {offset}",
                            row.len()
                        ))
                    })?;
                    <$ty as FromValue>::from_value(value)
                }
            }

            impl FromRow for Option<$ty> {
                const COLUMN_COUNT: usize = 1;

                fn from_row_at(row: &[Value], offset: usize) -> Result<Self> {
                    match row.get(offset) {
                        Some(value) => <Option<$ty> as FromValue>::from_value(value.clone()),
                        None => Err(QuarryError::Mapping(format!(
                            "row has {} column(s), no column {offset}",
                            row.len()
                        ))),
                    }
                }
            }
        )+
    };
}

impl_from_row_scalar!(Value, i64, i32, f64, bool, String, Vec<u8>);

macro_rules! impl_from_row_tuple {
    ($($T:ident),+) => {
        impl<$($T: FromRow),+> FromRow for ($($T,)+) {
            const COLUMN_COUNT: usize = 0 $(+ <$T as FromRow>::COLUMN_COUNT)+;

            #[allow(non_snake_case)]
            fn from_row_at(row: &[Value], offset: usize) -> Result<Self> {
                let mut at = offset;
                $(
                    let $T = <$T as FromRow>::from_row_at(row, at)?;
                    at += <$T as FromRow>::COLUMN_COUNT;
                )+
                let _ = at;
                Ok(($($T,)+))
            }
        }
    };
}

impl_from_row_tuple!(A);
impl_from_row_tuple!(A, B);
impl_from_row_tuple!(A, B, C);
impl_from_row_tuple!(A, B, C, D);
impl_from_row_tuple!(A, B, C, D, E);
impl_from_row_tuple!(A, B, C, D, E, F);
impl_from_row_tuple!(A, B, C, D, E, F, G);
impl_from_row_tuple!(A, B, C, D, E, F, G, H);

// =============================================================================
// Materializer
// =============================================================================

/// Shapes one result row into the caller's type.
pub trait Materializer {
    type Output;

    fn shape_row(&mut self, row: ValueRow) -> Result<Self::Output>;
}

impl<T, F> Materializer for F
where
    F: FnMut(ValueRow) -> Result<T>,
{
    type Output = T;

    fn shape_row(&mut self, row: ValueRow) -> Result<T> {
        self(row)
    }
}

/// Materializer backed by a [`FromRow`] impl.
#[derive(Debug)]
pub struct RowMaterializer<T>(PhantomData<fn() -> T>);

impl<T> RowMaterializer<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for RowMaterializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for RowMaterializer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: FromRow> Materializer for RowMaterializer<T> {
    type Output = T;

    fn shape_row(&mut self, row: ValueRow) -> Result<T> {
        if row.len() < T::COLUMN_COUNT {
            return Err(QuarryError::Mapping(format!(
                "expected {} column(s), row has {}",
                T::COLUMN_COUNT,
                row.len()
            )));
        }
        T::from_row(&row)
    }
}
