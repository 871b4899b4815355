//! # Quarry
//!
//! Compiles composable query models into one SQL command per query and
//! streams typed results back, evaluating on the client whatever the server
//! cannot.
//!
//! ## Quick Start
//!
//! ```rust
//! use quarry::prelude::*;
//! use quarry::sqlite::SqliteStore;
//!
//! # fn main() -> quarry::Result<()> {
//! let model = Model::builder()
//!     .entity(
//!         EntityBuilder::new("Customer")
//!             .table("customers")
//!             .key("id")
//!             .property("id", ColumnType::Integer)
//!             .property("name", ColumnType::Text),
//!     )
//!     .build()?;
//!
//! let store = SqliteStore::open_in_memory()?;
//! store.execute_batch(
//!     "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
//!      INSERT INTO customers VALUES (1, 'Ada'), (2, 'Grace');",
//! )?;
//!
//! let mut query = QueryBuilder::from("Customer");
//! let c = query.root();
//! query
//!     .order_by([Ordering::asc(c.member("name"))])
//!     .select(c.member("name"));
//! let compiled = compile(&query.build()?, &model, CompileOptions::default())?;
//!
//! let names: Vec<String> = compiled.fetch_all(&store, &Parameters::new())?;
//! assert_eq!(names, ["Ada", "Grace"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Drivers
//!
//! | Database | Driver   | Feature Flag | Mode  |
//! |----------|----------|--------------|-------|
//! | SQLite   | rusqlite | `rusqlite`   | sync  |
//! | SQLite   | rusqlite | `tokio`      | async |

#![cfg_attr(docsrs, feature(doc_cfg))]

// =============================================================================
// Root-level exports
// =============================================================================

/// Result type for quarry operations
pub use quarry_core::error::Result;

/// Placeholder syntax and identifier quoting
pub use quarry_core::Dialect;

/// Error types
pub mod error {
    pub use quarry_core::error::QuarryError;
}

/// Cooperative cancellation for running queries.
pub use tokio_util::sync::CancellationToken;

pub use quarry_core::{
    AsyncQueryResults, CompileOptions, CompiledQuery, QueryResults, ResultShape, compile,
};

// =============================================================================
// Core module - compiler internals
// =============================================================================

/// Compiler building blocks, for tooling and custom stores.
///
/// - **Model**: `QueryModel`, `QueryBuilder`, `Expr`, result operators
/// - **Metadata**: `Model`, `EntityType`, `Property`, `Navigation`
/// - **SQL**: the select tree, the generator and parameter slots
/// - **Execution**: cursors, the client plan and include merging
pub mod core {
    pub use quarry_core::{client, command, cursor, include, metadata, model, row, select, sql};
    pub use quarry_core::{generator, translate, value};

    /// Store traits implemented by drivers
    pub use quarry_core::connection::{
        AsyncConnection, AsyncDataReader, AsyncDataStore, Connection, DataReader, DataStore,
    };
}

// =============================================================================
// SQLite
// =============================================================================

/// SQLite store over `rusqlite`.
#[cfg(feature = "rusqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "rusqlite")))]
pub mod sqlite;

// =============================================================================
// Prelude
// =============================================================================

/// Everything needed to describe, compile and run a query.
pub mod prelude {
    pub use quarry_core::{
        BinaryOp, ClientFn, ColumnType, CompileOptions, CompiledQuery, Dialect, Direction,
        EntityBuilder, Expr, FromRow, FromValue, Materializer, Method, Model, Ordering,
        Parameters, QueryBuilder, QueryModel, ResultOperator, ResultShape, RowMaterializer,
        SourceHandle, TableName, Value, ValueRow, compile,
    };
    pub use quarry_core::model::{client, condition, constant, param, tuple};
    pub use quarry_core::{AsyncDataStore, DataStore};

    pub use crate::CancellationToken;
    pub use crate::error::QuarryError;
}
