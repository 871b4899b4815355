//! # quarry-core
//!
//! Query compiler and execution engine behind `quarry`.
//!
//! A [`QueryModel`](model::QueryModel) is translated against a
//! [`MetadataLookup`](metadata::MetadataLookup) into a single SQL command plus
//! a client plan for anything the server cannot evaluate. Results stream
//! through a [`RowCursor`](cursor::RowCursor) (or its async mirror), the
//! client plan, and a caller-supplied [`Materializer`](row::Materializer).

pub mod client;
pub mod command;
pub mod connection;
pub mod cursor;
pub mod dialect;
pub mod error;
pub mod generator;
pub mod include;
pub mod metadata;
pub mod model;
pub mod profiling;
pub mod query;
pub mod row;
pub mod select;
pub mod sql;
pub mod tracing;
pub mod translate;
pub mod value;

// Re-export key types and traits
pub use command::{BoundCommand, Command, ParamSlot, Parameters};
pub use connection::{
    AsyncConnection, AsyncDataReader, AsyncDataStore, Connection, DataReader, DataStore,
};
pub use cursor::{AsyncRowCursor, CursorStatus, RowCursor};
pub use dialect::Dialect;
pub use error::{QuarryError, Result};
pub use include::{IncludeBinding, IncludePlan, IncludeState, MergeStep, merge_step};
pub use metadata::{
    ColumnDescriptor, ColumnType, EntityBuilder, EntityType, MetadataLookup, Model, Navigation,
    Property, TableName,
};
pub use model::{
    BinaryOp, ClientFn, Direction, Expr, Method, Ordering, QueryBuilder, QueryModel,
    ResultOperator, SourceHandle,
};
pub use query::{
    AsyncQueryResults, CompileOptions, CompiledQuery, QueryResults, ResultShape, compile,
};
pub use row::{FromRow, FromValue, Materializer, RowMaterializer, ValueRow};
pub use value::Value;
