//! Async SQLite store. `rusqlite` is blocking, so opening a slot and
//! executing a command run on tokio's blocking pool.

use quarry_core::error::{QuarryError, Result};
use quarry_core::{
    AsyncConnection, AsyncDataReader, AsyncDataStore, BoundCommand, Connection, DataReader,
    DataStore, ValueRow,
};

use super::{SqliteConnection, SqliteReader, SqliteStore};

fn join_error(e: ::tokio::task::JoinError) -> QuarryError {
    QuarryError::Execution(format!("blocking task failed: {e}"))
}

/// Async handle over a [`SqliteStore`] pool.
#[derive(Debug, Clone)]
pub struct AsyncSqliteStore {
    inner: SqliteStore,
}

impl AsyncSqliteStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self { inner }
    }

    pub fn open_in_memory() -> Result<Self> {
        SqliteStore::open_in_memory().map(Self::new)
    }

    /// The underlying sync store; shares the same pool.
    pub fn blocking(&self) -> &SqliteStore {
        &self.inner
    }
}

impl From<SqliteStore> for AsyncSqliteStore {
    fn from(inner: SqliteStore) -> Self {
        Self::new(inner)
    }
}

impl AsyncDataStore for AsyncSqliteStore {
    type Connection = AsyncSqliteConnection;

    async fn open(&self) -> Result<AsyncSqliteConnection> {
        let store = self.inner.clone();
        let conn = ::tokio::task::spawn_blocking(move || store.open())
            .await
            .map_err(join_error)??;
        Ok(AsyncSqliteConnection { inner: Some(conn) })
    }

    fn max_active_cursors(&self) -> Option<usize> {
        self.inner.max_active_cursors()
    }
}

#[derive(Debug)]
pub struct AsyncSqliteConnection {
    inner: Option<SqliteConnection>,
}

impl AsyncConnection for AsyncSqliteConnection {
    type Reader = AsyncSqliteReader;

    async fn execute_reader(&mut self, command: &BoundCommand) -> Result<AsyncSqliteReader> {
        let mut conn = self
            .inner
            .take()
            .ok_or_else(|| QuarryError::Execution("connection already released".into()))?;
        let command = command.clone();
        let (conn, read) = ::tokio::task::spawn_blocking(move || {
            let read = conn.execute_reader(&command);
            (conn, read)
        })
        .await
        .map_err(join_error)?;
        self.inner = Some(conn);
        Ok(AsyncSqliteReader { inner: read? })
    }
}

/// Buffered rows; reading never blocks.
#[derive(Debug, Default)]
pub struct AsyncSqliteReader {
    inner: SqliteReader,
}

impl AsyncDataReader for AsyncSqliteReader {
    async fn next_row(&mut self) -> Result<Option<ValueRow>> {
        self.inner.next_row()
    }
}
