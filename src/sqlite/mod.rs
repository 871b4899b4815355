//! SQLite store over `rusqlite`.
//!
//! Connections come from a small fixed pool. A `rusqlite` statement borrows
//! its connection, so readers step every row into an owned buffer when the
//! command executes; the connection slot stays taken until the cursor
//! releases it.

#[cfg(feature = "tokio")]
pub mod tokio;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use quarry_core::error::{QuarryError, Result};
use quarry_core::{BoundCommand, Connection, DataReader, DataStore, Value, ValueRow};
use rusqlite::params_from_iter;

enum Target {
    /// One private in-memory database; its single connection is the only slot.
    Memory,
    File(PathBuf),
}

struct PoolState {
    idle: Vec<rusqlite::Connection>,
    opened: usize,
}

struct Pool {
    target: Target,
    max_connections: usize,
    state: Mutex<PoolState>,
}

impl Pool {
    fn lock(&self) -> Result<MutexGuard<'_, PoolState>> {
        self.state
            .lock()
            .map_err(|_| QuarryError::Execution("connection pool lock poisoned".into()))
    }

    fn acquire(&self) -> Result<rusqlite::Connection> {
        let mut state = self.lock()?;
        if let Some(conn) = state.idle.pop() {
            return Ok(conn);
        }
        match &self.target {
            Target::File(path) if state.opened < self.max_connections => {
                let conn = rusqlite::Connection::open(path)?;
                state.opened += 1;
                Ok(conn)
            }
            _ => Err(QuarryError::ConnectionBusy),
        }
    }

    fn release(&self, conn: rusqlite::Connection) {
        // a poisoned pool drops the connection instead
        if let Ok(mut state) = self.state.lock() {
            state.idle.push(conn);
        }
    }
}

/// Pooled SQLite database. Cloning shares the pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Arc<Pool>,
}

impl core::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("max_connections", &self.pool.max_connections)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Private in-memory database with a single connection slot.
    ///
    /// Only one cursor can be open at a time, so include queries are
    /// buffered before the primary query runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Ok(Self {
            pool: Arc::new(Pool {
                target: Target::Memory,
                max_connections: 1,
                state: Mutex::new(PoolState {
                    idle: vec![conn],
                    opened: 1,
                }),
            }),
        })
    }

    /// Database file at `path`, opened lazily up to `max_connections` at once.
    pub fn open(path: impl AsRef<Path>, max_connections: usize) -> Result<Self> {
        if max_connections == 0 {
            return Err(QuarryError::InvalidQuery(
                "a store needs at least one connection".into(),
            ));
        }
        Ok(Self {
            pool: Arc::new(Pool {
                target: Target::File(path.as_ref().to_path_buf()),
                max_connections,
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    opened: 0,
                }),
            }),
        })
    }

    /// Runs a batch of statements (schema setup, seeding) on a free slot.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.open_connection()?;
        conn.raw()?.execute_batch(sql)?;
        Ok(())
    }

    /// Connections currently waiting in the pool.
    pub fn idle_connections(&self) -> usize {
        self.pool.lock().map(|s| s.idle.len()).unwrap_or(0)
    }

    fn open_connection(&self) -> Result<SqliteConnection> {
        let conn = self.pool.acquire()?;
        Ok(SqliteConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.pool),
        })
    }
}

impl DataStore for SqliteStore {
    type Connection = SqliteConnection;

    fn open(&self) -> Result<SqliteConnection> {
        self.open_connection()
    }

    fn max_active_cursors(&self) -> Option<usize> {
        Some(self.pool.max_connections)
    }
}

/// A taken pool slot; goes back to the pool on drop.
pub struct SqliteConnection {
    conn: Option<rusqlite::Connection>,
    pool: Arc<Pool>,
}

impl SqliteConnection {
    fn raw(&self) -> Result<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| QuarryError::Execution("connection already released".into()))
    }
}

impl core::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl Connection for SqliteConnection {
    type Reader = SqliteReader;

    fn execute_reader(&mut self, command: &BoundCommand) -> Result<SqliteReader> {
        quarry_core::quarry_profile_scope!("sqlite.rusqlite", "execute_reader");
        let conn = self.raw()?;
        let mut stmt = conn.prepare(command.sql())?;
        let columns = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(command.values()))?;
        let mut buffered = VecDeque::new();
        while let Some(row) = rows.next()? {
            let mut values = ValueRow::with_capacity(columns);
            for i in 0..columns {
                values.push(Value::from(row.get_ref(i)?));
            }
            buffered.push_back(values);
        }
        Ok(SqliteReader { rows: buffered })
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

/// Rows of one executed command, already stepped out of the statement.
#[derive(Debug, Default)]
pub struct SqliteReader {
    rows: VecDeque<ValueRow>,
}

impl SqliteReader {
    pub(crate) fn remaining(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn pop(&mut self) -> Option<ValueRow> {
        self.rows.pop_front()
    }
}

impl DataReader for SqliteReader {
    fn next_row(&mut self) -> Result<Option<ValueRow>> {
        Ok(self.pop())
    }
}
