//! Store abstraction consumed by the cursors.
//!
//! A [`DataStore`] hands out connection slots. A [`Connection`] executes one
//! bound command and returns a [`DataReader`] that owns its rows, so a cursor
//! can hold the connection and the reader side by side. The async traits
//! mirror the sync ones with `Send` futures.

use core::future::Future;

use crate::command::BoundCommand;
use crate::error::Result;
use crate::row::ValueRow;

/// Forward-only row source of one executed command.
pub trait DataReader {
    /// Next row, or `None` once the result set is exhausted.
    fn next_row(&mut self) -> Result<Option<ValueRow>>;
}

pub trait Connection {
    type Reader: DataReader;

    fn execute_reader(&mut self, command: &BoundCommand) -> Result<Self::Reader>;
}

pub trait DataStore {
    type Connection: Connection;

    /// Acquires a connection slot.
    fn open(&self) -> Result<Self::Connection>;

    /// Returns a slot to the store. Called exactly once per opened connection.
    fn close(&self, connection: Self::Connection) {
        drop(connection);
    }

    /// How many cursors may read at once; `None` when unbounded.
    ///
    /// A query streams its includes only when the primary cursor and every
    /// include cursor fit. Otherwise include queries are buffered before
    /// the primary cursor opens.
    fn max_active_cursors(&self) -> Option<usize> {
        None
    }
}

// =============================================================================
// Async mirrors
// =============================================================================

pub trait AsyncDataReader: Send {
    fn next_row(&mut self) -> impl Future<Output = Result<Option<ValueRow>>> + Send;
}

pub trait AsyncConnection: Send {
    type Reader: AsyncDataReader;

    fn execute_reader(
        &mut self,
        command: &BoundCommand,
    ) -> impl Future<Output = Result<Self::Reader>> + Send;
}

pub trait AsyncDataStore: Sync {
    type Connection: AsyncConnection;

    fn open(&self) -> impl Future<Output = Result<Self::Connection>> + Send;

    fn close(&self, connection: Self::Connection) {
        drop(connection);
    }

    fn max_active_cursors(&self) -> Option<usize> {
        None
    }
}
