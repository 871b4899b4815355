//! Forward-only row cursors.
//!
//! A cursor owns at most one connection slot. It opens lazily on the first
//! pull, and gives the slot back exactly once: on exhaustion, on an explicit
//! [`close`](RowCursor::close), on any error, on cancellation, or on drop.

use tokio_util::sync::CancellationToken;

use crate::command::BoundCommand;
use crate::connection::{
    AsyncConnection, AsyncDataReader, AsyncDataStore, Connection, DataReader, DataStore,
};
use crate::error::{QuarryError, Result};
use crate::row::ValueRow;

/// Lifecycle of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStatus {
    Unstarted,
    Open,
    Exhausted,
    Closed,
}

enum State<C, R> {
    Unstarted,
    Open { connection: C, reader: R },
    Exhausted,
    Closed,
}

impl<C, R> State<C, R> {
    fn status(&self) -> CursorStatus {
        match self {
            State::Unstarted => CursorStatus::Unstarted,
            State::Open { .. } => CursorStatus::Open,
            State::Exhausted => CursorStatus::Exhausted,
            State::Closed => CursorStatus::Closed,
        }
    }
}

fn cancelled(token: Option<&CancellationToken>) -> bool {
    token.is_some_and(CancellationToken::is_cancelled)
}

// =============================================================================
// RowCursor
// =============================================================================

type SyncState<S> = State<
    <S as DataStore>::Connection,
    <<S as DataStore>::Connection as Connection>::Reader,
>;

pub struct RowCursor<'s, S: DataStore> {
    store: &'s S,
    command: BoundCommand,
    state: SyncState<S>,
    cancel: Option<CancellationToken>,
}

impl<'s, S: DataStore> RowCursor<'s, S> {
    pub fn new(store: &'s S, command: BoundCommand) -> Self {
        Self {
            store,
            command,
            state: State::Unstarted,
            cancel: None,
        }
    }

    /// Stops pulling once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn status(&self) -> CursorStatus {
        self.state.status()
    }

    pub fn next_row(&mut self) -> Result<Option<ValueRow>> {
        if matches!(self.state, State::Exhausted | State::Closed) {
            return Ok(None);
        }
        if cancelled(self.cancel.as_ref()) {
            self.release(State::Closed);
            return Err(QuarryError::Cancelled);
        }
        if let State::Unstarted = self.state {
            self.open()?;
        }
        let State::Open { reader, .. } = &mut self.state else {
            return Ok(None);
        };
        match reader.next_row() {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.release(State::Exhausted);
                Ok(None)
            }
            Err(e) => {
                self.release(State::Closed);
                Err(e)
            }
        }
    }

    /// Releases the slot without reading further. Idempotent.
    pub fn close(&mut self) {
        if matches!(self.state, State::Exhausted) {
            return;
        }
        self.release(State::Closed);
    }

    fn open(&mut self) -> Result<()> {
        crate::quarry_trace_query!(self.command.sql(), self.command.values().len());
        let mut connection = match self.store.open() {
            Ok(connection) => connection,
            Err(e) => {
                self.state = State::Closed;
                return Err(e);
            }
        };
        match connection.execute_reader(&self.command) {
            Ok(reader) => {
                crate::quarry_trace_cursor!("open", "sync");
                self.state = State::Open { connection, reader };
                Ok(())
            }
            Err(e) => {
                self.store.close(connection);
                self.state = State::Closed;
                Err(e)
            }
        }
    }

    fn release(&mut self, next: SyncState<S>) {
        if let State::Open { connection, reader } = core::mem::replace(&mut self.state, next) {
            drop(reader);
            self.store.close(connection);
            crate::quarry_trace_cursor!("release", "sync");
        }
    }
}

impl<S: DataStore> Drop for RowCursor<'_, S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: DataStore> Iterator for RowCursor<'_, S> {
    type Item = Result<ValueRow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

// =============================================================================
// AsyncRowCursor
// =============================================================================

type AsyncState<S> = State<
    <S as AsyncDataStore>::Connection,
    <<S as AsyncDataStore>::Connection as AsyncConnection>::Reader,
>;

/// Async mirror of [`RowCursor`]; suspends only to open, execute and read.
pub struct AsyncRowCursor<'s, S: AsyncDataStore> {
    store: &'s S,
    command: BoundCommand,
    state: AsyncState<S>,
    cancel: Option<CancellationToken>,
}

impl<'s, S: AsyncDataStore> AsyncRowCursor<'s, S> {
    pub fn new(store: &'s S, command: BoundCommand) -> Self {
        Self {
            store,
            command,
            state: State::Unstarted,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn status(&self) -> CursorStatus {
        self.state.status()
    }

    pub async fn next_row(&mut self) -> Result<Option<ValueRow>> {
        if matches!(self.state, State::Exhausted | State::Closed) {
            return Ok(None);
        }
        if cancelled(self.cancel.as_ref()) {
            self.release(State::Closed);
            return Err(QuarryError::Cancelled);
        }
        if let State::Unstarted = self.state {
            self.open().await?;
        }
        let State::Open { reader, .. } = &mut self.state else {
            return Ok(None);
        };
        let read = match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(QuarryError::Cancelled),
                    read = reader.next_row() => read,
                }
            }
            None => reader.next_row().await,
        };
        match read {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.release(State::Exhausted);
                Ok(None)
            }
            Err(e) => {
                self.release(State::Closed);
                Err(e)
            }
        }
    }

    pub fn close(&mut self) {
        if matches!(self.state, State::Exhausted) {
            return;
        }
        self.release(State::Closed);
    }

    async fn open(&mut self) -> Result<()> {
        crate::quarry_trace_query!(self.command.sql(), self.command.values().len());
        let mut connection = match self.store.open().await {
            Ok(connection) => connection,
            Err(e) => {
                self.state = State::Closed;
                return Err(e);
            }
        };
        match connection.execute_reader(&self.command).await {
            Ok(reader) => {
                crate::quarry_trace_cursor!("open", "async");
                self.state = State::Open { connection, reader };
                Ok(())
            }
            Err(e) => {
                self.store.close(connection);
                self.state = State::Closed;
                Err(e)
            }
        }
    }

    fn release(&mut self, next: AsyncState<S>) {
        if let State::Open { connection, reader } = core::mem::replace(&mut self.state, next) {
            drop(reader);
            self.store.close(connection);
            crate::quarry_trace_cursor!("release", "async");
        }
    }
}

impl<S: AsyncDataStore> Drop for AsyncRowCursor<'_, S> {
    fn drop(&mut self) {
        self.close();
    }
}
