use std::sync::atomic::{AtomicUsize, Ordering};

use quarry::core::command::BoundCommand;
use quarry::core::{Connection, DataReader, DataStore};
use quarry::error::QuarryError;
use quarry::prelude::*;
use quarry::sqlite::{SqliteConnection, SqliteReader, SqliteStore};
use quarry::Result;

// =============================================================================
// Row types
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub city: Option<String>,
    pub age: i64,
    pub orders: Vec<Order>,
}

impl Customer {
    fn new(id: i64, name: &str, city: Option<&str>, age: i64) -> Self {
        Self {
            id,
            name: name.into(),
            city: city.map(Into::into),
            age,
            orders: Vec::new(),
        }
    }
}

impl FromRow for Customer {
    const COLUMN_COUNT: usize = 4;

    fn from_row_at(row: &[Value], offset: usize) -> Result<Self> {
        let (id, name, city, age) =
            <(i64, String, Option<String>, i64)>::from_row_at(row, offset)?;
        Ok(Self {
            id,
            name,
            city,
            age,
            orders: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub total: f64,
}

impl FromRow for Order {
    const COLUMN_COUNT: usize = 3;

    fn from_row_at(row: &[Value], offset: usize) -> Result<Self> {
        let (id, customer_id, total) = <(i64, i64, f64)>::from_row_at(row, offset)?;
        Ok(Self {
            id,
            customer_id,
            total,
        })
    }
}

/// `(id, kind, name, breed, lives)`
pub type AnimalRow = (i64, String, String, Option<String>, Option<i64>);

/// Include binding for `Customer.orders`.
pub fn attach_orders(customer: &mut Customer, rows: Vec<ValueRow>) -> Result<()> {
    customer.orders = rows
        .iter()
        .map(|row| Order::from_row(row))
        .collect::<Result<_>>()?;
    Ok(())
}

// =============================================================================
// Reference data
// =============================================================================

/// The seeded customers, for evaluating queries in memory.
pub fn customers() -> Vec<Customer> {
    vec![
        Customer::new(1, "Ada", Some("Oslo"), 36),
        Customer::new(2, "Grace", None, 45),
        Customer::new(3, "Linus", Some("Helsinki"), 28),
        Customer::new(4, "Barbara", Some("Oslo"), 52),
        Customer::new(5, "Ken", None, 30),
    ]
}

pub fn ids(customers: &[Customer]) -> Vec<i64> {
    customers.iter().map(|c| c.id).collect()
}

pub fn sorted_ids(customers: &[Customer]) -> Vec<i64> {
    let mut ids = ids(customers);
    ids.sort_unstable();
    ids
}

/// Upper-cases a text argument. Only the client can run it.
pub fn shout() -> ClientFn {
    ClientFn::new("shout", |args| match args.first() {
        Some(Value::Text(s)) => Value::Text(s.to_uppercase()),
        _ => Value::Null,
    })
}

/// Returns its argument. Only the client can run it.
pub fn identity() -> ClientFn {
    ClientFn::new("identity", |args| args.first().cloned().unwrap_or(Value::Null))
}

pub fn compile_sqlite(query: &QueryBuilder) -> CompiledQuery {
    compile(
        &query.build().expect("query model is valid"),
        &crate::common::model(),
        CompileOptions::default(),
    )
    .expect("query compiles")
}

// =============================================================================
// Counting store
// =============================================================================

/// Store wrapper that counts slot traffic and can fail a read on demand.
pub struct CountingStore {
    inner: SqliteStore,
    opened: AtomicUsize,
    closed: AtomicUsize,
    fail_after: Option<usize>,
}

impl CountingStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            fail_after: None,
        }
    }

    /// Every reader errors once it has produced `rows` rows.
    pub fn failing_after(mut self, rows: usize) -> Self {
        self.fail_after = Some(rows);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DataStore for CountingStore {
    type Connection = CountingConnection;

    fn open(&self) -> Result<CountingConnection> {
        let inner = self.inner.open()?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(CountingConnection {
            inner,
            fail_after: self.fail_after,
        })
    }

    fn close(&self, connection: CountingConnection) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        drop(connection);
    }

    fn max_active_cursors(&self) -> Option<usize> {
        self.inner.max_active_cursors()
    }
}

pub struct CountingConnection {
    inner: SqliteConnection,
    fail_after: Option<usize>,
}

impl Connection for CountingConnection {
    type Reader = CountingReader;

    fn execute_reader(&mut self, command: &BoundCommand) -> Result<CountingReader> {
        Ok(CountingReader {
            inner: self.inner.execute_reader(command)?,
            remaining: self.fail_after,
        })
    }
}

pub struct CountingReader {
    inner: SqliteReader,
    remaining: Option<usize>,
}

impl DataReader for CountingReader {
    fn next_row(&mut self) -> Result<Option<ValueRow>> {
        match &mut self.remaining {
            Some(0) => Err(QuarryError::Execution("injected read failure".into())),
            Some(n) => {
                *n -= 1;
                self.inner.next_row()
            }
            None => self.inner.next_row(),
        }
    }
}
