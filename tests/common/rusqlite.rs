use std::ops::Deref;
use std::path::{Path, PathBuf};

use quarry::sqlite::SqliteStore;
use tempfile::TempDir;

const SCHEMA: &str = "
    CREATE TABLE customers (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        city TEXT,
        age INTEGER NOT NULL
    );
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER NOT NULL REFERENCES customers (id),
        total REAL NOT NULL
    );
    CREATE TABLE animals (
        id INTEGER PRIMARY KEY,
        kind TEXT NOT NULL,
        name TEXT NOT NULL,
        breed TEXT,
        lives INTEGER
    );
";

const SEED: &str = "
    INSERT INTO customers (id, name, city, age) VALUES
        (1, 'Ada', 'Oslo', 36),
        (2, 'Grace', NULL, 45),
        (3, 'Linus', 'Helsinki', 28),
        (4, 'Barbara', 'Oslo', 52),
        (5, 'Ken', NULL, 30);
    INSERT INTO orders (id, customer_id, total) VALUES
        (10, 1, 25.0),
        (11, 1, 40.0),
        (30, 3, 12.5),
        (31, 3, 7.5),
        (32, 3, 100.0),
        (40, 4, 60.0);
    INSERT INTO animals (id, kind, name, breed, lives) VALUES
        (1, 'dog', 'Rex', 'beagle', NULL),
        (2, 'cat', 'Tom', NULL, 9),
        (3, 'kitten', 'Kit', NULL, 9),
        (4, 'dog', 'Fido', NULL, NULL);
";

/// Seeded in-memory database with a single connection slot.
pub fn setup_db() -> SqliteStore {
    let store = SqliteStore::open_in_memory().expect("Failed to create in-memory database");
    create_tables(&store);
    store
}

/// Seeded database file; the directory holding it is removed on drop.
pub struct FileDb {
    store: SqliteStore,
    path: PathBuf,
    _dir: TempDir,
}

impl FileDb {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Deref for FileDb {
    type Target = SqliteStore;

    fn deref(&self) -> &SqliteStore {
        &self.store
    }
}

/// Seeded database file that allows several open cursors at once.
pub fn setup_file_db(max_connections: usize) -> FileDb {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("quarry.db");
    let store = SqliteStore::open(&path, max_connections).expect("Failed to open database file");
    create_tables(&store);
    FileDb {
        store,
        path,
        _dir: dir,
    }
}

fn create_tables(store: &SqliteStore) {
    store.execute_batch(SCHEMA).expect("Failed to create tables");
    store.execute_batch(SEED).expect("Failed to seed tables");
}
