use rusqlite::Connection;
use std::cell::RefCell;

use crate::errors::StoreError;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

// Thread-local connection slot: each worker thread opens the database once
// and reuses that connection for every call it makes afterwards.
thread_local! {
    static DB_CONN: RefCell<Option<Connection>> = const { RefCell::new(None) };
}

/// Handle to the SQLite database. Cheap to clone; created once at process
/// start and passed explicitly into every operation path — nothing in this
/// crate reaches for a global connection.
#[derive(Clone)]
pub struct Database {
    path: String,
}

impl Database {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Opens (or fetches the per-thread cached) connection and runs `f`.
    ///
    /// The closure gets a mutable connection so operations can open
    /// transactions. Calls must not nest — each operation borrows the slot
    /// for its whole duration.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let inner_result = DB_CONN
            .try_with(|cell| {
                let mut slot = cell.borrow_mut();
                if slot.is_none() {
                    let conn = Connection::open(&self.path)
                        .map_err(|e| StoreError::Db(format!("open database failed: {e}")))?;
                    conn.execute_batch("pragma foreign_keys = on;")
                        .map_err(|e| StoreError::Db(format!("enable foreign keys failed: {e}")))?;
                    *slot = Some(conn);
                }
                let conn = slot.as_mut().expect("connection slot just filled");
                f(conn)
            })
            .map_err(|e| StoreError::Db(format!("thread-local connection unavailable: {e}")))?;
        inner_result
    }

    /// Applies the embedded schema. Safe to call repeatedly; every statement
    /// is `if not exists`.
    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| apply_schema(conn))
    }
}

/// Applies the production schema to any connection. Tests run this against
/// in-memory databases.
pub fn apply_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA_SQL)
        .map_err(|e| StoreError::Db(format!("apply schema failed: {e}")))
}
