// src/tests/utils.rs

use rusqlite::Connection;

use crate::db::connection::{apply_schema, Database};

/// Fresh in-memory database with the production schema applied. Each test
/// gets its own; nothing is shared across threads.
pub fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch("pragma foreign_keys = on;")
        .expect("enable foreign keys");
    apply_schema(&conn).expect("apply schema");
    conn
}

/// File-backed database for scenarios that go through the `Database` handle.
/// The file is recreated from scratch on every call, so `name` must be
/// unique per test.
pub fn test_db(name: &str) -> Database {
    let path = std::env::temp_dir().join(format!("stockbook_test_{name}.sqlite"));
    let _ = std::fs::remove_file(&path);
    let db = Database::new(path.to_string_lossy().into_owned());
    db.init_schema().expect("init schema");
    db
}
