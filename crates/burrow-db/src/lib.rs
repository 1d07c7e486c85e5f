//! # burrow-db
//!
//! The observable store: transactional persistence for invitations and the
//! address book, with commit-time change notifications.
//!
//! All protocol state lives in one SQLite database with two domain tables
//! (`invitations`, `addressbook`) plus a `version` table checked at open.
//! Writes go through [`ObservableDb`], which batches them into a single
//! deferred transaction and queues a [`Notice`] per tracked write; `commit`
//! first commits durably, then hands the queued notices to subscriber
//! channels so observers see them on a later turn of the scheduler — never
//! synchronously inside the write, and never with a pre-commit view.

pub mod observable;
pub mod queries;
pub mod schema;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use rusqlite::Connection;

pub use observable::{Notice, NoticeAction, ObservableDb, Subscription};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types. Open failures and version mismatches are fatal to
/// the caller; there is no in-place downgrade path.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("unable to open database: {0}")]
    Open(String),

    #[error("unable to handle db version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// The store under single-threaded shared ownership. The whole core runs on
/// one cooperative scheduler, so interior mutability stands in for locking.
pub type SharedDb = Rc<RefCell<ObservableDb>>;

/// Open or create the database at the given path.
pub fn open(path: &Path) -> Result<ObservableDb> {
    let conn = Connection::open(path)
        .map_err(|e| DbError::Open(format!("{}: {e}", path.display())))?;
    configure(&conn)?;
    init_schema(&conn)?;
    Ok(ObservableDb::new(conn))
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<ObservableDb> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    init_schema(&conn)?;
    Ok(ObservableDb::new(conn))
}

/// Convenience: open an in-memory store under shared ownership.
pub fn open_memory_shared() -> Result<SharedDb> {
    Ok(Rc::new(RefCell::new(open_memory()?)))
}

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

/// Create the schema on a fresh database, or verify the stored version.
fn init_schema(conn: &Connection) -> Result<()> {
    let have_version_table: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'version'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| DbError::Open(format!("db file is unusable: {e}")))?;

    if have_version_table == 0 {
        tracing::info!("initializing store schema v{SCHEMA_VERSION}");
        conn.execute_batch(schema::SCHEMA_V1)?;
        conn.execute(
            "INSERT INTO version (version) VALUES (?1)",
            [SCHEMA_VERSION],
        )?;
        return Ok(());
    }

    let found: u32 = conn
        .query_row("SELECT version FROM version", [], |row| row.get(0))
        .map_err(|e| DbError::Open(format!("db file is unusable: {e}")))?;
    if found != SCHEMA_VERSION {
        return Err(DbError::Version {
            found,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory_creates_schema() {
        let db = open_memory().expect("open in-memory db");
        let version: u32 = db
            .conn()
            .query_row("SELECT version FROM version", [], |row| row.get(0))
            .expect("version row");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let db = open_memory().expect("open");
        for table in ["version", "invitations", "addressbook"] {
            let count: i64 = db
                .conn()
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("table check");
            assert_eq!(count, 1, "table '{table}' should exist");
        }
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let db = open_memory().expect("open");
        db.conn()
            .execute("UPDATE version SET version = 99", [])
            .expect("bump version");
        let result = init_schema(db.conn());
        assert!(matches!(
            result,
            Err(DbError::Version {
                found: 99,
                expected: SCHEMA_VERSION
            })
        ));
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let db = open_memory().expect("open");
        init_schema(db.conn()).expect("second init is a version check only");
    }
}
