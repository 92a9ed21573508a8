//! Database module for the document processing metadata store.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle.
//! All access is serialized through a `Mutex<Connection>`; every
//! multi-statement operation runs inside a single transaction.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

pub mod columns;
pub mod document_repo;
pub mod error;
pub mod migrations;
pub mod model_metric_repo;
pub mod ocr_repo;
pub mod performance_repo;
pub mod prediction_repo;
pub mod stats_repo;
pub mod validate;

pub use columns::{Metadata, Namespace};
pub use error::DatabaseError;

use crate::config::StoreConfig;

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). Independent services in the same
/// process share one handle; separate processes each open their own and
/// rely on SQLite locking plus `busy_timeout`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path with default
    /// settings and runs all pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let config = StoreConfig {
            database_path: path.to_path_buf(),
            ..StoreConfig::default()
        };
        Self::open_with_config(&config)
    }

    /// Opens the database described by `config` and runs all pending
    /// migrations.
    pub fn open_with_config(config: &StoreConfig) -> Result<Self, DatabaseError> {
        let path = config.database_path.as_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        if config.wal {
            enable_wal(&conn)?;
        }
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside a transaction. Commits on `Ok`, rolls back on `Err`.
    ///
    /// The write lock is taken up front so a read-then-write sequence
    /// cannot fail on a stale snapshot when another connection commits.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DatabaseError>,
    {
        let mut conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Switches the file to write-ahead logging.
///
/// The switch needs the file to itself, which the busy handler does not
/// always cover while other processes are opening it.
fn enable_wal(conn: &Connection) -> Result<(), DatabaseError> {
    const ATTEMPTS: u32 = 50;

    let mut attempt = 1;
    loop {
        match conn.execute_batch("PRAGMA journal_mode=WAL;") {
            Ok(()) => return Ok(()),
            Err(e) => {
                let err = DatabaseError::from(e);
                if !matches!(err, DatabaseError::StorageUnavailable(_)) || attempt == ATTEMPTS {
                    return Err(err);
                }
                log::debug!("Database busy enabling WAL (attempt {})", attempt);
                std::thread::sleep(Duration::from_millis(20));
                attempt += 1;
            }
        }
    }
}

/// Returns the canonical database path: `~/.docflow/data/docflow.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".docflow").join("data").join("docflow.db"))
}

/// Returns whether a row with `id` exists in `table`.
///
/// `table` must be one of the store's own table names.
pub(crate) fn row_exists(conn: &Connection, table: &str, id: i64) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table),
        [id],
        |r| r.get(0),
    )?;
    Ok(exists)
}
