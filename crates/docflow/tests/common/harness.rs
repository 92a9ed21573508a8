//! Isolated file-backed store for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;

use docflow::{Database, StoreConfig};

pub struct StoreHarness {
    /// Keeps the directory alive for the lifetime of the harness.
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub db: Database,
}

impl StoreHarness {
    /// A fresh store with default settings (WAL on).
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("docflow.db");
        let config = StoreConfig {
            database_path: db_path.clone(),
            ..StoreConfig::default()
        };
        let db = Database::open_with_config(&config).expect("Failed to open store");

        Self {
            temp_dir,
            db_path,
            db,
        }
    }

    /// A second, independent connection to the same file, as another
    /// service process would have.
    pub fn reopen(&self) -> Database {
        Database::open(&self.db_path).expect("Failed to reopen store")
    }

    pub fn table_count(&self, table: &str) -> i64 {
        self.db
            .with_conn(|conn| {
                Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| {
                    r.get(0)
                })?)
            })
            .expect("Failed to count rows")
    }
}
