//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order. All pending migrations and their bookkeeping
//! rows are committed together, so a failed migration leaves no partial
//! schema.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_documents_table",
        sql: include_str!("sql/001_create_documents.sql"),
    },
    Migration {
        version: 2,
        description: "create_ocr_results_table",
        sql: include_str!("sql/002_create_ocr_results.sql"),
    },
    Migration {
        version: 3,
        description: "create_predictions_table",
        sql: include_str!("sql/003_create_predictions.sql"),
    },
    Migration {
        version: 4,
        description: "create_model_metrics_table",
        sql: include_str!("sql/004_create_model_metrics.sql"),
    },
    Migration {
        version: 5,
        description: "create_performance_metrics_table",
        sql: include_str!("sql/005_create_performance_metrics.sql"),
    },
];

/// Latest schema version known to this build.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Returns the highest applied schema version.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

/// Runs all pending migrations on the given connection.
///
/// The whole pass holds the write lock, so several processes opening the
/// same fresh file apply each migration exactly once.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch("BEGIN IMMEDIATE;")?;

    match apply_pending(conn) {
        Ok(applied) => {
            if let Err(e) = conn.execute_batch("COMMIT;") {
                let _ = conn.execute_batch("ROLLBACK;");
                return Err(e.into());
            }
            if applied > 0 {
                log::info!("Applied {} migration(s), schema at v{}", applied, latest_version());
            }
            Ok(())
        }
        Err(e) => {
            // Leave the connection usable for the caller.
            let _ = conn.execute_batch("ROLLBACK;");
            Err(e)
        }
    }
}

fn apply_pending(conn: &Connection) -> Result<usize, DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    // Read under the write lock; another opener may have just migrated.
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .and_then(|_| {
                conn.execute(
                    "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.description],
                )
            })
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;
        applied += 1;
    }

    Ok(applied)
}
