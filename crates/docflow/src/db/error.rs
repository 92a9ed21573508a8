//! Database error types.

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors from store operations.
///
/// The first five variants form the contract callers branch on; the
/// remaining ones are infrastructure failures.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Malformed or missing input, rejected before any write.
    #[error("Validation failed for '{field}': {reason}")]
    Validation { field: &'static str, reason: String },

    /// A referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The engine rejected a write that would orphan a row.
    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The underlying engine could not be reached or is busy.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Any other SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A structured column could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The database lock was poisoned.
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the caller may reasonably retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::LockPoisoned)
    }

    /// Whether the error reports a missing or dangling document reference.
    pub fn is_missing_reference(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ReferentialIntegrity(_))
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        let rusqlite::Error::SqliteFailure(ref failure, ref message) = err else {
            return Self::Sqlite(err);
        };
        let detail = message.clone().unwrap_or_else(|| failure.to_string());
        let (code, extended_code) = (failure.code, failure.extended_code);

        match code {
            ErrorCode::ConstraintViolation => match extended_code {
                rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Self::ReferentialIntegrity(detail),
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Self::Conflict(detail),
                rusqlite::ffi::SQLITE_CONSTRAINT_CHECK
                | rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL => Self::Validation {
                    field: "constraint",
                    reason: detail,
                },
                _ => Self::Sqlite(err),
            },
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::DiskFull => Self::StorageUnavailable(detail),
            _ => Self::Sqlite(err),
        }
    }
}
