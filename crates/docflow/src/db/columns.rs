//! Column encoding shared by the repositories.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text with millisecond
//! precision (`2026-01-01T00:00:00.000Z`), the same shape SQLite produces
//! for the column defaults, so string comparison orders them chronologically.
//! Structured columns are stored as JSON text.

use chrono::{DateTime, DurationRound, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::DatabaseError;

/// Open-ended structured metadata attached to a row.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// SQL expression used as the default for every timestamp column.
pub const SQL_NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Logical grouping of the store's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Documents,
    Models,
    Metrics,
}

impl Namespace {
    /// Tables belonging to this namespace.
    pub fn tables(self) -> &'static [&'static str] {
        match self {
            Namespace::Documents => &["documents", "ocr_results", "predictions"],
            Namespace::Models => &["model_metrics"],
            Namespace::Metrics => &["performance_metrics"],
        }
    }

    /// Returns the namespace that owns `table`, if it is a store table.
    pub fn of_table(table: &str) -> Option<Self> {
        [Namespace::Documents, Namespace::Models, Namespace::Metrics]
            .into_iter()
            .find(|ns| ns.tables().contains(&table))
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Documents => write!(f, "documents"),
            Namespace::Models => write!(f, "models"),
            Namespace::Metrics => write!(f, "metrics"),
        }
    }
}

/// Formats a timestamp for storage.
pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Drops precision below what the store keeps.
pub fn truncate(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(chrono::Duration::milliseconds(1))
        .unwrap_or(ts)
}

/// Current time truncated to the stored precision.
pub fn now() -> DateTime<Utc> {
    truncate(Utc::now())
}

/// Reads a timestamp column.
pub fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Serializes an optional structured value to JSON text.
pub fn encode_json<T: Serialize>(value: Option<&T>) -> Result<Option<String>, DatabaseError> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(DatabaseError::from)
}

/// Reads an optional JSON text column.
pub fn json_at<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}
