//! Document repository: lifecycle records for uploaded files.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::columns::{self, Metadata};
use super::{row_exists, validate, Database, DatabaseError};

const COLUMNS: &str = "id, filename, original_path, storage_path, file_size, mime_type,
     upload_timestamp, status, metadata";

/// Lifecycle state of a document as it moves through the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Uploaded,
    OcrPending,
    OcrCompleted,
    PredictionPending,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 6] = [
        DocumentStatus::Uploaded,
        DocumentStatus::OcrPending,
        DocumentStatus::OcrCompleted,
        DocumentStatus::PredictionPending,
        DocumentStatus::Completed,
        DocumentStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::OcrPending => "ocr_pending",
            DocumentStatus::OcrCompleted => "ocr_completed",
            DocumentStatus::PredictionPending => "prediction_pending",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    /// Whether a document in `self` may move to `next`.
    ///
    /// Writing the current state again is always accepted.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;

        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Uploaded, OcrPending | OcrCompleted | Failed)
                | (OcrPending, OcrCompleted | Failed)
                | (OcrCompleted, PredictionPending | Completed | OcrPending | Failed)
                | (PredictionPending, Completed | Failed)
                | (Completed, OcrPending | PredictionPending)
                | (Failed, OcrPending)
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DatabaseError::validation("status", format!("unknown status '{}'", s)))
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    pub original_path: Option<String>,
    pub storage_path: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub upload_timestamp: DateTime<Utc>,
    pub status: DocumentStatus,
    pub metadata: Option<Metadata>,
}

impl Document {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let raw_status: String = row.get(7)?;
        let status: DocumentStatus = raw_status.parse().map_err(|e: DatabaseError| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            original_path: row.get(2)?,
            storage_path: row.get(3)?,
            file_size: row.get(4)?,
            mime_type: row.get(5)?,
            upload_timestamp: columns::timestamp_at(row, 6)?,
            status,
            metadata: columns::json_at(row, 8)?,
        })
    }
}

/// Input for [`create`].
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub filename: String,
    pub storage_path: String,
    pub original_path: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub metadata: Option<Metadata>,
    /// Explicit upload time for restore/migration paths; `None` means now.
    pub upload_timestamp: Option<DateTime<Utc>>,
}

impl NewDocument {
    pub fn new(filename: impl Into<String>, storage_path: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            storage_path: storage_path.into(),
            ..Default::default()
        }
    }

    pub fn original_path(mut self, path: impl Into<String>) -> Self {
        self.original_path = Some(path.into());
        self
    }

    pub fn file_size(mut self, size: i64) -> Self {
        self.file_size = Some(size);
        self
    }

    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn uploaded_at(mut self, ts: DateTime<Utc>) -> Self {
        self.upload_timestamp = Some(ts);
        self
    }

    fn validate(&self) -> Result<(), DatabaseError> {
        validate::non_blank("storage_path", &self.storage_path)?;
        validate::non_blank("filename", &self.filename)?;
        if let Some(size) = self.file_size {
            if size < 0 {
                return Err(DatabaseError::validation(
                    "file_size",
                    format!("must not be negative, got {}", size),
                ));
            }
        }
        Ok(())
    }
}

/// Query filter parameters for document listing.
#[derive(Debug, Default, Clone)]
pub struct DocumentFilter {
    pub status: Option<DocumentStatus>,
    /// Only documents uploaded strictly before this instant.
    pub uploaded_before: Option<DateTime<Utc>>,
    /// Only documents uploaded at or after this instant.
    pub uploaded_after: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Rows removed by [`delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub document_id: i64,
    pub ocr_results_removed: u64,
    pub predictions_removed: u64,
}

/// Inserts a new document with status `uploaded`.
pub fn create(db: &Database, doc: &NewDocument) -> Result<Document, DatabaseError> {
    doc.validate()?;
    let upload_timestamp = doc
        .upload_timestamp
        .map(columns::truncate)
        .unwrap_or_else(columns::now);
    let metadata = columns::encode_json(doc.metadata.as_ref())?;

    let id = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO documents (filename, original_path, storage_path, file_size, mime_type,
             upload_timestamp, status, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                doc.filename,
                doc.original_path,
                doc.storage_path,
                doc.file_size,
                doc.mime_type,
                columns::encode_timestamp(&upload_timestamp),
                DocumentStatus::Uploaded.as_str(),
                metadata,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })?;

    log::debug!("Created document {} ({})", id, doc.filename);

    Ok(Document {
        id,
        filename: doc.filename.clone(),
        original_path: doc.original_path.clone(),
        storage_path: doc.storage_path.clone(),
        file_size: doc.file_size,
        mime_type: doc.mime_type.clone(),
        upload_timestamp,
        status: DocumentStatus::Uploaded,
        metadata: doc.metadata.clone(),
    })
}

pub(crate) fn find_in(conn: &Connection, id: i64) -> Result<Option<Document>, DatabaseError> {
    let doc = conn
        .query_row(
            &format!("SELECT {} FROM documents WHERE id = ?1", COLUMNS),
            params![id],
            Document::from_row,
        )
        .optional()?;
    Ok(doc)
}

/// Finds a document by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Document>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, id))
}

/// Moves a document to `status`, rejecting transitions the lifecycle
/// does not allow.
pub fn update_status(
    db: &Database,
    id: i64,
    status: DocumentStatus,
) -> Result<Document, DatabaseError> {
    db.with_tx(|tx| {
        let mut doc = find_in(tx, id)?.ok_or(DatabaseError::NotFound {
            entity: "document",
            id,
        })?;

        if !doc.status.can_transition_to(status) {
            return Err(DatabaseError::validation(
                "status",
                format!("illegal transition {} -> {}", doc.status, status),
            ));
        }

        if doc.status != status {
            tx.execute(
                "UPDATE documents SET status = ?2 WHERE id = ?1",
                params![id, status.as_str()],
            )?;
            log::debug!("Document {} status {} -> {}", id, doc.status, status);
            doc.status = status;
        }
        Ok(doc)
    })
}

/// Queries documents with filters, returning (rows, total_count).
///
/// Rows come oldest first so pollers work through a backlog in upload order.
pub fn query(db: &Database, filter: &DocumentFilter) -> Result<(Vec<Document>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.as_str()));
        }
        if let Some(ref before) = filter.uploaded_before {
            conditions.push(format!("upload_timestamp < ?{}", param_values.len() + 1));
            param_values.push(Box::new(columns::encode_timestamp(before)));
        }
        if let Some(ref after) = filter.uploaded_after {
            conditions.push(format!("upload_timestamp >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(columns::encode_timestamp(after)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        // Count total matching rows.
        let count_sql = format!("SELECT COUNT(*) FROM documents {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        // Fetch paginated results.
        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT {} FROM documents {} ORDER BY upload_timestamp ASC, id ASC LIMIT ?{} OFFSET ?{}",
            COLUMNS,
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<Document> = stmt
            .query_map(params_ref.as_slice(), Document::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Counts documents with the given status.
pub fn count_by_status(db: &Database, status: DocumentStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Deletes a document together with its OCR results and predictions.
pub fn delete(db: &Database, id: i64) -> Result<CascadeReport, DatabaseError> {
    let report = db.with_tx(|tx| {
        if !row_exists(tx, "documents", id)? {
            return Err(DatabaseError::NotFound {
                entity: "document",
                id,
            });
        }

        let ocr_results_removed: u64 = tx.query_row(
            "SELECT COUNT(*) FROM ocr_results WHERE document_id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        let predictions_removed: u64 = tx.query_row(
            "SELECT COUNT(*) FROM predictions WHERE document_id = ?1",
            params![id],
            |r| r.get(0),
        )?;

        // ON DELETE CASCADE removes the dependent rows.
        tx.execute("DELETE FROM documents WHERE id = ?1", params![id])?;

        Ok(CascadeReport {
            document_id: id,
            ocr_results_removed,
            predictions_removed,
        })
    })?;

    log::info!(
        "Deleted document {} ({} OCR results, {} predictions)",
        id,
        report.ocr_results_removed,
        report.predictions_removed
    );
    Ok(report)
}
