//! OCR result repository: one row per OCR pass over a document.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

use super::columns;
use super::{row_exists, validate, Database, DatabaseError};

const COLUMNS: &str = "id, document_id, extracted_text, language, confidence_score,
     processing_time, processed_at, ocr_engine";

/// A stored OCR result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrResult {
    pub id: i64,
    pub document_id: i64,
    pub extracted_text: String,
    pub language: String,
    pub confidence_score: f64,
    /// Engine processing time in seconds.
    pub processing_time: f64,
    pub processed_at: DateTime<Utc>,
    pub ocr_engine: String,
}

impl OcrResult {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            extracted_text: row.get(2)?,
            language: row.get(3)?,
            confidence_score: row.get(4)?,
            processing_time: row.get(5)?,
            processed_at: columns::timestamp_at(row, 6)?,
            ocr_engine: row.get(7)?,
        })
    }
}

/// Input for [`record`].
#[derive(Debug, Clone)]
pub struct NewOcrResult {
    pub document_id: i64,
    pub extracted_text: String,
    pub language: String,
    pub confidence_score: f64,
    pub processing_time: f64,
    pub ocr_engine: String,
    pub processed_at: Option<DateTime<Utc>>,
}

impl NewOcrResult {
    pub fn new(
        document_id: i64,
        extracted_text: impl Into<String>,
        language: impl Into<String>,
        confidence_score: f64,
        processing_time: f64,
        ocr_engine: impl Into<String>,
    ) -> Self {
        Self {
            document_id,
            extracted_text: extracted_text.into(),
            language: language.into(),
            confidence_score,
            processing_time,
            ocr_engine: ocr_engine.into(),
            processed_at: None,
        }
    }

    pub fn processed_at(mut self, ts: DateTime<Utc>) -> Self {
        self.processed_at = Some(ts);
        self
    }

    fn validate(&self) -> Result<(), DatabaseError> {
        validate::non_blank("language", &self.language)?;
        validate::non_blank("ocr_engine", &self.ocr_engine)?;
        validate::unit_interval("confidence_score", self.confidence_score)?;
        validate::non_negative("processing_time", self.processing_time)
    }
}

/// Records an OCR pass. Every call adds a row; results are never merged.
pub fn record(db: &Database, input: &NewOcrResult) -> Result<OcrResult, DatabaseError> {
    input.validate()?;
    let processed_at = input
        .processed_at
        .map(columns::truncate)
        .unwrap_or_else(columns::now);

    let id = db.with_tx(|tx| {
        if !row_exists(tx, "documents", input.document_id)? {
            return Err(DatabaseError::NotFound {
                entity: "document",
                id: input.document_id,
            });
        }
        tx.execute(
            "INSERT INTO ocr_results (document_id, extracted_text, language, confidence_score,
             processing_time, processed_at, ocr_engine)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                input.document_id,
                input.extracted_text,
                input.language,
                input.confidence_score,
                input.processing_time,
                columns::encode_timestamp(&processed_at),
                input.ocr_engine,
            ],
        )?;
        Ok(tx.last_insert_rowid())
    })?;

    log::debug!(
        "Recorded OCR result {} for document {} ({}, confidence {:.2})",
        id,
        input.document_id,
        input.ocr_engine,
        input.confidence_score
    );

    Ok(OcrResult {
        id,
        document_id: input.document_id,
        extracted_text: input.extracted_text.clone(),
        language: input.language.clone(),
        confidence_score: input.confidence_score,
        processing_time: input.processing_time,
        processed_at,
        ocr_engine: input.ocr_engine.clone(),
    })
}

/// Finds an OCR result by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<OcrResult>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT {} FROM ocr_results WHERE id = ?1", COLUMNS))?;
        let mut rows = stmt.query_map(params![id], OcrResult::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    })
}

/// All OCR results for a document, most recent first.
pub fn find_by_document(db: &Database, document_id: i64) -> Result<Vec<OcrResult>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM ocr_results WHERE document_id = ?1
             ORDER BY processed_at DESC, id DESC",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![document_id], OcrResult::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// The most recent OCR result for a document.
pub fn latest_for_document(
    db: &Database,
    document_id: i64,
) -> Result<Option<OcrResult>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM ocr_results WHERE document_id = ?1
             ORDER BY processed_at DESC, id DESC LIMIT 1",
            COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![document_id], OcrResult::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    })
}

/// OCR results with non-empty text at or above `min_confidence`, oldest
/// first. Used to assemble training corpora.
pub fn find_confident(db: &Database, min_confidence: f64) -> Result<Vec<OcrResult>, DatabaseError> {
    validate::unit_interval("min_confidence", min_confidence)?;
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM ocr_results
             WHERE confidence_score >= ?1 AND length(trim(extracted_text)) > 0
             ORDER BY processed_at ASC, id ASC",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![min_confidence], OcrResult::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
