//! Prediction repository: classification results and their history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::columns;
use super::validate::{self, SCORE_EPSILON};
use super::{row_exists, Database, DatabaseError};

const COLUMNS: &str = "id, document_id, model_name, model_version, predicted_class,
     confidence_score, all_scores, predicted_at";

/// Score per candidate class.
pub type ClassScores = BTreeMap<String, f64>;

/// A stored prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub id: i64,
    pub document_id: i64,
    pub model_name: String,
    pub model_version: String,
    pub predicted_class: String,
    pub confidence_score: f64,
    pub all_scores: ClassScores,
    pub predicted_at: DateTime<Utc>,
}

impl Prediction {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            model_name: row.get(2)?,
            model_version: row.get(3)?,
            predicted_class: row.get(4)?,
            confidence_score: row.get(5)?,
            all_scores: columns::json_at(row, 6)?.unwrap_or_default(),
            predicted_at: columns::timestamp_at(row, 7)?,
        })
    }
}

/// Input for [`record`].
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub document_id: i64,
    pub model_name: String,
    pub model_version: String,
    pub predicted_class: String,
    pub confidence_score: f64,
    pub all_scores: ClassScores,
    pub predicted_at: Option<DateTime<Utc>>,
}

impl NewPrediction {
    pub fn new(
        document_id: i64,
        model_name: impl Into<String>,
        model_version: impl Into<String>,
        predicted_class: impl Into<String>,
        confidence_score: f64,
        all_scores: ClassScores,
    ) -> Self {
        Self {
            document_id,
            model_name: model_name.into(),
            model_version: model_version.into(),
            predicted_class: predicted_class.into(),
            confidence_score,
            all_scores,
            predicted_at: None,
        }
    }

    pub fn predicted_at(mut self, ts: DateTime<Utc>) -> Self {
        self.predicted_at = Some(ts);
        self
    }

    fn validate(&self) -> Result<(), DatabaseError> {
        validate::non_blank("model_name", &self.model_name)?;
        validate::non_blank("model_version", &self.model_version)?;
        validate::non_blank("predicted_class", &self.predicted_class)?;
        validate::unit_interval("confidence_score", self.confidence_score)?;

        for (class, score) in &self.all_scores {
            if !score.is_finite() || !(0.0..=1.0).contains(score) {
                return Err(DatabaseError::validation(
                    "all_scores",
                    format!("score for '{}' must be within [0, 1], got {}", class, score),
                ));
            }
        }

        match self.all_scores.get(&self.predicted_class) {
            None => Err(DatabaseError::validation(
                "all_scores",
                format!("missing predicted class '{}'", self.predicted_class),
            )),
            Some(score) if (score - self.confidence_score).abs() > SCORE_EPSILON => {
                Err(DatabaseError::validation(
                    "all_scores",
                    format!(
                        "score {} for '{}' does not match confidence {}",
                        score, self.predicted_class, self.confidence_score
                    ),
                ))
            }
            Some(_) => Ok(()),
        }
    }
}

/// Records a prediction for an existing document.
pub fn record(db: &Database, input: &NewPrediction) -> Result<Prediction, DatabaseError> {
    input.validate()?;
    let predicted_at = input
        .predicted_at
        .map(columns::truncate)
        .unwrap_or_else(columns::now);
    let all_scores = columns::encode_json(Some(&input.all_scores))?;

    let id = db.with_tx(|tx| {
        if !row_exists(tx, "documents", input.document_id)? {
            return Err(DatabaseError::NotFound {
                entity: "document",
                id: input.document_id,
            });
        }
        tx.execute(
            "INSERT INTO predictions (document_id, model_name, model_version, predicted_class,
             confidence_score, all_scores, predicted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                input.document_id,
                input.model_name,
                input.model_version,
                input.predicted_class,
                input.confidence_score,
                all_scores,
                columns::encode_timestamp(&predicted_at),
            ],
        )?;
        Ok(tx.last_insert_rowid())
    })?;

    log::debug!(
        "Recorded prediction {} for document {}: {} ({}:{})",
        id,
        input.document_id,
        input.predicted_class,
        input.model_name,
        input.model_version
    );

    Ok(Prediction {
        id,
        document_id: input.document_id,
        model_name: input.model_name.clone(),
        model_version: input.model_version.clone(),
        predicted_class: input.predicted_class.clone(),
        confidence_score: input.confidence_score,
        all_scores: input.all_scores.clone(),
        predicted_at,
    })
}

/// Prediction history for a document, most recent first, at most `limit`
/// rows. Rows sharing a timestamp are ordered by descending id.
pub fn history(db: &Database, document_id: i64, limit: u64) -> Result<Vec<Prediction>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM predictions WHERE document_id = ?1
             ORDER BY predicted_at DESC, id DESC LIMIT ?2",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![document_id, limit as i64], Prediction::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Number of predictions per predicted class.
pub fn class_distribution(db: &Database) -> Result<BTreeMap<String, u64>, DatabaseError> {
    db.with_conn(class_distribution_in)
}

pub(crate) fn class_distribution_in(
    conn: &Connection,
) -> Result<BTreeMap<String, u64>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT predicted_class, COUNT(*) FROM predictions GROUP BY predicted_class",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}
