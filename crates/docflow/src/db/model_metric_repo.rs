//! Model metric repository: append-only offline evaluation snapshots.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::Serialize;

use super::columns::{self, Metadata};
use super::{validate, Database, DatabaseError};

const COLUMNS: &str = "id, model_name, model_version, accuracy, precision_score, recall_score,
     f1_score, dataset_size, training_time, trained_at, metadata";

/// Evaluation of one training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelMetric {
    pub id: i64,
    pub model_name: String,
    pub model_version: String,
    pub accuracy: Option<f64>,
    pub precision_score: Option<f64>,
    pub recall_score: Option<f64>,
    pub f1_score: Option<f64>,
    pub dataset_size: Option<i64>,
    /// Training wall time in seconds.
    pub training_time: Option<f64>,
    pub trained_at: DateTime<Utc>,
    pub metadata: Option<Metadata>,
}

impl ModelMetric {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            model_name: row.get(1)?,
            model_version: row.get(2)?,
            accuracy: row.get(3)?,
            precision_score: row.get(4)?,
            recall_score: row.get(5)?,
            f1_score: row.get(6)?,
            dataset_size: row.get(7)?,
            training_time: row.get(8)?,
            trained_at: columns::timestamp_at(row, 9)?,
            metadata: columns::json_at(row, 10)?,
        })
    }
}

/// Input for [`record`].
#[derive(Debug, Clone, Default)]
pub struct NewModelMetric {
    pub model_name: String,
    pub model_version: String,
    pub accuracy: Option<f64>,
    pub precision_score: Option<f64>,
    pub recall_score: Option<f64>,
    pub f1_score: Option<f64>,
    pub dataset_size: Option<i64>,
    pub training_time: Option<f64>,
    pub trained_at: Option<DateTime<Utc>>,
    pub metadata: Option<Metadata>,
}

impl NewModelMetric {
    pub fn new(model_name: impl Into<String>, model_version: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model_version: model_version.into(),
            ..Default::default()
        }
    }

    /// Sets accuracy, precision, recall and F1 in one go.
    pub fn scores(mut self, accuracy: f64, precision: f64, recall: f64, f1: f64) -> Self {
        self.accuracy = Some(accuracy);
        self.precision_score = Some(precision);
        self.recall_score = Some(recall);
        self.f1_score = Some(f1);
        self
    }

    pub fn dataset_size(mut self, size: i64) -> Self {
        self.dataset_size = Some(size);
        self
    }

    pub fn training_time(mut self, seconds: f64) -> Self {
        self.training_time = Some(seconds);
        self
    }

    pub fn trained_at(mut self, ts: DateTime<Utc>) -> Self {
        self.trained_at = Some(ts);
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn validate(&self) -> Result<(), DatabaseError> {
        validate::non_blank("model_name", &self.model_name)?;
        validate::non_blank("model_version", &self.model_version)?;
        for (field, value) in [
            ("accuracy", self.accuracy),
            ("precision_score", self.precision_score),
            ("recall_score", self.recall_score),
            ("f1_score", self.f1_score),
        ] {
            if let Some(value) = value {
                validate::unit_interval(field, value)?;
            }
        }
        if let Some(seconds) = self.training_time {
            validate::non_negative("training_time", seconds)?;
        }
        if matches!(self.dataset_size, Some(size) if size < 0) {
            return Err(DatabaseError::validation("dataset_size", "must not be negative"));
        }
        Ok(())
    }
}

/// Appends a model evaluation snapshot.
pub fn record(db: &Database, input: &NewModelMetric) -> Result<ModelMetric, DatabaseError> {
    input.validate()?;
    let trained_at = input
        .trained_at
        .map(columns::truncate)
        .unwrap_or_else(columns::now);
    let metadata = columns::encode_json(input.metadata.as_ref())?;

    let id = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO model_metrics (model_name, model_version, accuracy, precision_score,
             recall_score, f1_score, dataset_size, training_time, trained_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                input.model_name,
                input.model_version,
                input.accuracy,
                input.precision_score,
                input.recall_score,
                input.f1_score,
                input.dataset_size,
                input.training_time,
                columns::encode_timestamp(&trained_at),
                metadata,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })?;

    log::info!(
        "Recorded metrics for {}:{} (accuracy {:?})",
        input.model_name,
        input.model_version,
        input.accuracy
    );

    Ok(ModelMetric {
        id,
        model_name: input.model_name.clone(),
        model_version: input.model_version.clone(),
        accuracy: input.accuracy,
        precision_score: input.precision_score,
        recall_score: input.recall_score,
        f1_score: input.f1_score,
        dataset_size: input.dataset_size,
        training_time: input.training_time,
        trained_at,
        metadata: input.metadata.clone(),
    })
}

/// Evaluation history for a model, most recent first.
pub fn history(db: &Database, model_name: &str, limit: u64) -> Result<Vec<ModelMetric>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM model_metrics WHERE model_name = ?1
             ORDER BY trained_at DESC, id DESC LIMIT ?2",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![model_name, limit as i64], ModelMetric::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// The most recent evaluation for a model.
pub fn latest(db: &Database, model_name: &str) -> Result<Option<ModelMetric>, DatabaseError> {
    Ok(history(db, model_name, 1)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_record_and_latest() {
        let db = test_db();
        let mut meta = Metadata::new();
        meta.insert("epochs".into(), serde_json::json!(10));
        let metric = record(
            &db,
            &NewModelMetric::new("document_classifier", "v1")
                .scores(0.91, 0.9, 0.89, 0.895)
                .dataset_size(1200)
                .training_time(340.5)
                .metadata(meta),
        )
        .unwrap();

        let found = latest(&db, "document_classifier").unwrap().unwrap();
        assert_eq!(found, metric);
        assert!(latest(&db, "other_model").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_versions_are_kept() {
        let db = test_db();
        let input = NewModelMetric::new("document_classifier", "v1").scores(0.8, 0.8, 0.8, 0.8);
        record(&db, &input).unwrap();
        record(&db, &input).unwrap();
        assert_eq!(history(&db, "document_classifier", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_history_order() {
        let db = test_db();
        let base = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        for (i, version) in ["v1", "v2", "v3"].iter().enumerate() {
            record(
                &db,
                &NewModelMetric::new("document_classifier", *version)
                    .trained_at(base + chrono::Duration::days(i as i64)),
            )
            .unwrap();
        }
        let versions: Vec<_> = history(&db, "document_classifier", 2)
            .unwrap()
            .into_iter()
            .map(|m| m.model_version)
            .collect();
        assert_eq!(versions, vec!["v3", "v2"]);
    }

    #[test]
    fn test_rejects_invalid_scores() {
        let db = test_db();
        let err = record(
            &db,
            &NewModelMetric::new("document_classifier", "v1").scores(1.2, 0.5, 0.5, 0.5),
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::Validation { field: "accuracy", .. }));

        let err = record(&db, &NewModelMetric::new("", "v1")).unwrap_err();
        assert!(matches!(err, DatabaseError::Validation { field: "model_name", .. }));
    }
}
