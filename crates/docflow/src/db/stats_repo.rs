//! Statistics repository: read-only aggregates across all tables for
//! dashboards and alerting.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use super::columns;
use super::prediction_repo;
use super::{Database, DatabaseError};

/// OCR runs slower than this many seconds are reported as anomalies.
pub const LONG_OCR_SECONDS: f64 = 30.0;

/// Upper bound on histogram resolution accepted by [`confidence_distribution`].
pub const MAX_HISTOGRAM_BINS: usize = 1_000;

/// Document counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentStats {
    pub total: u64,
    pub recent: u64,
}

/// OCR counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrStats {
    pub total_processed: u64,
    pub avg_confidence: f64,
    pub avg_processing_time: f64,
}

/// Prediction counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionStats {
    pub total: u64,
    pub avg_confidence: f64,
    pub class_distribution: BTreeMap<String, u64>,
}

/// System-wide summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    pub since: DateTime<Utc>,
    pub documents: DocumentStats,
    pub ocr: OcrStats,
    pub predictions: PredictionStats,
}

/// Returns a summary of documents, OCR and predictions. `recent` counts
/// documents uploaded at or after `since`.
pub fn system_stats(db: &Database, since: DateTime<Utc>) -> Result<SystemStats, DatabaseError> {
    let since_raw = columns::encode_timestamp(&since);
    db.with_conn(|conn| {
        // One read snapshot so the totals and the distribution agree.
        let snapshot = conn.unchecked_transaction()?;

        let documents = snapshot.query_row(
            "SELECT COUNT(*), COALESCE(SUM(upload_timestamp >= ?1), 0) FROM documents",
            params![since_raw],
            |r| {
                Ok(DocumentStats {
                    total: r.get(0)?,
                    recent: r.get(1)?,
                })
            },
        )?;
        let ocr = snapshot.query_row(
            "SELECT COUNT(*), COALESCE(AVG(confidence_score), 0), COALESCE(AVG(processing_time), 0)
             FROM ocr_results",
            [],
            |r| {
                Ok(OcrStats {
                    total_processed: r.get(0)?,
                    avg_confidence: r.get(1)?,
                    avg_processing_time: r.get(2)?,
                })
            },
        )?;
        let (total, avg_confidence): (u64, f64) = snapshot.query_row(
            "SELECT COUNT(*), COALESCE(AVG(confidence_score), 0) FROM predictions",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let class_distribution = prediction_repo::class_distribution_in(&snapshot)?;
        snapshot.finish()?;

        Ok(SystemStats {
            since,
            documents,
            ocr,
            predictions: PredictionStats {
                total,
                avg_confidence,
                class_distribution,
            },
        })
    })
}

/// Count for a single day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCount {
    pub date: String,
    pub count: u64,
}

/// OCR count and mean processing time for a single day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyOcr {
    pub date: String,
    pub count: u64,
    pub avg_time: f64,
}

/// Per-day processing throughput.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Throughput {
    pub documents_by_day: Vec<DailyCount>,
    pub ocr_by_day: Vec<DailyOcr>,
    pub predictions_by_day: Vec<DailyCount>,
}

fn daily_counts(
    conn: &rusqlite::Connection,
    table: &str,
    column: &str,
    since: &str,
) -> Result<Vec<DailyCount>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT substr({col}, 1, 10) AS day, COUNT(*) FROM {table}
         WHERE {col} >= ?1 GROUP BY day ORDER BY day ASC",
        col = column,
        table = table
    ))?;
    let rows = stmt
        .query_map(params![since], |r| {
            Ok(DailyCount {
                date: r.get(0)?,
                count: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Returns per-day counts of uploads, OCR runs and predictions since `since`.
pub fn throughput(db: &Database, since: DateTime<Utc>) -> Result<Throughput, DatabaseError> {
    let since_raw = columns::encode_timestamp(&since);
    db.with_conn(|conn| {
        let documents_by_day = daily_counts(conn, "documents", "upload_timestamp", &since_raw)?;
        let predictions_by_day = daily_counts(conn, "predictions", "predicted_at", &since_raw)?;

        let mut stmt = conn.prepare(
            "SELECT substr(processed_at, 1, 10) AS day, COUNT(*), AVG(processing_time)
             FROM ocr_results WHERE processed_at >= ?1 GROUP BY day ORDER BY day ASC",
        )?;
        let ocr_by_day = stmt
            .query_map(params![since_raw], |r| {
                Ok(DailyOcr {
                    date: r.get(0)?,
                    count: r.get(1)?,
                    avg_time: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Throughput {
            documents_by_day,
            ocr_by_day,
            predictions_by_day,
        })
    })
}

/// Which confidence scores to summarize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    Ocr,
    Prediction,
}

impl ConfidenceSource {
    fn table(self) -> &'static str {
        match self {
            ConfidenceSource::Ocr => "ocr_results",
            ConfidenceSource::Prediction => "predictions",
        }
    }
}

/// Histogram of confidence scores over `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceHistogram {
    /// `bins + 1` edges.
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

impl ConfidenceHistogram {
    fn from_scores(mut scores: Vec<f64>, bins: usize) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        scores.sort_by(|a, b| a.total_cmp(b));

        let edges: Vec<f64> = (0..=bins).map(|i| i as f64 / bins as f64).collect();
        let mut counts = vec![0u64; bins];
        for &score in &scores {
            // A score on an edge belongs to the bin that edge opens; the
            // last bin is closed on the right so 1.0 lands in it.
            let idx = edges
                .partition_point(|edge| *edge <= score)
                .saturating_sub(1)
                .min(bins - 1);
            counts[idx] += 1;
        }

        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let mid = scores.len() / 2;
        let median = if scores.len() % 2 == 0 {
            (scores[mid - 1] + scores[mid]) / 2.0
        } else {
            scores[mid]
        };
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            edges,
            counts,
            mean,
            median,
            std_dev: variance.sqrt(),
        })
    }
}

/// Distribution of confidence scores for OCR results or predictions.
///
/// Returns `None` when there are no scores yet.
pub fn confidence_distribution(
    db: &Database,
    source: ConfidenceSource,
    bins: usize,
) -> Result<Option<ConfidenceHistogram>, DatabaseError> {
    if bins == 0 || bins > MAX_HISTOGRAM_BINS {
        return Err(DatabaseError::validation(
            "bins",
            format!("must be between 1 and {}, got {}", MAX_HISTOGRAM_BINS, bins),
        ));
    }
    let scores = db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT confidence_score FROM {} WHERE confidence_score IS NOT NULL",
            source.table()
        ))?;
        let scores = stmt
            .query_map([], |r| r.get::<_, f64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scores)
    })?;
    Ok(ConfidenceHistogram::from_scores(scores, bins))
}

/// Kind of anomaly detected in stored results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    LowOcrConfidence,
    LowPredictionConfidence,
    LongOcrProcessing,
}

/// A group of suspicious rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub count: u64,
    pub threshold: f64,
    pub description: String,
}

/// Flags low-confidence OCR results and predictions (below `threshold`)
/// and OCR runs slower than [`LONG_OCR_SECONDS`].
pub fn detect_anomalies(db: &Database, threshold: f64) -> Result<Vec<Anomaly>, DatabaseError> {
    super::validate::unit_interval("threshold", threshold)?;
    db.with_conn(|conn| {
        let count = |sql: &str, bound: f64| -> Result<u64, DatabaseError> {
            Ok(conn.query_row(sql, params![bound], |r| r.get(0))?)
        };

        let mut anomalies = Vec::new();

        let low_ocr = count(
            "SELECT COUNT(*) FROM ocr_results WHERE confidence_score < ?1",
            threshold,
        )?;
        if low_ocr > 0 {
            anomalies.push(Anomaly {
                kind: AnomalyKind::LowOcrConfidence,
                count: low_ocr,
                threshold,
                description: format!("{} OCR results below confidence {}", low_ocr, threshold),
            });
        }

        let low_predictions = count(
            "SELECT COUNT(*) FROM predictions WHERE confidence_score < ?1",
            threshold,
        )?;
        if low_predictions > 0 {
            anomalies.push(Anomaly {
                kind: AnomalyKind::LowPredictionConfidence,
                count: low_predictions,
                threshold,
                description: format!(
                    "{} predictions below confidence {}",
                    low_predictions, threshold
                ),
            });
        }

        let long_ocr = count(
            "SELECT COUNT(*) FROM ocr_results WHERE processing_time > ?1",
            LONG_OCR_SECONDS,
        )?;
        if long_ocr > 0 {
            anomalies.push(Anomaly {
                kind: AnomalyKind::LongOcrProcessing,
                count: long_ocr,
                threshold: LONG_OCR_SECONDS,
                description: format!(
                    "{} OCR runs took longer than {}s",
                    long_ocr, LONG_OCR_SECONDS
                ),
            });
        }

        Ok(anomalies)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::document_repo::{self, NewDocument};
    use crate::db::ocr_repo::{self, NewOcrResult};
    use crate::db::prediction_repo::NewPrediction;
    use chrono::TimeZone;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, d, 10, 0, 0).unwrap()
    }

    fn seed(db: &Database) -> i64 {
        let doc = document_repo::create(db, &NewDocument::new("a.png", "raw/a.png").uploaded_at(day(1)))
            .unwrap();
        document_repo::create(db, &NewDocument::new("b.png", "raw/b.png").uploaded_at(day(3))).unwrap();

        ocr_repo::record(
            db,
            &NewOcrResult::new(doc.id, "text", "eng", 0.4, 45.0, "tesseract").processed_at(day(1)),
        )
        .unwrap();
        ocr_repo::record(
            db,
            &NewOcrResult::new(doc.id, "text", "eng", 0.8, 1.0, "easyocr").processed_at(day(3)),
        )
        .unwrap();

        let scores = [("invoice".to_string(), 0.9), ("receipt".to_string(), 0.1)]
            .into_iter()
            .collect();
        prediction_repo::record(
            db,
            &NewPrediction::new(doc.id, "clf", "v1", "invoice", 0.9, scores).predicted_at(day(3)),
        )
        .unwrap();
        doc.id
    }

    #[test]
    fn test_system_stats() {
        let db = test_db();
        seed(&db);

        let stats = system_stats(&db, day(2)).unwrap();
        assert_eq!(stats.documents.total, 2);
        assert_eq!(stats.documents.recent, 1);
        assert_eq!(stats.ocr.total_processed, 2);
        assert!((stats.ocr.avg_confidence - 0.6).abs() < 1e-9);
        assert!((stats.ocr.avg_processing_time - 23.0).abs() < 1e-9);
        assert_eq!(stats.predictions.total, 1);
        assert_eq!(stats.predictions.class_distribution.get("invoice"), Some(&1));
    }

    #[test]
    fn test_system_stats_empty() {
        let db = test_db();
        let stats = system_stats(&db, day(1)).unwrap();
        assert_eq!(stats.documents.total, 0);
        assert_eq!(stats.ocr.avg_confidence, 0.0);
        assert!(stats.predictions.class_distribution.is_empty());
    }

    #[test]
    fn test_throughput() {
        let db = test_db();
        seed(&db);

        let t = throughput(&db, day(1)).unwrap();
        let dates: Vec<_> = t.documents_by_day.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(dates, vec!["2026-06-01", "2026-06-03"]);
        assert_eq!(t.ocr_by_day.len(), 2);
        assert_eq!(t.ocr_by_day[0].avg_time, 45.0);
        assert_eq!(t.predictions_by_day, vec![DailyCount { date: "2026-06-03".into(), count: 1 }]);

        let later = throughput(&db, day(2)).unwrap();
        assert_eq!(later.documents_by_day.len(), 1);
    }

    #[test]
    fn test_confidence_distribution() {
        let db = test_db();
        seed(&db);

        let hist = confidence_distribution(&db, ConfidenceSource::Ocr, 10)
            .unwrap()
            .unwrap();
        assert_eq!(hist.edges.len(), 11);
        assert_eq!(hist.counts.iter().sum::<u64>(), 2);
        assert_eq!(hist.counts[4], 1);
        assert_eq!(hist.counts[8], 1);
        assert!((hist.mean - 0.6).abs() < 1e-9);
        assert!((hist.median - 0.6).abs() < 1e-9);
        assert!((hist.std_dev - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_distribution_edges() {
        let hist = ConfidenceHistogram::from_scores(vec![1.0, 0.0, 0.5], 2).unwrap();
        assert_eq!(hist.counts, vec![1, 2]);
        assert_eq!(hist.median, 0.5);
        assert!(ConfidenceHistogram::from_scores(Vec::new(), 4).is_none());

        let db = test_db();
        assert!(confidence_distribution(&db, ConfidenceSource::Prediction, 0).is_err());
        assert!(confidence_distribution(&db, ConfidenceSource::Prediction, 5)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_scores_on_edges_open_their_bin() {
        let hist = ConfidenceHistogram::from_scores(vec![0.57, 0.29], 100).unwrap();
        let filled: Vec<usize> = hist
            .counts
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(filled, vec![29, 57]);

        let hist = ConfidenceHistogram::from_scores(vec![0.1, 0.3, 0.7, 0.9], 10).unwrap();
        assert_eq!(hist.counts, vec![0, 1, 0, 1, 0, 0, 0, 1, 0, 1]);
    }

    #[test]
    fn test_confidence_distribution_bins_bounded() {
        let db = test_db();
        seed(&db);

        for bins in [MAX_HISTOGRAM_BINS + 1, usize::MAX] {
            let err = confidence_distribution(&db, ConfidenceSource::Ocr, bins).unwrap_err();
            assert!(matches!(err, DatabaseError::Validation { field: "bins", .. }));
        }
        let hist = confidence_distribution(&db, ConfidenceSource::Ocr, MAX_HISTOGRAM_BINS)
            .unwrap()
            .unwrap();
        assert_eq!(hist.counts.len(), MAX_HISTOGRAM_BINS);
    }

    #[test]
    fn test_system_stats_distribution_matches_total() {
        let db = test_db();
        let doc_id = seed(&db);
        let scores = [("receipt".to_string(), 0.7), ("invoice".to_string(), 0.3)]
            .into_iter()
            .collect();
        prediction_repo::record(
            &db,
            &NewPrediction::new(doc_id, "clf", "v2", "receipt", 0.7, scores),
        )
        .unwrap();

        let stats = system_stats(&db, day(1)).unwrap();
        assert_eq!(stats.predictions.total, 2);
        assert_eq!(
            stats.predictions.class_distribution.values().sum::<u64>(),
            stats.predictions.total
        );
    }

    #[test]
    fn test_detect_anomalies() {
        let db = test_db();
        seed(&db);

        let anomalies = detect_anomalies(&db, 0.5).unwrap();
        let kinds: Vec<_> = anomalies.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AnomalyKind::LowOcrConfidence, AnomalyKind::LongOcrProcessing]
        );
        assert!(anomalies.iter().all(|a| a.count == 1));

        assert!(detect_anomalies(&db, 0.95)
            .unwrap()
            .iter()
            .any(|a| a.kind == AnomalyKind::LowPredictionConfidence));
    }
}
