//! Narrow per-entity interfaces over the store.
//!
//! Each collaborating service depends only on the traits it needs:
//!
//! | service    | traits |
//! |------------|--------|
//! | ingestion  | [`DocumentRepository`] |
//! | OCR        | [`DocumentRepository`], [`OcrRepository`] |
//! | training   | [`OcrRepository`], [`ModelMetricRepository`] |
//! | inference  | [`PredictionRepository`], [`DocumentRepository`] |
//! | monitoring | [`PerformanceRepository`], [`StatsRepository`] |
//!
//! [`Database`] implements all of them.

use chrono::{DateTime, Utc};

use crate::db::document_repo::{
    self, CascadeReport, Document, DocumentFilter, DocumentStatus, NewDocument,
};
use crate::db::model_metric_repo::{self, ModelMetric, NewModelMetric};
use crate::db::ocr_repo::{self, NewOcrResult, OcrResult};
use crate::db::performance_repo::{
    self, PerformanceFilter, PerformanceMetric, PerformanceSample, ServiceStats,
};
use crate::db::prediction_repo::{self, NewPrediction, Prediction};
use crate::db::stats_repo::{
    self, Anomaly, ConfidenceHistogram, ConfidenceSource, SystemStats, Throughput,
};
use crate::db::{Database, DatabaseError};

pub trait DocumentRepository: Send + Sync {
    fn create_document(&self, doc: &NewDocument) -> Result<Document, DatabaseError>;
    fn find_document(&self, id: i64) -> Result<Option<Document>, DatabaseError>;
    fn update_document_status(
        &self,
        id: i64,
        status: DocumentStatus,
    ) -> Result<Document, DatabaseError>;
    fn query_documents(&self, filter: &DocumentFilter)
        -> Result<(Vec<Document>, u64), DatabaseError>;
    fn count_documents_by_status(&self, status: DocumentStatus) -> Result<u64, DatabaseError>;
    /// Removes the document and, atomically, its OCR results and predictions.
    fn delete_document(&self, id: i64) -> Result<CascadeReport, DatabaseError>;
}

pub trait OcrRepository: Send + Sync {
    fn record_ocr_result(&self, result: &NewOcrResult) -> Result<OcrResult, DatabaseError>;
    fn ocr_results_for_document(&self, document_id: i64) -> Result<Vec<OcrResult>, DatabaseError>;
    fn latest_ocr_result(&self, document_id: i64) -> Result<Option<OcrResult>, DatabaseError>;
    fn ocr_results_above_confidence(&self, min: f64) -> Result<Vec<OcrResult>, DatabaseError>;
}

pub trait PredictionRepository: Send + Sync {
    fn record_prediction(&self, prediction: &NewPrediction) -> Result<Prediction, DatabaseError>;
    /// Most recent first, at most `limit` rows.
    fn prediction_history(
        &self,
        document_id: i64,
        limit: u64,
    ) -> Result<Vec<Prediction>, DatabaseError>;
}

pub trait ModelMetricRepository: Send + Sync {
    fn record_model_metric(&self, metric: &NewModelMetric) -> Result<ModelMetric, DatabaseError>;
    fn model_metric_history(
        &self,
        model_name: &str,
        limit: u64,
    ) -> Result<Vec<ModelMetric>, DatabaseError>;
    fn latest_model_metric(&self, model_name: &str) -> Result<Option<ModelMetric>, DatabaseError>;
}

pub trait PerformanceRepository: Send + Sync {
    fn record_performance_sample(
        &self,
        sample: &PerformanceSample,
    ) -> Result<PerformanceMetric, DatabaseError>;
    fn record_performance_samples(&self, samples: &[PerformanceSample])
        -> Result<usize, DatabaseError>;
    fn query_performance_samples(
        &self,
        filter: &PerformanceFilter,
    ) -> Result<Vec<PerformanceMetric>, DatabaseError>;
    fn service_stats(
        &self,
        service_name: &str,
        since: DateTime<Utc>,
    ) -> Result<ServiceStats, DatabaseError>;
    /// Deletes samples older than `cutoff`, returning how many were removed.
    fn prune_performance_samples(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError>;
}

pub trait StatsRepository: Send + Sync {
    fn system_stats(&self, since: DateTime<Utc>) -> Result<SystemStats, DatabaseError>;
    fn throughput(&self, since: DateTime<Utc>) -> Result<Throughput, DatabaseError>;
    fn confidence_distribution(
        &self,
        source: ConfidenceSource,
        bins: usize,
    ) -> Result<Option<ConfidenceHistogram>, DatabaseError>;
    fn detect_anomalies(&self, threshold: f64) -> Result<Vec<Anomaly>, DatabaseError>;
}

impl DocumentRepository for Database {
    fn create_document(&self, doc: &NewDocument) -> Result<Document, DatabaseError> {
        document_repo::create(self, doc)
    }

    fn find_document(&self, id: i64) -> Result<Option<Document>, DatabaseError> {
        document_repo::find_by_id(self, id)
    }

    fn update_document_status(
        &self,
        id: i64,
        status: DocumentStatus,
    ) -> Result<Document, DatabaseError> {
        document_repo::update_status(self, id, status)
    }

    fn query_documents(
        &self,
        filter: &DocumentFilter,
    ) -> Result<(Vec<Document>, u64), DatabaseError> {
        document_repo::query(self, filter)
    }

    fn count_documents_by_status(&self, status: DocumentStatus) -> Result<u64, DatabaseError> {
        document_repo::count_by_status(self, status)
    }

    fn delete_document(&self, id: i64) -> Result<CascadeReport, DatabaseError> {
        document_repo::delete(self, id)
    }
}

impl OcrRepository for Database {
    fn record_ocr_result(&self, result: &NewOcrResult) -> Result<OcrResult, DatabaseError> {
        ocr_repo::record(self, result)
    }

    fn ocr_results_for_document(&self, document_id: i64) -> Result<Vec<OcrResult>, DatabaseError> {
        ocr_repo::find_by_document(self, document_id)
    }

    fn latest_ocr_result(&self, document_id: i64) -> Result<Option<OcrResult>, DatabaseError> {
        ocr_repo::latest_for_document(self, document_id)
    }

    fn ocr_results_above_confidence(&self, min: f64) -> Result<Vec<OcrResult>, DatabaseError> {
        ocr_repo::find_confident(self, min)
    }
}

impl PredictionRepository for Database {
    fn record_prediction(&self, prediction: &NewPrediction) -> Result<Prediction, DatabaseError> {
        prediction_repo::record(self, prediction)
    }

    fn prediction_history(
        &self,
        document_id: i64,
        limit: u64,
    ) -> Result<Vec<Prediction>, DatabaseError> {
        prediction_repo::history(self, document_id, limit)
    }
}

impl ModelMetricRepository for Database {
    fn record_model_metric(&self, metric: &NewModelMetric) -> Result<ModelMetric, DatabaseError> {
        model_metric_repo::record(self, metric)
    }

    fn model_metric_history(
        &self,
        model_name: &str,
        limit: u64,
    ) -> Result<Vec<ModelMetric>, DatabaseError> {
        model_metric_repo::history(self, model_name, limit)
    }

    fn latest_model_metric(&self, model_name: &str) -> Result<Option<ModelMetric>, DatabaseError> {
        model_metric_repo::latest(self, model_name)
    }
}

impl PerformanceRepository for Database {
    fn record_performance_sample(
        &self,
        sample: &PerformanceSample,
    ) -> Result<PerformanceMetric, DatabaseError> {
        performance_repo::record(self, sample)
    }

    fn record_performance_samples(
        &self,
        samples: &[PerformanceSample],
    ) -> Result<usize, DatabaseError> {
        performance_repo::record_batch(self, samples)
    }

    fn query_performance_samples(
        &self,
        filter: &PerformanceFilter,
    ) -> Result<Vec<PerformanceMetric>, DatabaseError> {
        performance_repo::query(self, filter)
    }

    fn service_stats(
        &self,
        service_name: &str,
        since: DateTime<Utc>,
    ) -> Result<ServiceStats, DatabaseError> {
        performance_repo::service_stats(self, service_name, since)
    }

    fn prune_performance_samples(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        performance_repo::delete_older_than(self, cutoff)
    }
}

impl StatsRepository for Database {
    fn system_stats(&self, since: DateTime<Utc>) -> Result<SystemStats, DatabaseError> {
        stats_repo::system_stats(self, since)
    }

    fn throughput(&self, since: DateTime<Utc>) -> Result<Throughput, DatabaseError> {
        stats_repo::throughput(self, since)
    }

    fn confidence_distribution(
        &self,
        source: ConfidenceSource,
        bins: usize,
    ) -> Result<Option<ConfidenceHistogram>, DatabaseError> {
        stats_repo::confidence_distribution(self, source, bins)
    }

    fn detect_anomalies(&self, threshold: f64) -> Result<Vec<Anomaly>, DatabaseError> {
        stats_repo::detect_anomalies(self, threshold)
    }
}
