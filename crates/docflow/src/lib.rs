pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod repository;

pub use config::{load_config, RecorderConfig, StoreConfig};
pub use db::document_repo::{Document, DocumentFilter, DocumentStatus, NewDocument};
pub use db::model_metric_repo::{ModelMetric, NewModelMetric};
pub use db::ocr_repo::{NewOcrResult, OcrResult};
pub use db::performance_repo::{PerformanceFilter, PerformanceMetric, PerformanceSample};
pub use db::prediction_repo::{ClassScores, NewPrediction, Prediction};
pub use db::{Database, DatabaseError, Metadata, Namespace};
pub use error::{ConfigError, DocflowError, RecorderError, Result};
pub use logging::LogFormat;
pub use monitor::{measure, PerformanceRecorder, RecorderStats};
pub use repository::{
    DocumentRepository, ModelMetricRepository, OcrRepository, PerformanceRepository,
    PredictionRepository, StatsRepository,
};
