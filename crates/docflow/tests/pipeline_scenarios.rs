//! End-to-end scenarios as the pipeline services exercise the store.

mod common;

use chrono::Duration;

use common::*;
use docflow::{
    DatabaseError, DocumentRepository, DocumentStatus, ModelMetricRepository, NewDocument,
    NewModelMetric, OcrRepository, PredictionRepository,
};

#[test]
fn test_invoice_ocr_result_retrievable_by_document() {
    let store = StoreHarness::new();
    let db = &store.db;

    let doc = db.create_document(&upload("invoice.jpg")).unwrap();
    assert_eq!(doc.status, DocumentStatus::Uploaded);

    db.update_document_status(doc.id, DocumentStatus::OcrPending).unwrap();
    let stored = db
        .record_ocr_result(&tesseract_result(doc.id, "INVOICE #4411 Total: 129.00 EUR", 0.91))
        .unwrap();
    db.update_document_status(doc.id, DocumentStatus::OcrCompleted).unwrap();

    let results = db.ocr_results_for_document(doc.id).unwrap();
    assert_eq!(results, vec![stored.clone()]);
    assert_eq!(results[0].ocr_engine, "tesseract");
    assert_eq!(results[0].extracted_text, "INVOICE #4411 Total: 129.00 EUR");
    assert_eq!(db.latest_ocr_result(doc.id).unwrap(), Some(stored));

    let found = db.find_document(doc.id).unwrap().unwrap();
    assert_eq!(found.filename, "invoice.jpg");
    assert_eq!(found.status, DocumentStatus::OcrCompleted);
}

#[test]
fn test_prediction_for_missing_document_writes_nothing() {
    let store = StoreHarness::new();

    let err = store
        .db
        .record_prediction(&classify(4_242, "v1", "invoice", 0.8))
        .unwrap_err();
    assert!(matches!(
        err,
        DatabaseError::NotFound {
            entity: "document",
            id: 4_242
        }
    ));
    assert_eq!(store.table_count("predictions"), 0);

    let err = store
        .db
        .record_ocr_result(&tesseract_result(4_242, "orphan", 0.5))
        .unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound { .. }));
    assert_eq!(store.table_count("ocr_results"), 0);
}

#[test]
fn test_model_versions_kept_most_recent_first() {
    let store = StoreHarness::new();
    let db = &store.db;
    let doc = db.create_document(&upload("statement.jpg")).unwrap();

    let older = db
        .record_prediction(&classify(doc.id, "v1", "invoice", 0.72).predicted_at(base_time()))
        .unwrap();
    let newer = db
        .record_prediction(
            &classify(doc.id, "v2", "receipt", 0.88).predicted_at(base_time() + Duration::hours(2)),
        )
        .unwrap();

    let history = db.prediction_history(doc.id, 10).unwrap();
    assert_eq!(history, vec![newer.clone(), older]);
    assert_eq!(history[0].model_version, "v2");

    assert_eq!(db.prediction_history(doc.id, 1).unwrap(), vec![newer]);
    assert_eq!(db.prediction_history(doc.id, 10).unwrap(), history);

    db.record_model_metric(
        &NewModelMetric::new("layoutlm-classifier", "v1")
            .scores(0.81, 0.8, 0.79, 0.795)
            .trained_at(base_time() - Duration::days(7)),
    )
    .unwrap();
    let v2 = db
        .record_model_metric(
            &NewModelMetric::new("layoutlm-classifier", "v2")
                .scores(0.9, 0.89, 0.88, 0.885)
                .dataset_size(12_000)
                .trained_at(base_time() - Duration::days(1)),
        )
        .unwrap();
    let metrics = db.model_metric_history("layoutlm-classifier", 10).unwrap();
    assert_eq!(metrics.len(), 2);
    assert_eq!(db.latest_model_metric("layoutlm-classifier").unwrap(), Some(v2));
}

#[test]
fn test_cascade_delete_leaves_other_documents_untouched() {
    let store = StoreHarness::new();
    let db = &store.db;

    let doomed = db.create_document(&upload("a.jpg")).unwrap();
    let kept = db.create_document(&upload("b.jpg")).unwrap();
    for doc in [&doomed, &kept] {
        db.record_ocr_result(&tesseract_result(doc.id, "text", 0.9)).unwrap();
        db.record_ocr_result(&tesseract_result(doc.id, "retry", 0.95)).unwrap();
        db.record_prediction(&classify(doc.id, "v1", "invoice", 0.7)).unwrap();
    }

    let report = db.delete_document(doomed.id).unwrap();
    assert_eq!(report.ocr_results_removed, 2);
    assert_eq!(report.predictions_removed, 1);

    assert!(db.find_document(doomed.id).unwrap().is_none());
    assert!(db.ocr_results_for_document(doomed.id).unwrap().is_empty());
    assert!(db.prediction_history(doomed.id, 10).unwrap().is_empty());

    assert_eq!(db.ocr_results_for_document(kept.id).unwrap().len(), 2);
    assert_eq!(db.prediction_history(kept.id, 10).unwrap().len(), 1);
    assert_eq!(store.table_count("documents"), 1);

    assert!(matches!(
        db.delete_document(doomed.id),
        Err(DatabaseError::NotFound { .. })
    ));
}

#[test]
fn test_empty_storage_path_rejected() {
    let store = StoreHarness::new();

    for storage_path in ["", "   "] {
        let err = store
            .db
            .create_document(&NewDocument::new("scan.jpg", storage_path))
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Validation {
                field: "storage_path",
                ..
            }
        ));
    }
    assert_eq!(store.table_count("documents"), 0);
}

#[test]
fn test_illegal_status_transition_rejected() {
    let store = StoreHarness::new();
    let db = &store.db;
    let doc = db.create_document(&upload("contract.jpg")).unwrap();

    let err = db
        .update_document_status(doc.id, DocumentStatus::Completed)
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Validation { field: "status", .. }));

    db.update_document_status(doc.id, DocumentStatus::Failed).unwrap();
    assert_eq!(
        db.find_document(doc.id).unwrap().unwrap().status,
        DocumentStatus::Failed
    );
}

#[test]
fn test_writes_visible_across_connections() {
    let store = StoreHarness::new();
    let ingestion = store.reopen();

    let doc = ingestion.create_document(&upload("memo.jpg")).unwrap();
    store
        .db
        .record_ocr_result(&tesseract_result(doc.id, "memo", 0.6))
        .unwrap();

    assert_eq!(ingestion.ocr_results_for_document(doc.id).unwrap().len(), 1);
}
