//! Builders for the records each pipeline service writes.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};

use docflow::{ClassScores, NewDocument, NewOcrResult, NewPrediction};

/// Fixed reference instant so ordering assertions are deterministic.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn upload(filename: &str) -> NewDocument {
    NewDocument::new(filename, format!("/data/raw/{}", filename))
        .original_path(format!("/incoming/{}", filename))
        .mime_type("image/jpeg")
        .file_size(48_213)
}

pub fn tesseract_result(document_id: i64, text: &str, confidence: f64) -> NewOcrResult {
    NewOcrResult::new(document_id, text, "eng", confidence, 1.4, "tesseract")
}

/// Scores where `winner` gets `confidence` and the rest share the remainder.
pub fn scores(winner: &str, confidence: f64, others: &[&str]) -> ClassScores {
    let mut scores = ClassScores::new();
    let share = if others.is_empty() {
        0.0
    } else {
        (1.0 - confidence) / others.len() as f64
    };
    for other in others {
        scores.insert(other.to_string(), share);
    }
    scores.insert(winner.to_string(), confidence);
    scores
}

pub fn classify(document_id: i64, version: &str, class: &str, confidence: f64) -> NewPrediction {
    NewPrediction::new(
        document_id,
        "layoutlm-classifier",
        version,
        class,
        confidence,
        scores(class, confidence, &["receipt", "letter"]),
    )
}
