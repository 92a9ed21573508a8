//! Input checks applied at the store boundary before any write.

use super::DatabaseError;

/// Tolerance used when comparing a prediction's confidence to its score map.
pub const SCORE_EPSILON: f64 = 1e-6;

/// Rejects empty or whitespace-only strings.
pub fn non_blank(field: &'static str, value: &str) -> Result<(), DatabaseError> {
    if value.trim().is_empty() {
        return Err(DatabaseError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Requires a finite value within `[0, 1]`.
pub fn unit_interval(field: &'static str, value: f64) -> Result<(), DatabaseError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(DatabaseError::validation(
            field,
            format!("must be within [0, 1], got {}", value),
        ));
    }
    Ok(())
}

/// Requires a finite, non-negative value.
pub fn non_negative(field: &'static str, value: f64) -> Result<(), DatabaseError> {
    if !value.is_finite() || value < 0.0 {
        return Err(DatabaseError::validation(
            field,
            format!("must be a non-negative number, got {}", value),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert!(non_blank("filename", "a.pdf").is_ok());
        assert!(non_blank("filename", "").is_err());
        assert!(non_blank("filename", "   ").is_err());
    }

    #[test]
    fn test_unit_interval() {
        assert!(unit_interval("confidence", 0.0).is_ok());
        assert!(unit_interval("confidence", 1.0).is_ok());
        assert!(unit_interval("confidence", 0.92).is_ok());
        assert!(unit_interval("confidence", -0.01).is_err());
        assert!(unit_interval("confidence", 1.01).is_err());
        assert!(unit_interval("confidence", f64::NAN).is_err());
    }

    #[test]
    fn test_non_negative() {
        assert!(non_negative("processing_time", 0.0).is_ok());
        assert!(non_negative("processing_time", 12.5).is_ok());
        assert!(non_negative("processing_time", -1.0).is_err());
        assert!(non_negative("processing_time", f64::INFINITY).is_err());
    }

    #[test]
    fn test_error_names_field() {
        let err = unit_interval("confidence_score", 2.0).unwrap_err();
        match err {
            DatabaseError::Validation { field, .. } => assert_eq!(field, "confidence_score"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
