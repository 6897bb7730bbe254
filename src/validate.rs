//! Input validation helpers shared by the dataset model and the evaluator.
//!
//! `!is_finite()` rejects NaN and both infinities uniformly.

use crate::error::{Result, SurfaceError};

/// Strictly positive and finite, reported as a validation failure.
pub(crate) fn validate_positive(value: f64, name: &str) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SurfaceError::validation(format!(
            "{name} must be positive and finite, got {value}"
        )));
    }
    Ok(value)
}

/// Strictly positive and finite, reported as a domain failure.
pub(crate) fn domain_positive(value: f64, name: &str) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SurfaceError::domain(format!(
            "{name} must be positive and finite, got {value}"
        )));
    }
    Ok(value)
}

/// Non-negative and finite, reported as a domain failure.
pub(crate) fn domain_non_negative(value: f64, name: &str) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(SurfaceError::domain(format!(
            "{name} must be non-negative and finite, got {value}"
        )));
    }
    Ok(value)
}

/// Checks that `values` is strictly increasing.
pub(crate) fn validate_strictly_increasing(values: &[f64], name: &str) -> Result<()> {
    for (i, pair) in values.windows(2).enumerate() {
        if !(pair[1] > pair[0]) {
            return Err(SurfaceError::validation(format!(
                "{name} must be strictly increasing: {name}[{}]={} is not above {name}[{}]={}",
                i + 1,
                pair[1],
                i,
                pair[0]
            )));
        }
    }
    Ok(())
}
