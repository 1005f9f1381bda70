use crate::error::AppError;

/// Largest absolute coordinate a team node may occupy on the canvas.
pub const MAX_COORDINATE: f64 = 10_000.0;

pub fn require_non_empty(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

pub fn require_valid_id(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must be a valid ID")));
    }
    Ok(())
}

/// A coordinate must be finite and within ±[`MAX_COORDINATE`].
pub fn require_coordinate(field: &str, value: f64) -> Result<(), AppError> {
    if !value.is_finite() || value.abs() > MAX_COORDINATE {
        return Err(AppError::Validation(format!(
            "{field} must be a finite number within ±{MAX_COORDINATE}, got {value}"
        )));
    }
    Ok(())
}

/// Optional node dimensions must be finite and strictly positive.
pub fn require_dimension(field: &str, value: Option<f64>) -> Result<(), AppError> {
    match value {
        Some(v) if !v.is_finite() || v <= 0.0 => Err(AppError::Validation(format!(
            "{field} must be a positive number, got {v}"
        ))),
        _ => Ok(()),
    }
}
