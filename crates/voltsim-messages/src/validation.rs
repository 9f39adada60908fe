//! Small constraint helpers shared by the payload `validate` impls.
//!
//! Failures surface on the wire as `PropertyConstraintViolation`; the field
//! name in the error is the wire spelling, not the Rust one.

use voltsim_types::{OcppError, OcppResult};

/// Reject empty string fields.
pub fn non_empty(field: &str, value: &str) -> OcppResult<()> {
    if value.trim().is_empty() {
        return Err(OcppError::Constraint {
            field: field.to_string(),
            detail: "must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Reject values that are not strictly positive.
pub fn positive(field: &str, value: i32) -> OcppResult<()> {
    if value <= 0 {
        return Err(OcppError::Constraint {
            field: field.to_string(),
            detail: format!("must be positive, got {value}"),
        });
    }
    Ok(())
}

/// Reject collections shorter than `min`.
pub fn at_least(field: &str, len: usize, min: usize) -> OcppResult<()> {
    if len < min {
        return Err(OcppError::Constraint {
            field: field.to_string(),
            detail: format!("must contain at least {min} element(s), got {len}"),
        });
    }
    Ok(())
}
