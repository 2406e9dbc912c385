//! Validation errors raised at the request boundary.

use thiserror::Error;

/// A request failed validation before reaching any business logic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was not supplied.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field was supplied but could not be parsed or is out of range.
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Quantity must be at least one and at most `Quantity::MAX`.
    #[error("Invalid quantity: {quantity} (must be between 1 and {})", crate::order::Quantity::MAX)]
    InvalidQuantity { quantity: i64 },

    /// A status update named neither a status nor a payment status.
    #[error("Status update must set status or paymentStatus")]
    EmptyStatusUpdate,
}

impl ValidationError {
    /// Shorthand for an `InvalidField` error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
