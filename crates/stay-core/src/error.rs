//! # Booking Error Types
//!
//! Typed error handling for the stayflow booking core.
//! All booking operations return `Result<T, BookingError>`.

use thiserror::Error;

/// Core error type for all booking, pricing, and reconciliation operations
#[derive(Debug, Error)]
pub enum BookingError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data (bad dates, below-minimum stay, bad amounts)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Listing or reservation absent
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Caller is not authenticated or not allowed to perform the operation
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Payment provider API error
    #[error("Gateway error [{provider}]: {message}")]
    Gateway { provider: String, message: String },

    /// Network/HTTP error communicating with the provider
    #[error("Network error: {0}")]
    Network(String),

    /// Webhook signature verification failed
    #[error("Webhook verification failed: {0}")]
    SignatureVerification(String),

    /// Webhook payload parsing error
    #[error("Event parse error: {0}")]
    EventParse(String),

    /// Requested refund exceeds the refundable remainder
    #[error("Refund of {requested} exceeds refundable remainder {remaining}")]
    OverRefund { requested: i64, remaining: i64 },

    /// Stay no longer satisfies the listing's constraints at settle time
    #[error("Booking constraint violated at settlement: {0}")]
    StaleBookingConstraint(String),

    /// A reservation for this checkout session already exists
    #[error("Reservation already exists for session {session_id}")]
    DuplicateSession { session_id: String },

    /// Optimistic-concurrency conflict on a reservation write
    #[error("Concurrent update conflict on reservation {id}")]
    WriteConflict { id: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookingError {
    /// Returns true if retrying the same operation could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BookingError::Network(_)
                | BookingError::Gateway { .. }
                | BookingError::WriteConflict { .. }
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            BookingError::Configuration(_) => 500,
            BookingError::Validation(_) => 400,
            BookingError::NotFound { .. } => 404,
            BookingError::Authorization(_) => 401,
            BookingError::Gateway { .. } => 502,
            BookingError::Network(_) => 503,
            BookingError::SignatureVerification(_) => 401,
            BookingError::EventParse(_) => 400,
            BookingError::OverRefund { .. } => 400,
            BookingError::StaleBookingConstraint(_) => 409,
            BookingError::DuplicateSession { .. } => 409,
            BookingError::WriteConflict { .. } => 409,
            BookingError::Serialization(_) => 500,
            BookingError::Internal(_) => 500,
        }
    }
}

/// Result type alias for booking operations
pub type BookingResult<T> = Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(BookingError::Network("timeout".into()).is_retryable());
        assert!(BookingError::WriteConflict { id: "r1".into() }.is_retryable());
        assert!(!BookingError::Validation("bad dates".into()).is_retryable());
        assert!(!BookingError::OverRefund {
            requested: 500,
            remaining: 100
        }
        .is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(BookingError::Validation("test".into()).status_code(), 400);
        assert_eq!(
            BookingError::NotFound {
                entity: "listing",
                id: "x".into()
            }
            .status_code(),
            404
        );
        assert_eq!(
            BookingError::SignatureVerification("bad".into()).status_code(),
            401
        );
        assert_eq!(
            BookingError::Gateway {
                provider: "stripe".into(),
                message: "boom".into()
            }
            .status_code(),
            502
        );
    }
}
