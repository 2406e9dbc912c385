use common::OrderId;
use domain::{OrderError, Version};
use thiserror::Error;

/// Errors that can occur when interacting with the order repository.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// An order with this id already exists.
    #[error("Order already exists: {0}")]
    Duplicate(OrderId),

    /// The stored version did not match the expected version.
    #[error(
        "Concurrency conflict for order {order_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// The stored pickup credential no longer carries the expected token, or
    /// has expired.
    #[error("Pickup credential for order {order_id} was consumed or replaced")]
    CredentialChanged { order_id: OrderId },

    /// The order failed its invariant check and was not written.
    #[error("Refusing to store invalid order: {0}")]
    InvalidRecord(#[from] OrderError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StoreError>;
