//! Lifecycle error types.

use chrono::{DateTime, Utc};
use common::{FileId, OrderId, ServiceId, StoreId};
use domain::{OrderError, OrderStatus, ValidationError};
use order_store::StoreError;
use thiserror::Error;

use crate::attachments::AttachmentError;
use crate::services::{BlobError, CatalogError};

/// Errors returned by the order controller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The request failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The caller may not perform this operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Store not found: {0}")]
    StoreNotFound(StoreId),

    #[error("Service not found: {0}")]
    ServiceNotFound(ServiceId),

    #[error("Service {service_id} is not offered by store {store_id}")]
    ServiceNotInStore {
        service_id: ServiceId,
        store_id: StoreId,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Attachment {file_id} not found on order {order_id}")]
    AttachmentNotFound { order_id: OrderId, file_id: FileId },

    /// No active credential carries this token.
    #[error("Pickup token not found")]
    PickupTokenNotFound,

    /// The credential matched but its window has closed.
    #[error("Pickup token expired at {expired_at}")]
    PickupTokenExpired { expired_at: DateTime<Utc> },

    #[error("Invalid status transition: cannot move from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// Concurrent writers kept winning the version race.
    #[error("Order {0} was modified concurrently; retry the request")]
    Conflict(OrderId),

    /// The order could not be built from the request.
    #[error("Order rejected: {0}")]
    InvalidOrder(OrderError),

    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Repository error: {0}")]
    Store(#[from] StoreError),
}

impl From<OrderError> for LifecycleError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidStatusTransition { from, to } => {
                LifecycleError::InvalidStatusTransition { from, to }
            }
            OrderError::PickupTokenMismatch => LifecycleError::PickupTokenNotFound,
            OrderError::PickupTokenExpired { expired_at } => {
                LifecycleError::PickupTokenExpired { expired_at }
            }
            other => LifecycleError::InvalidOrder(other),
        }
    }
}

/// Convenience type alias for lifecycle results.
pub type Result<T> = std::result::Result<T, LifecycleError>;
