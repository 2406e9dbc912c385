//! Order aggregate and related types.

mod aggregate;
mod credential;
mod state;
mod value_objects;

pub use aggregate::{NewOrder, Order, StatusChange, StatusUpdate};
pub use credential::{PickupCredential, TOKEN_BYTES};
pub use state::{OrderStatus, PaymentStatus};
pub use value_objects::{AttachmentRef, Money, OrderItem, Quantity, SelectedOption, Version};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Items priced in different currencies.
    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: String, found: String },

    /// Status change not permitted by the state machine.
    #[error("Invalid status transition: cannot move from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// The presented token is not this order's active credential.
    #[error("Pickup token does not match an active credential")]
    PickupTokenMismatch,

    /// The credential matched but is past its expiry.
    #[error("Pickup token expired at {expired_at}")]
    PickupTokenExpired { expired_at: DateTime<Utc> },

    /// The item totals cannot be represented as one subtotal.
    #[error("Order total exceeds the supported amount")]
    AmountOverflow,

    /// An aggregate invariant does not hold.
    #[error("Order invariant violated: {0}")]
    InvariantViolation(String),
}
