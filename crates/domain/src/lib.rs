//! Domain layer for the print shop order engine.
//!
//! This crate provides the pure, I/O-free core:
//! - Catalog read models consumed by the pricing engine
//! - The pricing engine itself (`pricing::price`)
//! - Caller identity and roles as resolved by the authentication gateway
//! - The `Order` aggregate with its status state machine and pickup credential

pub mod catalog;
pub mod error;
pub mod identity;
pub mod order;
pub mod pricing;

pub use catalog::{ServiceEntry, Store, VariantGroup, VariantOption};
pub use error::ValidationError;
pub use identity::{Caller, Role};
pub use order::{
    AttachmentRef, Money, NewOrder, Order, OrderError, OrderItem, OrderStatus, PaymentStatus,
    PickupCredential, Quantity, SelectedOption, StatusChange, StatusUpdate, Version,
};
pub use pricing::{OptionSelection, PriceQuote, price};
