//! Shared identifier types for the print shop order engine.

mod types;

pub use types::{FileId, OrderId, ServiceId, StoreId, UserId};
