//! Order lifecycle orchestration.
//!
//! `OrderController` composes the pricing engine, attachment intake, the
//! order repository and the notification publisher:
//! 1. `create_order` prices a selection, stores attachments and inserts the order
//! 2. `update_status` moves an order through its state machine
//! 3. `confirm_pickup` consumes a pickup credential exactly once
//!
//! Notifications are published after each write commits and never affect
//! the operation's result.

pub mod attachments;
pub mod controller;
pub mod error;
pub mod services;

pub use attachments::{AttachmentError, AttachmentIntake, UploadedFile};
pub use controller::{ControllerSettings, CreateOrder, OrderController, Page};
pub use error::{LifecycleError, Result};
pub use services::{
    Blob, BlobError, BlobMetadata, BlobStore, Catalog, CatalogError, CatalogSeed, Clock, Delivery,
    FsBlobStore, InMemoryBlobStore, InMemoryCatalog, InMemoryPublisher, ManualClock, Notification,
    NotificationKind, PresenceDirectory, PublishError, Publisher, SystemClock,
};
