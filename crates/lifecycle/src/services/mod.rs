//! Collaborators the order controller depends on.

pub mod blob;
pub mod catalog;
pub mod clock;
pub mod notification;

pub use blob::{Blob, BlobError, BlobMetadata, BlobStore, FsBlobStore, InMemoryBlobStore};
pub use catalog::{Catalog, CatalogError, CatalogSeed, InMemoryCatalog};
pub use clock::{Clock, ManualClock, SystemClock};
pub use notification::{
    Delivery, InMemoryPublisher, Notification, NotificationKind, PresenceDirectory, PublishError,
    Publisher,
};
