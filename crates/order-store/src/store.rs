use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Order, Version};

use crate::{OrderQuery, Result, StoreError};

/// Precondition an update must satisfy against the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCondition {
    /// The stored version must equal the given version.
    Version(Version),

    /// The stored record must still carry this pickup token, unexpired at
    /// `valid_at`, and still be at version `expected`. Two scans of the same
    /// token can never both pass.
    PickupToken {
        token: String,
        valid_at: DateTime<Utc>,
        expected: Version,
    },
}

impl UpdateCondition {
    /// Expects the version the order was loaded at.
    pub fn loaded_at(order: &Order) -> Self {
        Self::Version(order.version())
    }
}

/// Core trait for order repository implementations.
///
/// All implementations must be thread-safe (Send + Sync). Every write
/// checks the order's invariants first and rejects a violating record with
/// `InvalidRecord`.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores a new order.
    ///
    /// Fails with `Duplicate` if the id is taken. Returns the assigned
    /// version (`Version::first()`).
    async fn insert(&self, order: &Order) -> Result<Version>;

    /// Loads an order by id.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Loads the order whose active pickup credential carries `token`.
    async fn find_by_pickup_token(&self, token: &str) -> Result<Option<Order>>;

    /// Lists orders matching a query, newest first.
    async fn query(&self, query: OrderQuery) -> Result<Vec<Order>>;

    /// Replaces the stored order if `condition` holds.
    ///
    /// Returns the new version. Fails with `CredentialChanged` if a token
    /// condition no longer holds, which takes precedence over a version
    /// mismatch. Fails with `ConcurrencyConflict` on a version mismatch.
    async fn update(&self, order: &Order, condition: UpdateCondition) -> Result<Version>;
}

/// Extension trait providing convenience methods for order repositories.
#[async_trait]
pub trait OrderRepositoryExt: OrderRepository {
    /// Loads an order, failing with `NotFound` if it does not exist.
    async fn get_required(&self, id: OrderId) -> Result<Order> {
        self.get(id).await?.ok_or(StoreError::NotFound(id))
    }
}

impl<T: OrderRepository + ?Sized> OrderRepositoryExt for T {}
