use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use common::OrderId;
use domain::{Order, Version};
use tokio::sync::RwLock;

use crate::{
    OrderQuery, Result, StoreError,
    store::{OrderRepository, UpdateCondition},
};

struct StoredOrder {
    seq: u64,
    order: Order,
}

/// In-memory order repository for tests and single-node development.
///
/// Conditional updates are evaluated and applied under a single write lock,
/// which gives the same atomicity as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, StoredOrder>>>,
    next_seq: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Returns true if no orders are stored.
    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    /// Makes every subsequent write fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<Version> {
        self.check_available()?;
        order.check_invariants()?;

        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id()) {
            return Err(StoreError::Duplicate(order.id()));
        }

        let mut stored = order.clone();
        stored.set_version(Version::first());
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        orders.insert(order.id(), StoredOrder { seq, order: stored });

        Ok(Version::first())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).map(|s| s.order.clone()))
    }

    async fn find_by_pickup_token(&self, token: &str) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|s| {
                s.order
                    .pickup_credential()
                    .is_some_and(|c| c.matches(token))
            })
            .map(|s| s.order.clone()))
    }

    async fn query(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut matching: Vec<&StoredOrder> = orders
            .values()
            .filter(|s| {
                if let Some(customer_id) = query.customer_id
                    && s.order.customer_id() != customer_id
                {
                    return false;
                }
                if let Some(store_id) = query.store_id
                    && s.order.store_id() != store_id
                {
                    return false;
                }
                if let Some(status) = query.status
                    && s.order.status() != status
                {
                    return false;
                }
                true
            })
            .collect();

        matching.sort_by(|a, b| {
            b.order
                .created_at()
                .cmp(&a.order.created_at())
                .then(b.seq.cmp(&a.seq))
        });

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|s| s.order.clone())
            .collect())
    }

    async fn update(&self, order: &Order, condition: UpdateCondition) -> Result<Version> {
        self.check_available()?;
        order.check_invariants()?;

        let order_id = order.id();
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order_id)
            .ok_or(StoreError::NotFound(order_id))?;

        let current = stored.order.version();
        match condition {
            UpdateCondition::Version(expected) => {
                if current != expected {
                    return Err(StoreError::ConcurrencyConflict {
                        order_id,
                        expected,
                        actual: current,
                    });
                }
            }
            UpdateCondition::PickupToken {
                token,
                valid_at,
                expected,
            } => {
                let still_valid = stored
                    .order
                    .pickup_credential()
                    .is_some_and(|c| c.matches(&token) && !c.is_expired(valid_at));
                if !still_valid {
                    return Err(StoreError::CredentialChanged { order_id });
                }
                if current != expected {
                    return Err(StoreError::ConcurrencyConflict {
                        order_id,
                        expected,
                        actual: current,
                    });
                }
            }
        }

        let next = current.next();
        let mut replacement = order.clone();
        replacement.set_version(next);
        stored.order = replacement;

        Ok(next)
    }
}
