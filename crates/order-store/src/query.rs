use common::{StoreId, UserId};
use domain::OrderStatus;

/// Builder for constructing order listings.
///
/// Results are always ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by customer.
    pub customer_id: Option<UserId>,

    /// Filter by store.
    pub store_id: Option<StoreId>,

    /// Filter by status.
    pub status: Option<OrderStatus>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a query for a customer's orders.
    pub fn for_customer(customer_id: UserId) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Default::default()
        }
    }

    /// Creates a query for a store's orders.
    pub fn for_store(store_id: StoreId) -> Self {
        Self {
            store_id: Some(store_id),
            ..Default::default()
        }
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips a number of results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}
