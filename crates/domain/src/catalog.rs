//! Read-only catalog models.
//!
//! Stores and services are owned by the catalog collaborator; the order engine
//! only reads them to price a selection and to decide who may manage an order.

use common::{ServiceId, StoreId, UserId};
use serde::{Deserialize, Serialize};

use crate::identity::{Caller, Role};
use crate::order::Money;

/// A print shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub owner_id: UserId,
    #[serde(default)]
    pub staff_ids: Vec<UserId>,
}

impl Store {
    /// Returns true if the caller may manage this store's orders.
    ///
    /// Admins manage every store; otherwise the caller must be the owner or
    /// a listed staff member.
    pub fn is_managed_by(&self, caller: &Caller) -> bool {
        caller.role == Role::Admin
            || caller.user_id == self.owner_id
            || self.staff_ids.contains(&caller.user_id)
    }
}

/// One priced option inside a variant group (e.g. "A3" in "Paper size").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantOption {
    pub name: String,
    #[serde(default)]
    pub price_delta: Money,
}

/// A labelled group of mutually exclusive options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantGroup {
    pub label: String,
    pub options: Vec<VariantOption>,
}

impl VariantGroup {
    pub fn option(&self, index: usize) -> Option<&VariantOption> {
        self.options.get(index)
    }
}

/// A priced catalog service offered by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub id: ServiceId,
    pub store_id: StoreId,
    pub name: String,
    pub unit: String,
    pub base_price: Money,
    pub currency: String,
    #[serde(default)]
    pub variants: Vec<VariantGroup>,
}

impl ServiceEntry {
    /// Finds a variant group by its label (exact match).
    pub fn variant(&self, label: &str) -> Option<&VariantGroup> {
        self.variants.iter().find(|v| v.label == label)
    }

    pub fn belongs_to(&self, store_id: StoreId) -> bool {
        self.store_id == store_id
    }
}
