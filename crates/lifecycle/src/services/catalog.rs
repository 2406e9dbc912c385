//! Catalog collaborator: read-only access to stores and their services.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use common::{ServiceId, StoreId};
use domain::{ServiceEntry, Store};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog seed is malformed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read-only lookup of stores and services.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn store(&self, id: StoreId) -> Result<Option<Store>, CatalogError>;

    async fn service(&self, id: ServiceId) -> Result<Option<ServiceEntry>, CatalogError>;
}

/// JSON seed file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub stores: Vec<Store>,
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    stores: HashMap<StoreId, Store>,
    services: HashMap<ServiceId, ServiceEntry>,
}

/// In-memory catalog, optionally seeded from a JSON file.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryCatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryCatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds a catalog from a seed.
    pub fn from_seed(seed: CatalogSeed) -> Self {
        let catalog = Self::new();
        for store in seed.stores {
            catalog.add_store(store);
        }
        for service in seed.services {
            catalog.add_service(service);
        }
        catalog
    }

    /// Loads a seed file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = tokio::fs::read(path.as_ref()).await?;
        let seed: CatalogSeed = serde_json::from_slice(&raw)?;
        tracing::info!(
            stores = seed.stores.len(),
            services = seed.services.len(),
            "catalog seed loaded"
        );
        Ok(Self::from_seed(seed))
    }

    /// Adds or replaces a store.
    pub fn add_store(&self, store: Store) {
        self.write().stores.insert(store.id, store);
    }

    /// Adds or replaces a service.
    pub fn add_service(&self, service: ServiceEntry) {
        self.write().services.insert(service.id, service);
    }

    pub fn store_count(&self) -> usize {
        self.read().stores.len()
    }

    pub fn service_count(&self) -> usize {
        self.read().services.len()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn store(&self, id: StoreId) -> Result<Option<Store>, CatalogError> {
        Ok(self.read().stores.get(&id).cloned())
    }

    async fn service(&self, id: ServiceId) -> Result<Option<ServiceEntry>, CatalogError> {
        Ok(self.read().services.get(&id).cloned())
    }
}
