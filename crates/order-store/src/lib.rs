//! Order repository.
//!
//! Persists `Order` documents and exposes the lookups the lifecycle
//! controller needs: by id, by customer, by store and by pickup token.
//! Updates are conditional so concurrent writers cannot silently overwrite
//! each other.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryOrderRepository;
pub use postgres::PostgresOrderRepository;
pub use query::OrderQuery;
pub use store::{OrderRepository, OrderRepositoryExt, UpdateCondition};
