use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Order, Version};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    OrderQuery, Result, StoreError,
    store::{OrderRepository, UpdateCondition},
};

const SELECT_COLUMNS: &str = "SELECT document, version FROM orders";

/// PostgreSQL-backed order repository.
///
/// The full order is kept as a JSONB document. The columns used for lookups
/// and conditional updates are duplicated alongside it, and the `version`
/// column is authoritative over the document.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Creates a new PostgreSQL order repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let document: serde_json::Value = row.try_get("document")?;
        let mut order: Order = serde_json::from_value(document)?;
        order.set_version(Version::new(row.try_get("version")?));
        Ok(order)
    }

    async fn current_version(&self, id: OrderId) -> Result<Option<Version>> {
        let version: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(version.map(Version::new))
    }

    /// Reads the stored version and whether `token` is still the live credential.
    async fn credential_state(
        &self,
        id: OrderId,
        token: &str,
        valid_at: DateTime<Utc>,
    ) -> Result<Option<(Version, bool)>> {
        let row: Option<(i64, bool)> = sqlx::query_as(
            r#"
            SELECT version,
                   COALESCE(pickup_token = $2 AND pickup_expires_at >= $3, FALSE)
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(token)
        .bind(valid_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(version, valid)| (Version::new(version), valid)))
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn insert(&self, order: &Order) -> Result<Version> {
        order.check_invariants()?;
        let document = serde_json::to_value(order)?;
        let credential = order.pickup_credential();

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, store_id, status, payment_status,
                                pickup_token, pickup_expires_at, document, version,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, $9, $10)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.customer_id().as_uuid())
        .bind(order.store_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(credential.map(|c| c.token.as_str()))
        .bind(credential.map(|c| c.expires_at))
        .bind(document)
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return StoreError::Duplicate(order.id());
            }
            StoreError::Database(e)
        })?;

        Ok(Version::first())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_by_pickup_token(&self, token: &str) -> Result<Option<Order>> {
        let row: Option<PgRow> =
            sqlx::query(&format!("{SELECT_COLUMNS} WHERE pickup_token = $1"))
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn query(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
        let mut param_count = 0;

        if query.customer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND customer_id = ${param_count}"));
        }
        if query.store_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND store_id = ${param_count}"));
        }
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at DESC, seq DESC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(customer_id) = query.customer_id {
            sqlx_query = sqlx_query.bind(customer_id.as_uuid());
        }
        if let Some(store_id) = query.store_id {
            sqlx_query = sqlx_query.bind(store_id.as_uuid());
        }
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn update(&self, order: &Order, condition: UpdateCondition) -> Result<Version> {
        order.check_invariants()?;
        let document = serde_json::to_value(order)?;
        let credential = order.pickup_credential();

        let mut sql = String::from(
            r#"
            UPDATE orders
            SET status = $2, payment_status = $3, pickup_token = $4,
                pickup_expires_at = $5, document = $6, updated_at = $7,
                version = version + 1
            WHERE id = $1"#,
        );
        match condition {
            UpdateCondition::Version(_) => sql.push_str(" AND version = $8"),
            UpdateCondition::PickupToken { .. } => sql.push_str(
                " AND pickup_token = $8 AND pickup_expires_at >= $9 AND version = $10",
            ),
        }
        sql.push_str(" RETURNING version");

        let mut sqlx_query = sqlx::query_scalar::<_, i64>(&sql)
            .bind(order.id().as_uuid())
            .bind(order.status().as_str())
            .bind(order.payment_status().as_str())
            .bind(credential.map(|c| c.token.as_str()))
            .bind(credential.map(|c| c.expires_at))
            .bind(document)
            .bind(order.updated_at());

        match &condition {
            UpdateCondition::Version(expected) => {
                sqlx_query = sqlx_query.bind(expected.as_i64());
            }
            UpdateCondition::PickupToken {
                token,
                valid_at,
                expected,
            } => {
                sqlx_query = sqlx_query
                    .bind(token.as_str())
                    .bind(*valid_at)
                    .bind(expected.as_i64());
            }
        }

        if let Some(version) = sqlx_query.fetch_optional(&self.pool).await? {
            return Ok(Version::new(version));
        }

        // Nothing matched: tell a missing row apart from a failed condition.
        let order_id = order.id();
        Err(match condition {
            UpdateCondition::Version(expected) => {
                let actual = self
                    .current_version(order_id)
                    .await?
                    .ok_or(StoreError::NotFound(order_id))?;
                StoreError::ConcurrencyConflict {
                    order_id,
                    expected,
                    actual,
                }
            }
            UpdateCondition::PickupToken {
                token,
                valid_at,
                expected,
            } => {
                let (actual, credential_valid) = self
                    .credential_state(order_id, &token, valid_at)
                    .await?
                    .ok_or(StoreError::NotFound(order_id))?;
                if credential_valid {
                    StoreError::ConcurrencyConflict {
                        order_id,
                        expected,
                        actual,
                    }
                } else {
                    StoreError::CredentialChanged { order_id }
                }
            }
        })
    }
}
