//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, ServiceId, StoreId, UserId};
use domain::{
    Money, NewOrder, Order, OrderItem, OrderStatus, PaymentStatus, Quantity, StatusUpdate, Version,
};
use order_store::{
    OrderQuery, OrderRepository, OrderRepositoryExt, PostgresOrderRepository, StoreError,
    UpdateCondition,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_orders_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/002_add_orders_insert_sequence.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh repository with its own pool and an empty table
async fn get_test_repo() -> PostgresOrderRepository {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE orders")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderRepository::new(pool)
}

fn sample_order(customer_id: UserId, store_id: StoreId) -> Order {
    sample_order_at(customer_id, store_id, Utc::now())
}

fn sample_order_at(customer_id: UserId, store_id: StoreId, placed_at: DateTime<Utc>) -> Order {
    Order::place(NewOrder {
        id: OrderId::new(),
        customer_id,
        store_id,
        items: vec![OrderItem {
            service_id: ServiceId::new(),
            service_name: "Business cards".to_string(),
            unit: "box".to_string(),
            currency: "USD".to_string(),
            quantity: Quantity::new(3).unwrap(),
            selected_options: vec![],
            unit_price: Money::from_cents(1200),
            total_price: Money::from_cents(3600),
        }],
        notes: Some("matte please".to_string()),
        attachments: vec![],
        placed_at,
    })
    .unwrap()
}

async fn insert_ready(repo: &PostgresOrderRepository) -> Order {
    let order = sample_order(UserId::new(), StoreId::new());
    repo.insert(&order).await.unwrap();

    let mut loaded = repo.get_required(order.id()).await.unwrap();
    loaded
        .apply_status_update(
            StatusUpdate::status(OrderStatus::Ready),
            Utc::now(),
            Duration::hours(48),
        )
        .unwrap();
    let version = repo
        .update(&loaded, UpdateCondition::loaded_at(&loaded))
        .await
        .unwrap();
    loaded.set_version(version);
    loaded
}

#[tokio::test]
#[serial]
async fn insert_and_get_round_trips_document() {
    let repo = get_test_repo().await;
    let order = sample_order(UserId::new(), StoreId::new());

    let version = repo.insert(&order).await.unwrap();
    assert_eq!(version, Version::first());

    let loaded = repo.get_required(order.id()).await.unwrap();
    assert_eq!(loaded.version(), Version::first());
    assert_eq!(loaded.subtotal().cents(), 3600);
    assert_eq!(loaded.notes(), Some("matte please"));
    assert_eq!(loaded.items()[0].service_name, "Business cards");
}

#[tokio::test]
#[serial]
async fn duplicate_insert_is_rejected() {
    let repo = get_test_repo().await;
    let order = sample_order(UserId::new(), StoreId::new());
    repo.insert(&order).await.unwrap();

    let result = repo.insert(&order).await;
    assert!(matches!(result, Err(StoreError::Duplicate(id)) if id == order.id()));
}

#[tokio::test]
#[serial]
async fn stale_version_update_conflicts() {
    let repo = get_test_repo().await;
    let order = sample_order(UserId::new(), StoreId::new());
    repo.insert(&order).await.unwrap();

    let mut first = repo.get_required(order.id()).await.unwrap();
    let mut second = first.clone();

    first
        .apply_status_update(
            StatusUpdate::status(OrderStatus::Processing),
            Utc::now(),
            Duration::hours(48),
        )
        .unwrap();
    assert_eq!(
        repo.update(&first, UpdateCondition::loaded_at(&first))
            .await
            .unwrap(),
        Version::new(2)
    );

    second
        .apply_status_update(
            StatusUpdate::payment(PaymentStatus::Paid),
            Utc::now(),
            Duration::hours(48),
        )
        .unwrap();
    let result = repo
        .update(&second, UpdateCondition::loaded_at(&second))
        .await;
    assert!(matches!(
        result,
        Err(StoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(2)
    ));
}

#[tokio::test]
#[serial]
async fn update_missing_order_is_not_found() {
    let repo = get_test_repo().await;
    let order = sample_order(UserId::new(), StoreId::new());

    let result = repo
        .update(&order, UpdateCondition::Version(Version::first()))
        .await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[tokio::test]
#[serial]
async fn pickup_token_lookup_and_single_use() {
    let repo = get_test_repo().await;
    let ready = insert_ready(&repo).await;
    let token = ready.pickup_credential().unwrap().token.clone();

    let found = repo.find_by_pickup_token(&token).await.unwrap().unwrap();
    assert_eq!(found.id(), ready.id());
    assert_eq!(found.status(), OrderStatus::Ready);

    let now = Utc::now();
    let mut a = found.clone();
    let mut b = found;
    a.confirm_pickup(&token, now).unwrap();
    b.confirm_pickup(&token, now).unwrap();

    let condition = UpdateCondition::PickupToken {
        token: token.clone(),
        valid_at: now,
        expected: ready.version(),
    };
    let (first, second) = tokio::join!(
        repo.update(&a, condition.clone()),
        repo.update(&b, condition)
    );
    let successes = [first.is_ok(), second.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(successes, 1);

    let stored = repo.get_required(ready.id()).await.unwrap();
    assert_eq!(stored.status(), OrderStatus::Completed);
    assert_eq!(stored.payment_status(), PaymentStatus::Paid);
    assert!(repo.find_by_pickup_token(&token).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn expired_token_condition_fails() {
    let repo = get_test_repo().await;
    let ready = insert_ready(&repo).await;
    let credential = ready.pickup_credential().unwrap().clone();

    let result = repo
        .update(
            &ready,
            UpdateCondition::PickupToken {
                token: credential.token,
                valid_at: credential.expires_at + Duration::seconds(1),
                expected: ready.version(),
            },
        )
        .await;
    assert!(matches!(result, Err(StoreError::CredentialChanged { .. })));
}

#[tokio::test]
#[serial]
async fn token_condition_conflicts_on_stale_version() {
    let repo = get_test_repo().await;
    let ready = insert_ready(&repo).await;
    let token = ready.pickup_credential().unwrap().token.clone();

    let mut paid = ready.clone();
    paid.apply_status_update(
        StatusUpdate::payment(PaymentStatus::Paid),
        Utc::now(),
        Duration::hours(48),
    )
    .unwrap();
    repo.update(&paid, UpdateCondition::loaded_at(&paid))
        .await
        .unwrap();

    let now = Utc::now();
    let mut confirmed = ready.clone();
    confirmed.confirm_pickup(&token, now).unwrap();
    let result = repo
        .update(
            &confirmed,
            UpdateCondition::PickupToken {
                token: token.clone(),
                valid_at: now,
                expected: ready.version(),
            },
        )
        .await;

    assert!(matches!(
        result,
        Err(StoreError::ConcurrencyConflict { actual, .. }) if actual == Version::new(3)
    ));
    let stored = repo.get_required(ready.id()).await.unwrap();
    assert_eq!(stored.status(), OrderStatus::Ready);
    assert_eq!(stored.payment_status(), PaymentStatus::Paid);
}

#[tokio::test]
#[serial]
async fn orders_created_together_list_latest_insert_first() {
    let repo = get_test_repo().await;
    let customer = UserId::new();
    let store = StoreId::new();
    let placed_at = Utc::now();

    let mut ids = Vec::new();
    for _ in 0..4 {
        let order = sample_order_at(customer, store, placed_at);
        repo.insert(&order).await.unwrap();
        ids.push(order.id());
    }

    let listed: Vec<OrderId> = repo
        .query(OrderQuery::for_customer(customer))
        .await
        .unwrap()
        .iter()
        .map(Order::id)
        .collect();
    ids.reverse();
    assert_eq!(listed, ids);
}

#[tokio::test]
#[serial]
async fn query_filters_by_customer_store_and_status() {
    let repo = get_test_repo().await;
    let customer = UserId::new();
    let store = StoreId::new();

    for _ in 0..3 {
        repo.insert(&sample_order(customer, store)).await.unwrap();
    }
    repo.insert(&sample_order(UserId::new(), store))
        .await
        .unwrap();

    let mine = repo.query(OrderQuery::for_customer(customer)).await.unwrap();
    assert_eq!(mine.len(), 3);
    assert!(
        mine.windows(2)
            .all(|w| w[0].created_at() >= w[1].created_at())
    );

    let all_for_store = repo.query(OrderQuery::for_store(store)).await.unwrap();
    assert_eq!(all_for_store.len(), 4);

    let page = repo
        .query(OrderQuery::for_store(store).limit(2).offset(3))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);

    let pending = repo
        .query(OrderQuery::for_store(store).status(OrderStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 4);
    let ready = repo
        .query(OrderQuery::for_store(store).status(OrderStatus::Ready))
        .await
        .unwrap();
    assert!(ready.is_empty());
}
