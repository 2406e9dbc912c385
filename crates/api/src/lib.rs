//! HTTP API for the print shop order engine.
//!
//! Exposes order placement, status management and pickup confirmation over
//! REST, pushes notifications over SSE, and serves structured logs (tracing)
//! and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use lifecycle::{BlobStore, Catalog, ControllerSettings, OrderController, PresenceDirectory};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderRepository;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<R: OrderRepository + 'static>(
    state: Arc<AppState<R>>,
    metrics_handle: PrometheusHandle,
    config: &Config,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route("/orders", post(routes::orders::create::<R>))
        .route("/orders/mine", get(routes::orders::mine::<R>))
        .route(
            "/orders/store/{store_id}",
            get(routes::orders::store_orders::<R>),
        )
        .route("/orders/{id}", get(routes::orders::get::<R>))
        .route(
            "/orders/{id}/status",
            patch(routes::orders::update_status::<R>),
        )
        .route(
            "/orders/{id}/files/{file_id}",
            get(routes::orders::download_file::<R>),
        )
        .route(
            "/orders/pickup/{token}/confirm",
            get(routes::pickup::confirm::<R>).post(routes::pickup::confirm::<R>),
        )
        .route(
            "/notifications/stream",
            get(routes::notifications::stream::<R>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state. The presence directory doubles as the
/// controller's notification publisher.
pub fn create_default_state<R: OrderRepository + 'static>(
    repo: R,
    catalog: Arc<dyn Catalog>,
    blobs: Arc<dyn BlobStore>,
    settings: ControllerSettings,
) -> Arc<AppState<R>> {
    let presence = PresenceDirectory::new();
    let controller = OrderController::new(repo, catalog, blobs, Arc::new(presence.clone()))
        .with_settings(settings);
    Arc::new(AppState {
        controller,
        presence,
    })
}
