//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use lifecycle::{BlobStore, Catalog, FsBlobStore, InMemoryBlobStore, InMemoryCatalog};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderRepository, OrderRepository, PostgresOrderRepository};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve<R: OrderRepository + 'static>(
    repo: R,
    catalog: Arc<dyn Catalog>,
    blobs: Arc<dyn BlobStore>,
    metrics_handle: PrometheusHandle,
    config: &Config,
) {
    let state = api::create_default_state(repo, catalog, blobs, config.controller_settings());
    let app = api::create_app(state, metrics_handle, config);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env().expect("invalid configuration");
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Catalog and blob storage
    let catalog: Arc<dyn Catalog> = match &config.catalog_path {
        Some(path) => Arc::new(
            InMemoryCatalog::load(path)
                .await
                .expect("failed to load catalog"),
        ),
        None => {
            tracing::warn!("CATALOG_PATH not set, starting with an empty catalog");
            Arc::new(InMemoryCatalog::new())
        }
    };

    let blobs: Arc<dyn BlobStore> = match &config.blob_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "storing attachments on disk");
            Arc::new(FsBlobStore::new(dir.clone()))
        }
        None => {
            tracing::warn!("BLOB_DIR not set, attachments are kept in memory");
            Arc::new(InMemoryBlobStore::new())
        }
    };

    // 4. Order repository, then serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to database");
            let repo = PostgresOrderRepository::new(pool);
            repo.run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL order repository");
            serve(repo, catalog, blobs, metrics_handle, &config).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            serve(
                InMemoryOrderRepository::new(),
                catalog,
                blobs,
                metrics_handle,
                &config,
            )
            .await;
        }
    }

    tracing::info!("server shut down gracefully");
}
