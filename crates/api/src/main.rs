//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{Backends, Bus, Cache};
use doc_store::PostgresDocumentStore;
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
    let registry = tracing_subscriber::registry().with(EnvFilter::new(&config.log_level));
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn connect_backends(config: &Config) -> Backends {
    let mut backends = Backends::in_memory();

    if let Some(url) = &config.database_url {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .expect("failed to connect to PostgreSQL");
        let store = PostgresDocumentStore::new(pool);
        store
            .run_migrations()
            .await
            .expect("failed to run migrations");
        tracing::info!("using PostgreSQL document store");
        backends.store = Arc::new(store);
    }

    if let Some(url) = &config.redis_url {
        match redis_backends(url) {
            Some((cache, bus)) => {
                tracing::info!("using Redis cache and event bus");
                backends.cache = cache;
                backends.bus = bus;
            }
            None => tracing::warn!(
                "REDIS_URL is set but the redis feature is disabled; using in-memory cache and bus"
            ),
        }
    }

    backends
}

#[cfg(feature = "redis")]
fn redis_backends(url: &str) -> Option<(Cache, Bus)> {
    let cache = doc_store::RedisExpiringCache::new(url).expect("invalid REDIS_URL");
    let bus = event_bus::RedisPubSubEventBus::new(url).expect("invalid REDIS_URL");
    Some((Arc::new(cache), Arc::new(bus)))
}

#[cfg(not(feature = "redis"))]
fn redis_backends(_url: &str) -> Option<(Cache, Bus)> {
    None
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);
    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET is not set; using the development secret");
    }

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Connect backends and wire the hosted services
    let backends = connect_backends(&config).await;
    let services = api::build_services(&config, backends)
        .await
        .expect("failed to start services");

    // 4. Build the application
    let app = api::create_app(&services, metrics_handle, config.request_timeout());

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, service = ?config.service, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    services.shutdown();
    tracing::info!("server shut down gracefully");
}
