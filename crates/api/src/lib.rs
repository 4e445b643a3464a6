//! HTTP edge for the storefront services, with observability.
//!
//! One binary hosts identity, catalog and fulfillment together or any one of
//! them alone. Co-located services call each other in-process; separated
//! ones go through the HTTP clients in [`clients`]. Every request gets a
//! [`Deadline`](common::Deadline) at the edge, and structured logs and
//! Prometheus metrics cover all of it.

pub mod clients;
pub mod config;
pub mod deadline;
pub mod error;
pub mod relay;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use catalog::{AuthorizationDelegate, CatalogService, FulfillmentListener};
use common::RoleResolver;
use doc_store::{DocumentStore, ExpiringCache, InMemoryDocumentStore, InMemoryExpiringCache};
use event_bus::{EventBus, InMemoryEventBus};
use fulfillment::{FulfillmentCoordinator, InventoryMutator, ProcessedListener};
use identity::{BcryptHasher, IdentityService, LocalRoleResolver, LogMailer, Mailer, TokenAuthority};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use clients::{LocalInventory, RemoteInventoryClient, RemoteRoleResolver};
use config::Config;
use error::BootError;
use routes::orders::OrdersState;

pub type Store = Arc<dyn DocumentStore>;
pub type Cache = Arc<dyn ExpiringCache>;
pub type Bus = Arc<dyn EventBus>;
pub type Resolver = Arc<dyn RoleResolver>;
pub type Inventory = Arc<dyn InventoryMutator>;

pub type Identity = IdentityService<Store, Cache, BcryptHasher, Arc<dyn Mailer>>;
pub type Catalog = CatalogService<Store, Resolver, Bus>;
pub type Fulfillment = FulfillmentCoordinator<Store, Inventory, Bus>;

/// Storage, cache, bus and mail backends shared by the hosted services.
#[derive(Clone)]
pub struct Backends {
    pub store: Store,
    pub cache: Cache,
    pub bus: Bus,
    pub mailer: Arc<dyn Mailer>,
}

impl Backends {
    /// Everything in memory, mail to the log.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryDocumentStore::new()),
            cache: Arc::new(InMemoryExpiringCache::new()),
            bus: Arc::new(InMemoryEventBus::new()),
            mailer: Arc::new(LogMailer),
        }
    }
}

/// The services hosted by this process, plus their background tasks.
pub struct Services {
    pub identity: Option<Arc<Identity>>,
    pub catalog: Option<Arc<Catalog>>,
    pub orders: Option<OrdersState>,
    pub background: Vec<JoinHandle<()>>,
}

impl Services {
    /// Stops listeners and the outbox relay.
    pub fn shutdown(self) {
        for task in self.background {
            task.abort();
        }
    }
}

/// Wires the services selected by `config.service` over `backends`.
///
/// Identity bootstraps the configured admin account. Catalog and fulfillment
/// start their bus listeners before this returns.
pub async fn build_services(config: &Config, backends: Backends) -> Result<Services, BootError> {
    let mode = config.service;
    let http = reqwest::Client::builder().build()?;
    let tokens = TokenAuthority::new(config.token_config(), backends.cache.clone());
    let mut background = Vec::new();

    let identity = if mode.hosts_identity() {
        let service = IdentityService::new(
            backends.store.clone(),
            tokens.clone(),
            BcryptHasher::new(config.bcrypt_cost),
            backends.mailer.clone(),
        )
        .with_public_url(config.public_url.clone());

        if let Some((email, password)) = config.admin_credentials() {
            let admin = service
                .ensure_admin(&config.admin_name, email, password)
                .await?;
            tracing::info!(user_id = %admin.id, email = %admin.email, "bootstrap admin ready");
        }
        Some(Arc::new(service))
    } else {
        None
    };

    let resolver: Resolver = if mode.hosts_identity() {
        Arc::new(LocalRoleResolver::new(tokens))
    } else {
        Arc::new(RemoteRoleResolver::new(http.clone(), &config.identity_url)?)
    };

    let catalog = if mode.hosts_catalog() {
        let service = Arc::new(CatalogService::new(
            backends.store.clone(),
            resolver.clone(),
            backends.bus.clone(),
        ));
        background.push(
            FulfillmentListener::new(backends.store.clone(), backends.bus.clone())
                .start()
                .await?,
        );
        Some(service)
    } else {
        None
    };

    let orders = if mode.hosts_fulfillment() {
        let inventory: Inventory = match &catalog {
            Some(catalog) => Arc::new(LocalInventory::new(catalog.clone())),
            None => Arc::new(RemoteInventoryClient::new(http, &config.catalog_url)?),
        };
        let coordinator = Arc::new(FulfillmentCoordinator::new(
            backends.store.clone(),
            inventory,
            backends.bus.clone(),
        ));
        background.push(ProcessedListener::new(backends.bus.clone()).start().await?);
        if let Some(every) = config.outbox_retry_interval() {
            background.push(relay::spawn_outbox_relay(
                coordinator.clone(),
                every,
                config.request_timeout(),
            ));
        }
        Some(OrdersState {
            coordinator,
            admin: AuthorizationDelegate::admin_only(resolver),
        })
    } else {
        None
    };

    tracing::info!(
        identity = identity.is_some(),
        catalog = catalog.is_some(),
        fulfillment = orders.is_some(),
        "services ready"
    );
    Ok(Services {
        identity,
        catalog,
        orders,
        background,
    })
}

/// Creates the Axum application router for the hosted services.
pub fn create_app(
    services: &Services,
    metrics_handle: PrometheusHandle,
    request_timeout: Duration,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let mut app = Router::new()
        .route("/health", get(routes::health::check))
        .merge(metrics_router);

    if let Some(identity) = &services.identity {
        app = app.merge(
            Router::new()
                .route("/identity/register", post(routes::identity::register))
                .route("/identity/login", post(routes::identity::login))
                .route("/identity/activate", post(routes::identity::activate))
                .route(
                    "/identity/forgot-password",
                    post(routes::identity::forgot_password),
                )
                .route(
                    "/identity/reset-password",
                    post(routes::identity::reset_password),
                )
                .route("/identity/refresh", post(routes::identity::refresh))
                .route("/identity/logout", post(routes::identity::logout))
                .route("/identity/me", get(routes::identity::me))
                .with_state(identity.clone()),
        );
    }

    if let Some(catalog) = &services.catalog {
        app = app.merge(
            Router::new()
                .route(
                    "/catalog/products",
                    post(routes::catalog::create).get(routes::catalog::list),
                )
                .route("/catalog/products/search", get(routes::catalog::search))
                .route(
                    "/catalog/products/{id}",
                    get(routes::catalog::get)
                        .patch(routes::catalog::update)
                        .delete(routes::catalog::delete),
                )
                .route(
                    "/catalog/products/{id}/stock",
                    post(routes::catalog::change_stock),
                )
                .with_state(catalog.clone()),
        );
    }

    if let Some(orders) = &services.orders {
        app = app.merge(
            Router::new()
                .route(
                    "/orders",
                    post(routes::orders::create).get(routes::orders::list),
                )
                .route("/orders/adjustments/retry", post(routes::orders::retry))
                .route("/orders/{id}", get(routes::orders::get))
                .route("/orders/{id}/cancel", post(routes::orders::cancel))
                .route("/orders/{id}/approve", post(routes::orders::approve))
                .with_state(orders.clone()),
        );
    }

    app.layer(axum::middleware::from_fn_with_state(
        request_timeout,
        deadline::assign,
    ))
    .layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(TraceLayer::new_for_http())
}
