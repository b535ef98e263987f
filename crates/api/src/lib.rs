//! HTTP server for order placement and inventory reservations.
//!
//! Serves the reservation surface used by the saga's remote client, the
//! order endpoints that dispatch the `CreateOrder` saga, and health and
//! Prometheus endpoints. Storage is either in memory or PostgreSQL, chosen
//! at start-up through a [`Backend`].

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use event_bus::InMemoryEventBus;
use event_ledger::{EventLedger, IdempotentProcessor, InMemoryEventLedger, PostgresEventLedger};
use inventory::{
    ExpirySweeper, InMemoryReservationEngine, InventoryService, OrderEventsConsumer,
    PostgresReservationEngine, ReservationEngine,
};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{InMemoryOrderRepository, OrderRepository, PostgresOrderRepository};
use saga::{
    HttpInventoryClient, InMemorySagaRepository, InventoryClient, LocalInventoryClient,
    OrderPlacement, PostgresSagaRepository, SagaOrchestrator, SagaRepository, SagaServices,
};
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::StartupError;

/// Storage stack the server runs on.
pub trait Backend: Send + Sync + 'static {
    /// Name reported by the health endpoint.
    const NAME: &'static str;

    type Engine: ReservationEngine + 'static;
    type Sagas: SagaRepository + 'static;
    type Orders: OrderRepository + 'static;
    type Ledger: EventLedger + Clone + 'static;
}

/// In-memory stores; state is lost on restart.
pub struct MemoryBackend;

impl Backend for MemoryBackend {
    const NAME: &'static str = "memory";
    type Engine = InMemoryReservationEngine;
    type Sagas = InMemorySagaRepository;
    type Orders = InMemoryOrderRepository;
    type Ledger = InMemoryEventLedger;
}

/// PostgreSQL stores sharing one pool.
pub struct PostgresBackend;

impl Backend for PostgresBackend {
    const NAME: &'static str = "postgres";
    type Engine = PostgresReservationEngine;
    type Sagas = PostgresSagaRepository;
    type Orders = PostgresOrderRepository;
    type Ledger = PostgresEventLedger;
}

/// Concrete stores of one backend.
pub struct Stores<B: Backend> {
    pub engine: Arc<B::Engine>,
    pub sagas: Arc<B::Sagas>,
    pub orders: Arc<B::Orders>,
    pub ledger: B::Ledger,
}

impl Stores<MemoryBackend> {
    pub fn in_memory(config: &Config) -> Self {
        Self {
            engine: Arc::new(InMemoryReservationEngine::new().with_ttl(config.reservation_ttl())),
            sagas: Arc::new(InMemorySagaRepository::new()),
            orders: Arc::new(InMemoryOrderRepository::new()),
            ledger: InMemoryEventLedger::new(),
        }
    }
}

impl Stores<PostgresBackend> {
    pub fn postgres(pool: PgPool, config: &Config) -> Self {
        Self {
            engine: Arc::new(
                PostgresReservationEngine::new(pool.clone()).with_ttl(config.reservation_ttl()),
            ),
            sagas: Arc::new(PostgresSagaRepository::new(pool.clone())),
            orders: Arc::new(PostgresOrderRepository::new(pool.clone())),
            ledger: PostgresEventLedger::new(pool),
        }
    }
}

/// Inventory client handed to the saga: in-process or remote.
pub type DynInventoryClient = Arc<dyn InventoryClient>;

/// Shared application state accessible from all handlers.
pub struct AppState<B: Backend> {
    pub inventory: InventoryService<B::Engine, InMemoryEventBus>,
    pub placement: OrderPlacement<B::Sagas, DynInventoryClient, B::Orders, InMemoryEventBus>,
    pub bus: Arc<InMemoryEventBus>,
    pub ledger: B::Ledger,
}

impl<B: Backend> AppState<B> {
    /// Wires the services of one backend together.
    pub fn new(config: &Config, stores: Stores<B>) -> Result<Self, StartupError> {
        let bus = Arc::new(
            InMemoryEventBus::with_partitions(config.bus_partitions)
                .with_retention(config.bus_retention),
        );
        let inventory = InventoryService::new(stores.engine, Arc::clone(&bus));

        let client: DynInventoryClient = match &config.inventory_service_url {
            Some(url) => {
                tracing::info!(%url, "using remote inventory service");
                Arc::new(HttpInventoryClient::with_timeout(url.as_str(), config.step_timeout)?)
            }
            None => Arc::new(LocalInventoryClient::new(inventory.clone())),
        };

        let services = SagaServices::new(Arc::new(client), stores.orders, Arc::clone(&bus));
        let orchestrator =
            SagaOrchestrator::new(stores.sagas, services).with_step_timeout(config.step_timeout);
        let placement =
            OrderPlacement::new(orchestrator).with_lookup_timeout(config.lookup_timeout);

        Ok(Self {
            inventory,
            placement,
            bus,
            ledger: stores.ledger,
        })
    }

    /// Gets the order store.
    pub fn orders(&self) -> &B::Orders {
        &self.placement.orchestrator().services().orders
    }

    /// Subscribes the inventory consumers and starts the expiry sweeper.
    pub async fn start_background(
        &self,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, StartupError> {
        let consumer = OrderEventsConsumer::new(
            self.inventory.clone(),
            IdempotentProcessor::new(self.ledger.clone()),
        );
        consumer.subscribe(self.bus.as_ref()).await?;

        let sweeper = ExpirySweeper::with_interval(self.inventory.clone(), config.sweep_interval);
        Ok(sweeper.spawn(shutdown))
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<B: Backend>(state: Arc<AppState<B>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<B>))
        .route("/orders", post(routes::orders::create::<B>))
        .route("/orders/{id}", get(routes::orders::get::<B>))
        .route("/orders/{id}/saga", get(routes::orders::saga::<B>))
        .route("/orders/user/{user_id}", get(routes::orders::by_user::<B>))
        .route("/inventory/reserve", post(routes::inventory::reserve::<B>))
        .route("/inventory/release", post(routes::inventory::release::<B>))
        .route("/inventory/commit", post(routes::inventory::commit::<B>))
        .route(
            "/inventory/products",
            get(routes::inventory::list_products::<B>).post(routes::inventory::create_product::<B>),
        )
        .route(
            "/inventory/products/{id}",
            get(routes::inventory::get_product::<B>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
