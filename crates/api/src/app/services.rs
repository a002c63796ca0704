use std::{convert::Infallible, path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use storefront_events::InMemoryEventBus;
use storefront_infra::{
    CoreConfig, LineTransition, OrderError, OrderPlacement, OrderQueries, PlaceOrderRequest,
    StatusEngine,
    directory::{BuyerProfile, InMemoryUserDirectory, PostgresUserDirectory, UserDirectory},
    ledger::{InMemoryStockLedger, PostgresStockLedger, StockLedger},
    notifications::{Notification, NotificationSink, NotificationWorker, TracingSink, WorkerHandle},
    order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore},
};
use storefront_inventory::StockEntry;
use storefront_orders::{IdGenerator, LineOrderId, LineStatus, Order, OrderId, RandomIdGenerator};
use storefront_core::{ProductId, UserId};

use crate::app::dto::SeedData;
use crate::config::{ApiConfig, StoreBackend};

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Forwards order notifications to connected SSE clients.
///
/// Lossy: with no subscriber, or a lagging one, messages are dropped.
#[derive(Debug, Clone)]
pub struct RealtimeSink {
    tx: broadcast::Sender<RealtimeMessage>,
}

impl NotificationSink for RealtimeSink {
    fn deliver(&self, n: &Notification) -> Result<(), String> {
        let _ = self.tx.send(RealtimeMessage {
            topic: n.event_type().to_string(),
            payload: serde_json::json!({
                "eventId": n.event_id(),
                "orderId": n.aggregate_id(),
                "sequenceNumber": n.sequence_number(),
                "occurredAt": n.occurred_at().to_rfc3339(),
                "data": n.payload(),
            }),
        });
        Ok(())
    }
}

type Ledger = Arc<dyn StockLedger>;
type Store = Arc<dyn OrderStore>;
type Directory = Arc<dyn UserDirectory>;
type Bus = Arc<InMemoryEventBus<Notification>>;

/// Concrete stores kept alongside their type-erased views so seed data can
/// be written through them.
enum Backends {
    InMemory {
        ledger: Arc<InMemoryStockLedger>,
        directory: Arc<InMemoryUserDirectory>,
    },
    Postgres {
        ledger: Arc<PostgresStockLedger>,
        directory: Arc<PostgresUserDirectory>,
    },
}

pub struct AppServices {
    placement: OrderPlacement<Ledger, Store, Directory, Bus>,
    engine: StatusEngine<Store, Bus>,
    queries: OrderQueries<Store, Ledger>,
    backends: Backends,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    _workers: Vec<WorkerHandle>,
}

pub async fn build_services(cfg: &ApiConfig) -> anyhow::Result<AppServices> {
    let services = match &cfg.backend {
        StoreBackend::InMemory => AppServices::in_memory(cfg.core.clone())?,
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => build_persistent_services(database_url, *max_connections, cfg.core.clone()).await?,
    };

    if let Some(path) = &cfg.seed_file {
        services.load_seed_file(path).await?;
    }

    Ok(services)
}

async fn build_persistent_services(
    database_url: &str,
    max_connections: u32,
    core: CoreConfig,
) -> anyhow::Result<AppServices> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    let ledger = Arc::new(PostgresStockLedger::new(pool.clone()));
    let store = Arc::new(PostgresOrderStore::new(pool.clone()));
    let directory = Arc::new(PostgresUserDirectory::new(pool));

    ledger.ensure_schema().await.context("stock schema")?;
    directory.ensure_schema().await.context("buyer schema")?;
    store.ensure_schema().await.context("order schema")?;
    tracing::info!("postgres schema ready");

    AppServices::assemble(
        ledger.clone(),
        store,
        directory.clone(),
        Backends::Postgres { ledger, directory },
        Arc::new(RandomIdGenerator),
        core,
    )
}

impl AppServices {
    /// In-memory wiring (dev/test).
    pub fn in_memory(core: CoreConfig) -> anyhow::Result<Self> {
        Self::in_memory_with_ids(core, Arc::new(RandomIdGenerator))
    }

    pub fn in_memory_with_ids(core: CoreConfig, ids: Arc<dyn IdGenerator>) -> anyhow::Result<Self> {
        let ledger = Arc::new(InMemoryStockLedger::new());
        let directory = Arc::new(InMemoryUserDirectory::new());

        Self::assemble(
            ledger.clone(),
            Arc::new(InMemoryOrderStore::new()),
            directory.clone(),
            Backends::InMemory { ledger, directory },
            ids,
            core,
        )
    }

    fn assemble(
        ledger: Ledger,
        store: Store,
        directory: Directory,
        backends: Backends,
        ids: Arc<dyn IdGenerator>,
        core: CoreConfig,
    ) -> anyhow::Result<Self> {
        let bus: Bus = Arc::new(InMemoryEventBus::new());

        // Realtime channel (SSE): lossy broadcast, never back-pressures the core.
        let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

        let workers = vec![
            NotificationWorker::spawn("notifications.log", &bus, TracingSink)
                .context("spawn notification log worker")?,
            NotificationWorker::spawn(
                "notifications.realtime",
                &bus,
                RealtimeSink {
                    tx: realtime_tx.clone(),
                },
            )
            .context("spawn realtime notification worker")?,
        ];

        Ok(Self {
            placement: OrderPlacement::new(
                ledger.clone(),
                store.clone(),
                directory,
                bus.clone(),
                ids,
                core.clone(),
            ),
            engine: StatusEngine::new(store.clone(), bus, core.clone()),
            queries: OrderQueries::new(store, ledger, &core),
            backends,
            realtime_tx,
            _workers: workers,
        })
    }

    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    pub async fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, OrderError> {
        self.placement.place_order(request).await
    }

    pub async fn transition_line(
        &self,
        line_order_id: &LineOrderId,
        status: LineStatus,
    ) -> Result<LineTransition, OrderError> {
        self.engine.transition_line(line_order_id, status).await
    }

    pub async fn transition_order(
        &self,
        order_id: &OrderId,
        status: LineStatus,
    ) -> Result<Order, OrderError> {
        self.engine.transition_order(order_id, status).await
    }

    pub async fn get_order(&self, order_id: &OrderId) -> Result<Order, OrderError> {
        self.queries.get_order(order_id).await
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, OrderError> {
        self.queries.list_orders().await
    }

    pub async fn list_orders_by_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, OrderError> {
        self.queries.list_orders_by_buyer(buyer_id).await
    }

    pub async fn stock(&self, product_id: ProductId) -> Result<StockEntry, OrderError> {
        self.queries.stock(product_id).await
    }

    /// Insert or replace a product's stock record.
    pub async fn seed_stock(&self, entry: StockEntry) -> anyhow::Result<()> {
        match &self.backends {
            Backends::InMemory { ledger, .. } => ledger.put(entry)?,
            Backends::Postgres { ledger, .. } => ledger.put(&entry).await?,
        }
        Ok(())
    }

    /// Insert or replace a buyer profile.
    pub async fn seed_buyer(&self, profile: BuyerProfile) -> anyhow::Result<()> {
        match &self.backends {
            Backends::InMemory { directory, .. } => directory.put(profile)?,
            Backends::Postgres { directory, .. } => directory.put(&profile).await?,
        }
        Ok(())
    }

    async fn load_seed_file(&self, path: &Path) -> anyhow::Result<()> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read seed file {}", path.display()))?;
        let seed: SeedData = serde_json::from_str(&raw)
            .with_context(|| format!("parse seed file {}", path.display()))?;

        let (products, buyers) = (seed.products.len(), seed.buyers.len());
        for product in seed.products {
            self.seed_stock(product.into()).await?;
        }
        for buyer in seed.buyers {
            self.seed_buyer(buyer).await?;
        }

        tracing::info!(products, buyers, path = %path.display(), "seed data loaded");
        Ok(())
    }
}

/// Build the SSE stream of order notifications (used by `/orders/stream`).
pub fn order_sse_stream(
    services: Arc<AppServices>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(m) => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        // Lagged receiver: skip what was missed.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
