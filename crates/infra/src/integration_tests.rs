//! End-to-end checks of placement and status changes against the in-memory
//! stores, run on a multi-threaded runtime so reservations genuinely race.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use storefront_core::{AggregateRoot, ExpectedVersion, ProductId, ReservationId, UserId};
use storefront_events::{EventBus, InMemoryEventBus};
use storefront_inventory::{Reservation, StockEntry};
use storefront_orders::{
    IdGenerator, LineOrderId, LineStatus, Order, OrderId, OrderStatus, RandomIdGenerator,
    SequentialIdGenerator,
};

use crate::config::CoreConfig;
use crate::directory::{BuyerProfile, InMemoryUserDirectory};
use crate::error::{ErrorKind, OrderError};
use crate::fixtures;
use crate::fulfillment::StatusEngine;
use crate::ledger::{InMemoryStockLedger, LedgerError, Release, StockLedger};
use crate::notifications::Notification;
use crate::order_store::{InMemoryOrderStore, OrderStore, OrderStoreError};
use crate::placement::{OrderPlacement, PlaceOrderRequest, RequestedLine};

type Bus = Arc<InMemoryEventBus<Notification>>;
type Directory = Arc<InMemoryUserDirectory>;

struct World<L, S> {
    ledger: L,
    store: S,
    bus: Bus,
    buyer: UserId,
    placement: Arc<OrderPlacement<L, S, Directory, Bus>>,
}

fn world_with<L, S>(ledger: L, store: S, ids: Arc<dyn IdGenerator>, config: CoreConfig) -> World<L, S>
where
    L: StockLedger + Clone,
    S: OrderStore + Clone,
{
    let directory = Arc::new(InMemoryUserDirectory::new());
    let buyer = UserId::new();
    directory
        .put(BuyerProfile::new(buyer).with_address(fixtures::shipping()))
        .unwrap();
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    let placement = Arc::new(OrderPlacement::new(
        ledger.clone(),
        store.clone(),
        directory,
        bus.clone(),
        ids,
        config,
    ));

    World {
        ledger,
        store,
        bus,
        buyer,
        placement,
    }
}

fn world() -> World<Arc<InMemoryStockLedger>, Arc<InMemoryOrderStore>> {
    world_with(
        Arc::new(InMemoryStockLedger::new()),
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(RandomIdGenerator),
        CoreConfig::default(),
    )
}

fn stocked(ledger: &InMemoryStockLedger, quantity: u32) -> ProductId {
    let p = ProductId::new();
    ledger.put(StockEntry::new(p, quantity, 1_250)).unwrap();
    p
}

fn order_for(buyer_id: UserId, lines: &[(ProductId, u32)]) -> PlaceOrderRequest {
    PlaceOrderRequest {
        buyer_id,
        lines: lines
            .iter()
            .map(|&(product_id, quantity)| RequestedLine {
                product_id,
                quantity,
            })
            .collect(),
        shipping: Some(fixtures::shipping()),
    }
}

async fn quantity_of<L: StockLedger>(ledger: &L, p: ProductId) -> u32 {
    ledger.product(p).await.unwrap().quantity()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_placements_never_oversell() {
    let w = world();
    let p = stocked(&w.ledger, 10);

    let mut tasks = Vec::new();
    for _ in 0..40 {
        let placement = w.placement.clone();
        let req = order_for(w.buyer, &[(p, 1)]);
        tasks.push(tokio::spawn(async move { placement.place_order(req).await }));
    }

    let mut placed = 0;
    for t in tasks {
        match t.await.unwrap() {
            Ok(_) => placed += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::OutOfStock),
        }
    }

    assert_eq!(placed, 10);
    let entry = w.ledger.product(p).await.unwrap();
    assert_eq!(entry.quantity(), 0);
    assert!(!entry.available());
    assert_eq!(w.store.list_all().await.unwrap().len(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_orders_for_two_of_three_units() {
    let w = world();
    let p = stocked(&w.ledger, 3);

    let (a, b) = tokio::join!(
        {
            let placement = w.placement.clone();
            let req = order_for(w.buyer, &[(p, 2)]);
            tokio::spawn(async move { placement.place_order(req).await })
        },
        {
            let placement = w.placement.clone();
            let req = order_for(w.buyer, &[(p, 2)]);
            tokio::spawn(async move { placement.place_order(req).await })
        }
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    let failure = outcomes.iter().find_map(|o| o.as_ref().err()).unwrap();
    assert!(matches!(
        failure,
        OrderError::OutOfStock { requested: 2, available: 1, .. }
    ));
    assert_eq!(quantity_of(&w.ledger, p).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_line_releases_the_others() {
    let w = world();
    let a = stocked(&w.ledger, 5);
    let b = stocked(&w.ledger, 0);

    let err = w
        .placement
        .place_order(order_for(w.buyer, &[(a, 1), (b, 1)]))
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::OutOfStock { product_id, .. } if product_id == b));
    assert_eq!(quantity_of(&w.ledger, a).await, 5);
    assert!(w.ledger.product(a).await.unwrap().available());
    assert!(w.store.list_all().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn ten_thousand_concurrent_orders_get_distinct_ids() {
    let w = world();
    let p = stocked(&w.ledger, 10_000);

    let mut tasks = Vec::with_capacity(10_000);
    for _ in 0..10_000 {
        let placement = w.placement.clone();
        let req = order_for(w.buyer, &[(p, 1)]);
        tasks.push(tokio::spawn(async move { placement.place_order(req).await }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }

    let stored = w.store.list_all().await.unwrap();
    assert_eq!(stored.len(), 10_000);

    let order_ids: HashSet<&OrderId> = stored.iter().map(|o| o.order_id()).collect();
    let line_ids: HashSet<&LineOrderId> = stored
        .iter()
        .flat_map(|o| o.line_items())
        .map(|l| l.line_order_id())
        .collect();
    assert_eq!(order_ids.len(), 10_000);
    assert_eq!(line_ids.len(), 10_000);
    assert_eq!(quantity_of(&w.ledger, p).await, 0);
}

fn engine<S: OrderStore>(store: S, bus: Bus) -> StatusEngine<S, Bus> {
    StatusEngine::new(store, bus, CoreConfig::default())
}

#[tokio::test(flavor = "multi_thread")]
async fn order_status_follows_least_advanced_open_line() {
    let w = world();
    let p = stocked(&w.ledger, 10);
    let q = stocked(&w.ledger, 10);
    let order = w
        .placement
        .place_order(order_for(w.buyer, &[(p, 1), (q, 1)]))
        .await
        .unwrap();
    let lines: Vec<LineOrderId> = order
        .line_items()
        .iter()
        .map(|l| l.line_order_id().clone())
        .collect();
    let engine = engine(w.store.clone(), w.bus.clone());

    engine.transition_line(&lines[0], LineStatus::Delivered).await.unwrap();
    let out = engine.transition_line(&lines[1], LineStatus::Shipped).await.unwrap();
    assert_eq!(out.order_status, OrderStatus::Shipped);

    let out = engine.transition_line(&lines[1], LineStatus::Delivered).await.unwrap();
    assert_eq!(out.order_status, OrderStatus::Delivered);
}

#[tokio::test(flavor = "multi_thread")]
async fn mixed_terminal_lines_report_partially_delivered() {
    let w = world();
    let p = stocked(&w.ledger, 10);
    let order = w
        .placement
        .place_order(order_for(w.buyer, &[(p, 1), (p, 2)]))
        .await
        .unwrap();
    let engine = engine(w.store.clone(), w.bus.clone());

    let first = order.line_items()[0].line_order_id();
    let second = order.line_items()[1].line_order_id();
    engine.transition_line(first, LineStatus::Delivered).await.unwrap();
    let out = engine.transition_line(second, LineStatus::Cancelled).await.unwrap();

    assert_eq!(out.order_status, OrderStatus::PartiallyDelivered);
}

#[tokio::test(flavor = "multi_thread")]
async fn tracking_history_is_append_only_and_ordered() {
    let w = world();
    let p = stocked(&w.ledger, 1);
    let order = w
        .placement
        .place_order(order_for(w.buyer, &[(p, 1)]))
        .await
        .unwrap();
    let line_id = order.line_items()[0].line_order_id().clone();
    let engine = engine(w.store.clone(), w.bus.clone());

    engine.transition_line(&line_id, LineStatus::Confirmed).await.unwrap();
    let out = engine.transition_line(&line_id, LineStatus::Shipped).await.unwrap();

    let history = out.line.tracking_history();
    let statuses: Vec<LineStatus> = history.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![LineStatus::Pending, LineStatus::Confirmed, LineStatus::Shipped]
    );
    assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_line_changes_all_land() {
    let w = world();
    let p = stocked(&w.ledger, 10);
    let order = w
        .placement
        .place_order(order_for(w.buyer, &[(p, 1), (p, 1), (p, 1), (p, 1)]))
        .await
        .unwrap();

    let config = CoreConfig {
        conflict_retry_attempts: 50,
        ..CoreConfig::default()
    };
    let engine = Arc::new(StatusEngine::new(w.store.clone(), w.bus.clone(), config));

    let mut tasks = Vec::new();
    for line in order.line_items() {
        let engine = engine.clone();
        let id = line.line_order_id().clone();
        tasks.push(tokio::spawn(async move {
            engine.transition_line(&id, LineStatus::Shipped).await
        }));
    }
    for t in tasks {
        t.await.unwrap().unwrap();
    }

    let stored = w.store.load(order.order_id()).await.unwrap().unwrap();
    assert_eq!(stored.version(), 5);
    assert!(
        stored
            .line_items()
            .iter()
            .all(|l| l.status() == LineStatus::Shipped && l.tracking_history().len() == 2)
    );
}

/// Order store whose first `conflicts` updates lose the version race.
#[derive(Clone)]
struct Contended {
    inner: Arc<InMemoryOrderStore>,
    conflicts: Arc<AtomicU32>,
}

#[async_trait]
impl OrderStore for Contended {
    async fn insert(&self, order: &Order) -> Result<(), OrderStoreError> {
        self.inner.insert(order).await
    }

    async fn load(&self, order_id: &OrderId) -> Result<Option<Order>, OrderStoreError> {
        self.inner.load(order_id).await
    }

    async fn find_by_line(&self, line_order_id: &LineOrderId) -> Result<Option<Order>, OrderStoreError> {
        self.inner.find_by_line(line_order_id).await
    }

    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), OrderStoreError> {
        let lose = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if lose {
            return Err(OrderStoreError::Concurrency("simulated race".to_string()));
        }
        self.inner.update(order, expected).await
    }

    async fn list_all(&self) -> Result<Vec<Order>, OrderStoreError> {
        self.inner.list_all().await
    }

    async fn list_by_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, OrderStoreError> {
        self.inner.list_by_buyer(buyer_id).await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn lost_race_is_retried_then_reported_as_conflict() {
    let inner = Arc::new(InMemoryOrderStore::new());
    let order = fixtures::placed_order(&SequentialIdGenerator::new(), UserId::new(), 1);
    inner.insert(&order).await.unwrap();
    let line_id = order.line_items()[0].line_order_id().clone();
    let bus: Bus = Arc::new(InMemoryEventBus::new());

    // Two lost races fit inside the default three attempts.
    let store = Contended {
        inner: inner.clone(),
        conflicts: Arc::new(AtomicU32::new(2)),
    };
    let out = engine(store, bus.clone())
        .transition_line(&line_id, LineStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(out.line.status(), LineStatus::Confirmed);

    let store = Contended {
        inner: inner.clone(),
        conflicts: Arc::new(AtomicU32::new(u32::MAX)),
    };
    let err = engine(store, bus)
        .transition_line(&line_id, LineStatus::Shipped)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let stored = inner.load(order.order_id()).await.unwrap().unwrap();
    assert_eq!(stored.line_items()[0].status(), LineStatus::Confirmed);
}

/// Hands out `taken` as the order id for the first `repeats` calls.
struct CollidingIds {
    taken: OrderId,
    repeats: AtomicU32,
    fresh: SequentialIdGenerator,
}

impl IdGenerator for CollidingIds {
    fn new_order_id(&self) -> OrderId {
        let collide = self
            .repeats
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if collide {
            self.taken.clone()
        } else {
            self.fresh.new_order_id()
        }
    }

    fn new_line_id(&self, order_id: &OrderId, product_id: ProductId) -> LineOrderId {
        self.fresh.new_line_id(order_id, product_id)
    }
}

async fn colliding_world(
    repeats: u32,
) -> (World<Arc<InMemoryStockLedger>, Arc<InMemoryOrderStore>>, OrderId) {
    let store = Arc::new(InMemoryOrderStore::new());
    let existing = fixtures::placed_order(&SequentialIdGenerator::new(), UserId::new(), 1);
    store.insert(&existing).await.unwrap();

    let ids = CollidingIds {
        taken: existing.order_id().clone(),
        repeats: AtomicU32::new(repeats),
        fresh: SequentialIdGenerator::starting_at(500_000_000_000),
    };
    let w = world_with(
        Arc::new(InMemoryStockLedger::new()),
        store,
        Arc::new(ids),
        CoreConfig::default(),
    );
    (w, existing.order_id().clone())
}

#[tokio::test(flavor = "multi_thread")]
async fn id_collision_is_reminted() {
    let (w, taken) = colliding_world(2).await;
    let p = stocked(&w.ledger, 4);

    let order = w
        .placement
        .place_order(order_for(w.buyer, &[(p, 1)]))
        .await
        .unwrap();

    assert_ne!(order.order_id(), &taken);
    assert_eq!(w.store.list_all().await.unwrap().len(), 2);
    assert_eq!(quantity_of(&w.ledger, p).await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_id_attempts_release_stock() {
    let (w, _) = colliding_world(u32::MAX).await;
    let p = stocked(&w.ledger, 4);

    let err = w
        .placement
        .place_order(order_for(w.buyer, &[(p, 2)]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(quantity_of(&w.ledger, p).await, 4);
    assert_eq!(w.store.list_all().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn saturated_id_generator_fails_cleanly() {
    let w = world_with(
        Arc::new(InMemoryStockLedger::new()),
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(SequentialIdGenerator::starting_at(999_999_999_999)),
        CoreConfig::default(),
    );
    let p = stocked(&w.ledger, 4);

    let first = w
        .placement
        .place_order(order_for(w.buyer, &[(p, 1)]))
        .await
        .unwrap();
    assert_eq!(first.order_id().as_str(), "#3b999999999999");

    let err = w
        .placement
        .place_order(order_for(w.buyer, &[(p, 1)]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(quantity_of(&w.ledger, p).await, 3);
    assert_eq!(w.store.list_all().await.unwrap().len(), 1);
}

/// When a slow reservation's work actually happens relative to its caller
/// giving up.
#[derive(Clone, Copy)]
enum Lag {
    /// Never applied: the call is dropped while still waiting.
    BeforeApply,
    /// Applied at once, but the answer never arrives in time.
    AfterApply,
    /// Applied by the backend well after the caller has moved on.
    Detached,
}

/// Ledger whose reservations for one product never answer in time.
#[derive(Clone)]
struct SlowLedger {
    inner: Arc<InMemoryStockLedger>,
    slow: ProductId,
    lag: Lag,
}

#[async_trait]
impl StockLedger for SlowLedger {
    async fn product(&self, product_id: ProductId) -> Result<StockEntry, LedgerError> {
        self.inner.product(product_id).await
    }

    async fn reserve(
        &self,
        key: ReservationId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation, LedgerError> {
        if product_id != self.slow {
            return self.inner.reserve(key, product_id, quantity).await;
        }
        match self.lag {
            Lag::BeforeApply => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                self.inner.reserve(key, product_id, quantity).await
            }
            Lag::AfterApply => {
                let reservation = self.inner.reserve(key, product_id, quantity).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
                reservation
            }
            Lag::Detached => {
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    let _ = inner.reserve(key, product_id, quantity).await;
                });
                std::future::pending().await
            }
        }
    }

    async fn release(
        &self,
        key: ReservationId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Release, LedgerError> {
        self.inner.release(key, product_id, quantity).await
    }
}

type SlowWorld = World<SlowLedger, Arc<InMemoryOrderStore>>;

/// A world with two stocked products, the second one slow.
fn slow_world(lag: Lag, stock: u32) -> (SlowWorld, Arc<InMemoryStockLedger>, ProductId, ProductId) {
    let inner = Arc::new(InMemoryStockLedger::new());
    let ok = stocked(&inner, stock);
    let slow = stocked(&inner, stock);
    let ledger = SlowLedger {
        inner: inner.clone(),
        slow,
        lag,
    };
    let config = CoreConfig {
        store_timeout: Duration::from_millis(50),
        ..CoreConfig::default()
    };
    let w = world_with(
        ledger,
        Arc::new(InMemoryOrderStore::new()),
        Arc::new(RandomIdGenerator),
        config,
    );
    (w, inner, ok, slow)
}

#[tokio::test(flavor = "multi_thread")]
async fn reserve_timeout_compensates_earlier_lines() {
    let (w, inner, ok, slow) = slow_world(Lag::BeforeApply, 5);

    let err = w
        .placement
        .place_order(order_for(w.buyer, &[(ok, 2), (slow, 1)]))
        .await
        .unwrap_err();

    assert!(matches!(&err, OrderError::Persistence(msg) if msg.contains("reserve timed out")));
    assert_eq!(quantity_of(&inner, ok).await, 5);
    assert_eq!(quantity_of(&inner, slow).await, 5);
    assert!(w.store.list_all().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn reserve_that_landed_before_timing_out_is_released() {
    let (w, inner, ok, slow) = slow_world(Lag::AfterApply, 5);

    let err = w
        .placement
        .place_order(order_for(w.buyer, &[(ok, 1), (slow, 1)]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(quantity_of(&inner, ok).await, 5);
    assert_eq!(quantity_of(&inner, slow).await, 5);
    assert!(w.store.list_all().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn reserve_landing_after_compensation_is_refused() {
    let (w, inner, _, slow) = slow_world(Lag::Detached, 5);

    let err = w
        .placement
        .place_order(order_for(w.buyer, &[(slow, 2)]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);

    // Give the detached reserve time to reach the ledger.
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(quantity_of(&inner, slow).await, 5);
    assert!(w.store.list_all().await.unwrap().is_empty());
}

/// Order store whose inserts always fail at the backend.
#[derive(Clone)]
struct BrokenInserts(Arc<InMemoryOrderStore>, Arc<AtomicBool>);

#[async_trait]
impl OrderStore for BrokenInserts {
    async fn insert(&self, _order: &Order) -> Result<(), OrderStoreError> {
        self.1.store(true, Ordering::SeqCst);
        Err(OrderStoreError::Backend("connection reset".to_string()))
    }

    async fn load(&self, order_id: &OrderId) -> Result<Option<Order>, OrderStoreError> {
        self.0.load(order_id).await
    }

    async fn find_by_line(&self, line_order_id: &LineOrderId) -> Result<Option<Order>, OrderStoreError> {
        self.0.find_by_line(line_order_id).await
    }

    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), OrderStoreError> {
        self.0.update(order, expected).await
    }

    async fn list_all(&self) -> Result<Vec<Order>, OrderStoreError> {
        self.0.list_all().await
    }

    async fn list_by_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>, OrderStoreError> {
        self.0.list_by_buyer(buyer_id).await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_insert_is_not_retried_and_releases_stock() {
    let attempted = Arc::new(AtomicBool::new(false));
    let store = BrokenInserts(Arc::new(InMemoryOrderStore::new()), attempted.clone());
    let w = world_with(
        Arc::new(InMemoryStockLedger::new()),
        store,
        Arc::new(RandomIdGenerator),
        CoreConfig::default(),
    );
    let p = stocked(&w.ledger, 2);
    let sub = w.bus.subscribe();

    let err = w
        .placement
        .place_order(order_for(w.buyer, &[(p, 2)]))
        .await
        .unwrap_err();

    assert!(attempted.load(Ordering::SeqCst));
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(quantity_of(&w.ledger, p).await, 2);
    assert!(sub.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_shipping_uses_the_buyers_saved_address() {
    let w = world();
    let p = stocked(&w.ledger, 1);

    let mut req = order_for(w.buyer, &[(p, 1)]);
    req.shipping = None;
    let order = w.placement.place_order(req).await.unwrap();

    assert_eq!(order.shipping_snapshot(), &fixtures::shipping());
}

#[tokio::test(flavor = "multi_thread")]
async fn every_committed_change_is_announced_in_order() {
    let w = world();
    let p = stocked(&w.ledger, 5);
    let sub = w.bus.subscribe();

    let order = w
        .placement
        .place_order(order_for(w.buyer, &[(p, 1), (p, 1)]))
        .await
        .unwrap();
    let engine = engine(w.store.clone(), w.bus.clone());
    engine
        .transition_line(order.line_items()[0].line_order_id(), LineStatus::Confirmed)
        .await
        .unwrap();
    engine
        .transition_order(order.order_id(), LineStatus::Shipped)
        .await
        .unwrap();

    let seen: Vec<(String, u64)> = std::iter::from_fn(|| sub.try_recv().ok())
        .map(|n| (n.event_type().to_string(), n.sequence_number()))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("order.placed".to_string(), 1),
            ("order.line_status_changed".to_string(), 2),
            ("order.line_status_changed".to_string(), 3),
            ("order.line_status_changed".to_string(), 4),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_transition_leaves_no_trace() {
    let w = world();
    let p = stocked(&w.ledger, 1);
    let order = w
        .placement
        .place_order(order_for(w.buyer, &[(p, 1)]))
        .await
        .unwrap();
    let line_id = order.line_items()[0].line_order_id().clone();
    let engine = engine(w.store.clone(), w.bus.clone());
    engine.transition_line(&line_id, LineStatus::Delivered).await.unwrap();

    let sub = w.bus.subscribe();
    let err = engine
        .transition_line(&line_id, LineStatus::Cancelled)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(sub.try_recv().is_err());
    let stored = w.store.load(order.order_id()).await.unwrap().unwrap();
    assert_eq!(stored.version(), 2);
    assert_eq!(stored.line_items()[0].tracking_history().len(), 2);
}
