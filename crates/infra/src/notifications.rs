//! Outbound notification hook.
//!
//! After a successful write, the events it produced are wrapped in envelopes
//! and published on the bus. Publishing is fire-and-forget: a failure is
//! logged and the write still counts as done. Consumers (push/email
//! gateways, the SSE stream) attach through `NotificationWorker`.

use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use uuid::Uuid;

use storefront_core::{AggregateRoot, UserId};
use storefront_events::{Event, EventBus, EventEnvelope, Subscription};
use storefront_orders::{LineOrderId, LineStatus, Order, OrderEvent, OrderId, OrderStatus};

/// Message type carried by the notification bus.
pub type Notification = EventEnvelope<JsonValue>;

pub const AGGREGATE_TYPE: &str = "order";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlacedNotice<'a> {
    order_id: &'a OrderId,
    buyer_id: UserId,
    line_order_ids: Vec<&'a LineOrderId>,
    order_status: OrderStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusNotice<'a> {
    order_id: &'a OrderId,
    line_order_id: &'a LineOrderId,
    previous_status: LineStatus,
    new_status: LineStatus,
    order_status: OrderStatus,
}

fn payload(order: &Order, event: &OrderEvent) -> Result<JsonValue, serde_json::Error> {
    match event {
        OrderEvent::OrderPlaced(e) => serde_json::to_value(PlacedNotice {
            order_id: &e.order_id,
            buyer_id: e.buyer_id,
            line_order_ids: e.lines.iter().map(|l| &l.line_order_id).collect(),
            order_status: order.order_status(),
        }),
        OrderEvent::LineStatusChanged(e) => serde_json::to_value(StatusNotice {
            order_id: &e.order_id,
            line_order_id: &e.line_order_id,
            previous_status: e.from,
            new_status: e.to,
            order_status: order.order_status(),
        }),
    }
}

/// Publish the events of one committed write.
///
/// `order` is the state after the write; each envelope's sequence number is
/// the order version its event produced.
pub fn publish_committed<B>(bus: &B, order: &Order, events: &[OrderEvent])
where
    B: EventBus<Notification> + ?Sized,
{
    let first = order
        .version()
        .saturating_sub(events.len() as u64)
        .saturating_add(1);

    for (offset, event) in events.iter().enumerate() {
        let body = match payload(order, event) {
            Ok(body) => body,
            Err(err) => {
                warn!(order_id = %order.order_id(), event_type = event.event_type(), error = %err, "notification dropped: payload encoding failed");
                continue;
            }
        };

        let envelope = EventEnvelope::new(
            Uuid::now_v7(),
            order.order_id().as_str(),
            AGGREGATE_TYPE,
            event.event_type(),
            first + offset as u64,
            event.occurred_at(),
            body,
        );

        if let Err(err) = bus.publish(envelope) {
            warn!(order_id = %order.order_id(), event_type = event.event_type(), error = ?err, "notification dropped: bus publish failed");
        }
    }
}

/// Downstream consumer of notifications.
///
/// Delivery is at-least-once; implementations must tolerate duplicates.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), String>;
}

/// Writes every notification to the log. Stands in for the push/email
/// gateways, which live outside this system.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn deliver(&self, n: &Notification) -> Result<(), String> {
        info!(
            order_id = n.aggregate_id(),
            event_id = %n.event_id(),
            event_type = n.event_type(),
            sequence = n.sequence_number(),
            payload = %n.payload(),
            "order notification"
        );
        Ok(())
    }
}

/// Handle to stop and join a notification worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Background thread draining a bus subscription into a sink.
#[derive(Debug)]
pub struct NotificationWorker;

impl NotificationWorker {
    /// Subscribe now (so nothing published after this call is missed) and
    /// spawn the consuming thread.
    pub fn spawn<B, S>(name: &'static str, bus: &B, sink: S) -> io::Result<WorkerHandle>
    where
        B: EventBus<Notification> + ?Sized,
        S: NotificationSink + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, &sink))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<S>(
    name: &'static str,
    sub: Subscription<Notification>,
    shutdown_rx: mpsc::Receiver<()>,
    sink: &S,
) where
    S: NotificationSink,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Err(err) = sink.deliver(&msg) {
                    warn!(worker = name, event_type = msg.event_type(), error = %err, "notification sink failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use std::sync::{Arc, Mutex};
    use storefront_events::InMemoryEventBus;
    use storefront_orders::SequentialIdGenerator;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Notification>>);

    impl NotificationSink for Arc<Collect> {
        fn deliver(&self, n: &Notification) -> Result<(), String> {
            self.0.lock().unwrap().push(n.clone());
            Ok(())
        }
    }

    #[test]
    fn placement_publishes_one_envelope_at_version_one() {
        let bus: InMemoryEventBus<Notification> = InMemoryEventBus::new();
        let sub = bus.subscribe();
        let order = fixtures::placed_order(&SequentialIdGenerator::new(), UserId::new(), 2);
        let placed = OrderEvent::OrderPlaced(storefront_orders::OrderPlaced {
            order_id: order.order_id().clone(),
            buyer_id: order.buyer_id(),
            shipping: order.shipping_snapshot().clone(),
            lines: vec![],
            occurred_at: order.created_at(),
        });

        publish_committed(&bus, &order, &[placed]);

        let env = sub.try_recv().unwrap();
        assert_eq!(env.event_type(), "order.placed");
        assert_eq!(env.aggregate_id(), order.order_id().as_str());
        assert_eq!(env.sequence_number(), 1);
        assert_eq!(env.payload()["orderStatus"], "Pending");
    }

    #[test]
    fn status_change_carries_line_and_new_status() {
        let bus: InMemoryEventBus<Notification> = InMemoryEventBus::new();
        let sub = bus.subscribe();
        let mut order = fixtures::placed_order(&SequentialIdGenerator::new(), UserId::new(), 1);
        let line_id = order.line_items()[0].line_order_id().clone();
        fixtures::move_line(&mut order, 0, LineStatus::Shipped);

        let event = OrderEvent::LineStatusChanged(storefront_orders::LineStatusChanged {
            order_id: order.order_id().clone(),
            line_order_id: line_id.clone(),
            from: LineStatus::Pending,
            to: LineStatus::Shipped,
            occurred_at: chrono::Utc::now(),
        });
        publish_committed(&bus, &order, &[event]);

        let env = sub.try_recv().unwrap();
        assert_eq!(env.sequence_number(), 2);
        assert_eq!(env.payload()["lineOrderId"], line_id.as_str());
        assert_eq!(env.payload()["newStatus"], "Shipped");
        assert_eq!(env.payload()["orderStatus"], "Shipped");
    }

    #[test]
    fn worker_forwards_to_sink_and_stops() {
        let bus: Arc<InMemoryEventBus<Notification>> = Arc::new(InMemoryEventBus::new());
        let seen = Arc::new(Collect::default());
        let handle = NotificationWorker::spawn("test.notifications", &bus, seen.clone()).unwrap();

        let order = fixtures::placed_order(&SequentialIdGenerator::new(), UserId::new(), 1);
        let event = OrderEvent::LineStatusChanged(storefront_orders::LineStatusChanged {
            order_id: order.order_id().clone(),
            line_order_id: order.line_items()[0].line_order_id().clone(),
            from: LineStatus::Pending,
            to: LineStatus::Confirmed,
            occurred_at: chrono::Utc::now(),
        });
        publish_committed(&*bus, &order, &[event]);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while seen.0.lock().unwrap().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        handle.shutdown();

        assert_eq!(seen.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn tracing_sink_accepts_everything() {
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            "#3b100000000000",
            AGGREGATE_TYPE,
            "order.placed",
            1,
            chrono::Utc::now(),
            serde_json::json!({}),
        );
        assert!(TracingSink.deliver(&env).is_ok());
    }
}
