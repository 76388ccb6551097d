//! Event bus for Gatepass.
//!
//! An in-process, fire-and-forget publish/subscribe channel built on
//! Tokio broadcast. The WebSocket hub subscribes here to push queue
//! updates to connected clients; named subscribers with dedicated mpsc
//! channels are available for background consumers.
//!
//! Delivery is best effort: broadcast receivers that lag are overwritten
//! by the channel, and full named-subscriber channels drop events with a
//! counter. Clients are expected to refetch state on receipt rather than
//! treat events as authoritative.

use crate::queue::QueueToken;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors that can occur in the event bus.
#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Subscriber not found: {0}")]
    SubscriberNotFound(String),
}

/// Events published when back-office state changes.
///
/// The serialized form (`type`-tagged JSON) is exactly what WebSocket
/// clients receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackofficeEvent {
    /// A queue token was issued.
    QueueTokenIssued {
        /// The new token, including its day-sequential number.
        token: QueueToken,
    },
    /// A queue token transitioned Active → Closed.
    QueueTokenClosed {
        token_id: Uuid,
        number: i64,
        kind: String,
        closed_by: Uuid,
    },
    /// A pass was issued.
    PassIssued {
        pass_id: Uuid,
        contractor_id: Uuid,
        number: String,
    },
    /// A pass was closed.
    PassClosed { pass_id: Uuid, number: String },
    /// A cashier transaction was completed.
    TransactionCreated {
        transaction_id: Uuid,
        token: String,
        total_cents: i64,
        pass_count: usize,
    },
}

impl BackofficeEvent {
    /// Returns the event type as a string for logging and metrics.
    pub fn event_type(&self) -> &'static str {
        match self {
            BackofficeEvent::QueueTokenIssued { .. } => "queue_token_issued",
            BackofficeEvent::QueueTokenClosed { .. } => "queue_token_closed",
            BackofficeEvent::PassIssued { .. } => "pass_issued",
            BackofficeEvent::PassClosed { .. } => "pass_closed",
            BackofficeEvent::TransactionCreated { .. } => "transaction_created",
        }
    }

    /// Returns true for events the queue WebSocket channel forwards.
    pub fn is_queue_event(&self) -> bool {
        matches!(
            self,
            BackofficeEvent::QueueTokenIssued { .. } | BackofficeEvent::QueueTokenClosed { .. }
        )
    }
}

/// Type alias for named event subscribers.
type EventSubscriber = mpsc::Sender<BackofficeEvent>;

/// Central event bus.
pub struct EventBus {
    /// Broadcast channel for all events.
    broadcast_tx: broadcast::Sender<BackofficeEvent>,
    /// Named subscribers with dedicated channels.
    subscribers: Arc<RwLock<HashMap<String, EventSubscriber>>>,
    /// Ring buffer of recent events.
    history: Arc<RwLock<Vec<BackofficeEvent>>>,
    history_size: usize,
    /// Events dropped because a named subscriber's channel was full.
    dropped_events: AtomicU64,
}

impl EventBus {
    /// Creates a new event bus with the specified broadcast capacity.
    pub fn new(capacity: usize) -> Self {
        Self::with_history_size(capacity, 256)
    }

    /// Creates a new event bus with a custom history ring size.
    pub fn with_history_size(capacity: usize, history_size: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        Self {
            broadcast_tx,
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            history: Arc::new(RwLock::new(Vec::with_capacity(history_size))),
            history_size,
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Publishes an event to every subscriber.
    ///
    /// Never blocks the publisher: broadcast send ignores the no-receiver
    /// case, and named subscribers with full channels lose the event.
    pub async fn publish(&self, event: BackofficeEvent) {
        debug!(event_type = event.event_type(), "Publishing event");

        {
            let mut history = self.history.write().await;
            if history.len() >= self.history_size {
                history.remove(0);
            }
            history.push(event.clone());
        }

        // No receivers is fine; the event still lands in history.
        let _ = self.broadcast_tx.send(event.clone());

        let subscribers = self.subscribers.read().await;
        for (name, tx) in subscribers.iter() {
            if let Err(e) = tx.try_send(event.clone()) {
                let dropped = self.dropped_events.fetch_add(1, Ordering::Relaxed) + 1;
                // Log every 100 dropped events to avoid log spam.
                if dropped % 100 == 1 {
                    warn!(
                        subscriber = %name,
                        total_dropped = dropped,
                        "Event dropped for slow subscriber: {}", e
                    );
                }
            }
        }
    }

    /// Subscribes to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BackofficeEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Registers a named subscriber with a dedicated bounded channel.
    pub async fn register_subscriber(
        &self,
        name: &str,
        buffer_size: usize,
    ) -> mpsc::Receiver<BackofficeEvent> {
        let (tx, rx) = mpsc::channel(buffer_size);
        self.subscribers.write().await.insert(name.to_string(), tx);
        info!(subscriber = name, "Registered event subscriber");
        rx
    }

    /// Removes a named subscriber.
    pub async fn unregister_subscriber(&self, name: &str) -> Result<(), EventBusError> {
        if self.subscribers.write().await.remove(name).is_some() {
            info!(subscriber = name, "Unregistered event subscriber");
            Ok(())
        } else {
            Err(EventBusError::SubscriberNotFound(name.to_string()))
        }
    }

    /// Returns recent events, newest first when limited.
    pub async fn recent(&self, limit: Option<usize>) -> Vec<BackofficeEvent> {
        let history = self.history.read().await;
        match limit {
            Some(n) => history.iter().rev().take(n).cloned().collect(),
            None => history.clone(),
        }
    }

    /// Number of events dropped for slow named subscribers.
    pub fn dropped_event_count(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Number of attached subscribers (broadcast + named).
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len() + self.broadcast_tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issued_event() -> BackofficeEvent {
        BackofficeEvent::QueueTokenIssued {
            token: QueueToken::new("passes", Uuid::new_v4()),
        }
    }

    #[tokio::test]
    async fn broadcast_delivery() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(issued_event()).await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "queue_token_issued");
    }

    #[tokio::test]
    async fn named_subscriber_delivery() {
        let bus = EventBus::new(16);
        let mut rx = bus.register_subscriber("audit", 8).await;

        bus.publish(issued_event()).await;

        let received = rx.recv().await.unwrap();
        assert!(received.is_queue_event());
    }

    #[tokio::test]
    async fn publish_without_receivers_is_fine() {
        let bus = EventBus::new(16);
        bus.publish(issued_event()).await;
        assert_eq!(bus.recent(None).await.len(), 1);
    }

    #[tokio::test]
    async fn full_named_channel_drops_and_counts() {
        let bus = EventBus::new(16);
        // Capacity 1 and never drained: the second publish must drop.
        let _rx = bus.register_subscriber("stuck", 1).await;

        bus.publish(issued_event()).await;
        bus.publish(issued_event()).await;

        assert_eq!(bus.dropped_event_count(), 1);
    }

    #[tokio::test]
    async fn history_ring_is_bounded() {
        let bus = EventBus::with_history_size(16, 3);
        for _ in 0..5 {
            bus.publish(issued_event()).await;
        }
        assert_eq!(bus.recent(None).await.len(), 3);
        assert_eq!(bus.recent(Some(2)).await.len(), 2);
    }

    #[tokio::test]
    async fn unregister_unknown_subscriber_errors() {
        let bus = EventBus::new(16);
        assert!(matches!(
            bus.unregister_subscriber("ghost").await,
            Err(EventBusError::SubscriberNotFound(_))
        ));
    }

    #[test]
    fn wire_format_is_type_tagged() {
        let event = BackofficeEvent::QueueTokenClosed {
            token_id: Uuid::nil(),
            number: 12,
            kind: "payments".to_string(),
            closed_by: Uuid::nil(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"queue_token_closed\""));
        assert!(json.contains("\"number\":12"));
    }

    #[test]
    fn queue_event_classification() {
        assert!(issued_event().is_queue_event());
        let pass_event = BackofficeEvent::PassIssued {
            pass_id: Uuid::nil(),
            contractor_id: Uuid::nil(),
            number: "P-ABCDEFGH".to_string(),
        };
        assert!(!pass_event.is_queue_event());
    }
}
