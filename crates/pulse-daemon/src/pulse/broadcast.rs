use super::session::ConnId;
use crate::metrics::MetricsAggregator;
use parking_lot::RwLock;
use pulse_types::protocol::{PulseEvent, ServerMessage};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Handle for pushing frames to one connection's writer task.
pub type Outbound = UnboundedSender<Message>;

/// Subscriber registry and fan-out. Connections enter only after
/// authentication; dead ones are pruned silently during the next
/// broadcast, so a disconnect racing a publish never raises.
pub struct BroadcastEngine {
    subscribers: RwLock<BTreeMap<ConnId, Outbound>>,
    metrics: Arc<MetricsAggregator>,
}

impl BroadcastEngine {
    pub fn new(metrics: Arc<MetricsAggregator>) -> Self {
        Self {
            subscribers: RwLock::new(BTreeMap::new()),
            metrics,
        }
    }

    /// Adds an authenticated connection and confirms with a metrics
    /// snapshot.
    pub fn subscribe(&self, conn_id: ConnId, sender: Outbound) {
        let confirmation = ServerMessage::Subscribed {
            message: "Subscribed to content updates".into(),
            metrics: self.metrics.snapshot(),
        };
        if let Ok(json) = serde_json::to_string(&confirmation) {
            let _ = sender.send(Message::Text(json));
        }

        let count = {
            let mut subs = self.subscribers.write();
            subs.insert(conn_id, sender);
            subs.len()
        };
        self.metrics.set_subscribers(count);
        debug!("Connection {} subscribed ({} total)", conn_id, count);
    }

    /// Idempotent removal.
    pub fn unsubscribe(&self, conn_id: ConnId) {
        let count = {
            let mut subs = self.subscribers.write();
            subs.remove(&conn_id);
            subs.len()
        };
        self.metrics.set_subscribers(count);
    }

    /// Serializes once and fans out in registration order. Returns the
    /// number of recipients actually reached.
    pub fn broadcast(&self, event: &PulseEvent) -> usize {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize broadcast event: {}", e);
                return 0;
            }
        };

        let mut dead = Vec::new();
        let mut delivered = 0usize;

        {
            let subs = self.subscribers.read();
            for (&conn_id, sender) in subs.iter() {
                if sender.send(Message::Text(payload.clone())).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(conn_id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subs = self.subscribers.write();
            for conn_id in &dead {
                subs.remove(conn_id);
            }
            self.metrics.set_subscribers(subs.len());
            debug!("Pruned {} dead subscribers during broadcast", dead.len());
        }

        self.metrics
            .record_broadcast(payload.len() as u64 * delivered as u64);

        debug!(
            "Broadcast {} to {} subscribers ({} pruned)",
            event.kind,
            delivered,
            dead.len()
        );
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_subscribed(&self, conn_id: ConnId) -> bool {
        self.subscribers.read().contains_key(&conn_id)
    }
}
