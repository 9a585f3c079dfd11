//! The real-time coordination layer: session registry, broadcast fan-out,
//! task lifecycle tracking and the channel server itself.

mod broadcast;
mod server;
mod session;
mod tasks;

pub use broadcast::BroadcastEngine;
pub use server::ChannelServer;
pub use session::{ConnId, NodeSession, SessionRegistry};
pub use tasks::{NodeWorkStats, TaskTracker, WorkTotals};

#[cfg(test)]
mod tests;

use crate::auth::AuthEngine;
use crate::config::PulseConfig;
use crate::limits::RateLimiters;
use crate::metrics::MetricsAggregator;
use crate::storage::PulseStorage;
use pulse_types::PulseResult;
use std::sync::Arc;

/// All live registries of one Pulse process, owned in one place and handed
/// to handlers by reference. Nothing here is global.
pub struct PulseState {
    pub config: PulseConfig,
    pub limits: Arc<RateLimiters>,
    pub auth: AuthEngine,
    pub sessions: SessionRegistry,
    pub broadcast: BroadcastEngine,
    pub tasks: TaskTracker,
    pub metrics: Arc<MetricsAggregator>,
    pub storage: Arc<PulseStorage>,
}

impl PulseState {
    pub fn new(config: PulseConfig, storage: Arc<PulseStorage>) -> PulseResult<Self> {
        let limits = Arc::new(RateLimiters::from_config(&config.rate_limits));
        let metrics = Arc::new(MetricsAggregator::new(config.metrics.window_secs));
        let tasks = TaskTracker::new(Arc::clone(&metrics), Arc::clone(&storage))?;

        Ok(Self {
            limits: Arc::clone(&limits),
            auth: AuthEngine::new(limits),
            sessions: SessionRegistry::new(),
            broadcast: BroadcastEngine::new(Arc::clone(&metrics)),
            tasks,
            metrics,
            storage,
            config,
        })
    }

    /// Publishes a content update to every subscriber. A fresh task id is
    /// attached and registered as pending on each live authenticated
    /// session, so nodes can report back on it and get an acknowledgment.
    pub fn publish_news(&self, mut data: serde_json::Value) -> usize {
        let task_id = uuid::Uuid::new_v4().to_string();
        if let Some(object) = data.as_object_mut() {
            object.insert("taskId".into(), serde_json::Value::String(task_id.clone()));
        }

        for conn_id in self.sessions.authenticated_conn_ids() {
            self.sessions.add_pending_task(conn_id, &task_id);
        }

        self.broadcast
            .broadcast(&pulse_types::protocol::PulseEvent::news_update(data))
    }

    /// Periodic housekeeping shared by the maintenance loop.
    pub fn cleanup(&self) {
        self.limits.cleanup();
        self.auth.prune_expired();
        self.tasks.prune_stale();
        self.sessions.prune_pending_tasks();
    }
}
