use crate::auth::AuthenticatedNode;
use crate::metrics::MetricsAggregator;
use crate::storage::{NodeStatsRecord, PulseStorage};
use parking_lot::RwLock;
use pulse_types::protocol::{TaskReportPayload, TaskType};
use pulse_types::{EthAddress, PulseResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Nodes not heard from for this long stop counting as active.
const ACTIVE_WINDOW_SECS: i64 = 60;

#[derive(Clone, Debug)]
pub struct NodeWorkStats {
    pub node_id: String,
    pub wallet: EthAddress,
    pub articles_cached: u64,
    pub articles_relayed: u64,
    pub bytes_processed: u64,
    pub last_seen: i64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WorkTotals {
    pub active_nodes: usize,
    pub articles_cached: u64,
    pub articles_relayed: u64,
    pub bytes_processed: u64,
}

/// Records node-reported work and keeps cumulative per-node counters,
/// persisted so totals survive restarts.
pub struct TaskTracker {
    stats: RwLock<HashMap<String, NodeWorkStats>>,
    metrics: Arc<MetricsAggregator>,
    storage: Arc<PulseStorage>,
}

impl TaskTracker {
    pub fn new(metrics: Arc<MetricsAggregator>, storage: Arc<PulseStorage>) -> PulseResult<Self> {
        let mut stats = HashMap::new();
        for record in storage.all_node_stats()? {
            match EthAddress::from_hex(&record.wallet) {
                Ok(wallet) => {
                    stats.insert(
                        record.node_id.clone(),
                        NodeWorkStats {
                            node_id: record.node_id,
                            wallet,
                            articles_cached: record.articles_cached,
                            articles_relayed: record.articles_relayed,
                            bytes_processed: record.bytes_processed,
                            last_seen: record.last_seen,
                        },
                    );
                }
                Err(e) => warn!("Skipping stored node stats with bad wallet: {}", e),
            }
        }

        if !stats.is_empty() {
            info!("Restored work stats for {} nodes", stats.len());
        }

        Ok(Self {
            stats: RwLock::new(stats),
            metrics,
            storage,
        })
    }

    /// Applies one work report from a validated node. Feeds the rolling
    /// metrics window and persists the cumulative counters.
    pub fn report(&self, node: &AuthenticatedNode, payload: &TaskReportPayload) {
        self.report_at(node, payload, chrono::Utc::now().timestamp());
    }

    pub(crate) fn report_at(
        &self,
        node: &AuthenticatedNode,
        payload: &TaskReportPayload,
        now: i64,
    ) {
        let snapshot = {
            let mut stats = self.stats.write();
            let entry = stats
                .entry(node.node_id.as_str().to_string())
                .or_insert_with(|| self.hydrate(node, now));

            match payload.task_type {
                TaskType::Cache => entry.articles_cached += payload.article_count,
                TaskType::Relay => entry.articles_relayed += payload.article_count,
            }
            entry.bytes_processed += payload.bytes_processed;
            entry.last_seen = now;
            entry.clone()
        };

        match payload.task_type {
            TaskType::Cache => self.metrics.record_cache_hit(payload.article_count),
            TaskType::Relay => self.metrics.record_relay(payload.article_count),
        }

        debug!(
            "Node {} reported {} x{} ({} bytes)",
            node.node_id, payload.task_type, payload.article_count, payload.bytes_processed
        );

        let record = NodeStatsRecord {
            node_id: snapshot.node_id.clone(),
            wallet: snapshot.wallet.to_hex(),
            articles_cached: snapshot.articles_cached,
            articles_relayed: snapshot.articles_relayed,
            bytes_processed: snapshot.bytes_processed,
            last_seen: snapshot.last_seen,
        };
        if let Err(e) = self.storage.store_node_stats(&record) {
            warn!("Failed to persist node stats: {}", e);
        }
    }

    /// Starting point for a node missing from the in-memory map. The
    /// active-window prune only evicts the live entry; the cumulative
    /// counters live in storage and must carry over.
    fn hydrate(&self, node: &AuthenticatedNode, now: i64) -> NodeWorkStats {
        let stored = match self.storage.get_node_stats(node.node_id.as_str()) {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to load stored node stats: {}", e);
                None
            }
        };

        match stored {
            Some(record) => NodeWorkStats {
                node_id: record.node_id,
                wallet: node.wallet,
                articles_cached: record.articles_cached,
                articles_relayed: record.articles_relayed,
                bytes_processed: record.bytes_processed,
                last_seen: now,
            },
            None => NodeWorkStats {
                node_id: node.node_id.as_str().to_string(),
                wallet: node.wallet,
                articles_cached: 0,
                articles_relayed: 0,
                bytes_processed: 0,
                last_seen: now,
            },
        }
    }

    /// Heartbeat: refreshes last-seen without touching counters.
    pub fn touch(&self, node_id: &str) {
        let now = chrono::Utc::now().timestamp();
        if let Some(entry) = self.stats.write().get_mut(node_id) {
            entry.last_seen = now;
        }
    }

    pub fn active_nodes(&self) -> usize {
        self.totals().active_nodes
    }

    /// Aggregates over nodes seen within the active window, pruning stale
    /// in-memory entries as a side effect of being read.
    pub fn totals(&self) -> WorkTotals {
        self.totals_at(chrono::Utc::now().timestamp())
    }

    pub(crate) fn totals_at(&self, now: i64) -> WorkTotals {
        self.prune_stale_at(now);

        let stats = self.stats.read();
        let mut totals = WorkTotals {
            active_nodes: stats.len(),
            ..WorkTotals::default()
        };
        for entry in stats.values() {
            totals.articles_cached += entry.articles_cached;
            totals.articles_relayed += entry.articles_relayed;
            totals.bytes_processed += entry.bytes_processed;
        }
        totals
    }

    pub fn node(&self, node_id: &str) -> Option<NodeWorkStats> {
        self.stats.read().get(node_id).cloned()
    }

    pub fn prune_stale(&self) {
        self.prune_stale_at(chrono::Utc::now().timestamp());
    }

    fn prune_stale_at(&self, now: i64) {
        self.stats
            .write()
            .retain(|_, s| now - s.last_seen < ACTIVE_WINDOW_SECS);
    }
}
