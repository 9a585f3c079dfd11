use parking_lot::Mutex;
use pulse_types::protocol::MetricsSnapshot;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug)]
struct MetricEntry {
    timestamp: i64,
    fetched: u64,
    cached: u64,
    relayed: u64,
}

/// Rolling-window counters for fetched/cached/relayed content.
///
/// Entries older than the window are pruned on every read and by a
/// background tick, so memory stays bounded even when nobody asks.
pub struct MetricsAggregator {
    window_secs: i64,
    entries: Mutex<VecDeque<MetricEntry>>,
    subscribers: AtomicUsize,
    bytes_broadcast: AtomicU64,
    last_broadcast: Mutex<Option<i64>>,
}

impl MetricsAggregator {
    pub fn new(window_secs: i64) -> Self {
        Self {
            window_secs,
            entries: Mutex::new(VecDeque::new()),
            subscribers: AtomicUsize::new(0),
            bytes_broadcast: AtomicU64::new(0),
            last_broadcast: Mutex::new(None),
        }
    }

    pub fn record_fetch(&self, count: u64) {
        self.record(count, 0, 0);
    }

    pub fn record_cache_hit(&self, count: u64) {
        self.record(0, count, 0);
    }

    pub fn record_relay(&self, count: u64) {
        self.record(0, 0, count);
    }

    fn record(&self, fetched: u64, cached: u64, relayed: u64) {
        self.record_at(chrono::Utc::now().timestamp(), fetched, cached, relayed);
    }

    pub(crate) fn record_at(&self, timestamp: i64, fetched: u64, cached: u64, relayed: u64) {
        self.entries.lock().push_back(MetricEntry {
            timestamp,
            fetched,
            cached,
            relayed,
        });
    }

    /// Gauge maintained by the broadcast engine.
    pub fn set_subscribers(&self, count: usize) {
        self.subscribers.store(count, Ordering::Relaxed);
    }

    pub fn subscribers(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }

    /// Byte accounting sink: serialized size times recipient count for
    /// every fan-out.
    pub fn record_broadcast(&self, bytes: u64) {
        self.bytes_broadcast.fetch_add(bytes, Ordering::Relaxed);
        *self.last_broadcast.lock() = Some(chrono::Utc::now().timestamp_millis());
    }

    pub fn bytes_broadcast(&self) -> u64 {
        self.bytes_broadcast.load(Ordering::Relaxed)
    }

    pub fn prune(&self) {
        self.prune_before(chrono::Utc::now().timestamp() - self.window_secs);
    }

    fn prune_before(&self, cutoff: i64) {
        let mut entries = self.entries.lock();
        let before = entries.len();
        while entries.front().is_some_and(|e| e.timestamp < cutoff) {
            entries.pop_front();
        }
        let dropped = before - entries.len();
        if dropped > 0 {
            debug!("Pruned {} metric entries", dropped);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.prune();

        let (fetched, cached, relayed) = {
            let entries = self.entries.lock();
            entries.iter().fold((0u64, 0u64, 0u64), |(f, c, r), e| {
                (f + e.fetched, c + e.cached, r + e.relayed)
            })
        };

        let bandwidth_saved_pct = if fetched == 0 {
            0.0
        } else {
            (cached as f64 / fetched as f64 * 1000.0).round() / 10.0
        };

        MetricsSnapshot {
            total_fetched: fetched,
            total_cached: cached,
            total_relayed: relayed,
            bandwidth_saved_pct,
            active_subscribers: self.subscribers(),
            last_broadcast: *self.last_broadcast.lock(),
        }
    }

    /// Background pruner; keeps the window bounded with no readers.
    pub async fn run(self: Arc<Self>, prune_interval_secs: u64, shutdown: Arc<AtomicBool>) {
        let mut ticker = interval(Duration::from_secs(prune_interval_secs.max(1)));
        info!(
            "Metrics aggregator running ({}s window, {}s prune)",
            self.window_secs, prune_interval_secs
        );

        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Metrics aggregator shutting down");
                break;
            }

            ticker.tick().await;
            self.prune();
        }
    }
}
