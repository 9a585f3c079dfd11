use super::constants::{DEFAULT_METRICS_PRUNE_SECS, DEFAULT_METRICS_WINDOW_SECS};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Rolling-window length for content counters.
    pub window_secs: i64,
    /// Background prune (and `metrics:update` push) interval.
    pub prune_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_METRICS_WINDOW_SECS,
            prune_interval_secs: DEFAULT_METRICS_PRUNE_SECS,
        }
    }
}
