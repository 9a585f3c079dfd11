use super::constants::{
    DEFAULT_FEED_BACKOFF_EXP_CAP, DEFAULT_FEED_BASE_INTERVAL_SECS, DEFAULT_FEED_BATCH_SIZE,
    DEFAULT_FEED_ERROR_CEILING, DEFAULT_FEED_MAX_INTERVAL_SECS, DEFAULT_FEED_POLL_SECS,
    DEFAULT_FEED_REQUEST_TIMEOUT_SECS,
};
use super::types::NotifyMode;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub batch_size: usize,
    pub base_interval_secs: u64,
    pub max_interval_secs: u64,
    pub backoff_exp_cap: u32,
    pub error_ceiling: u32,
    pub request_timeout_secs: u64,
    /// Sources seeded into storage on `pulse seed-feeds`.
    pub seed_urls: Vec<String>,
    pub notify: NotifyMode,
    pub notify_webhook: Option<String>,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: DEFAULT_FEED_POLL_SECS,
            batch_size: DEFAULT_FEED_BATCH_SIZE,
            base_interval_secs: DEFAULT_FEED_BASE_INTERVAL_SECS,
            max_interval_secs: DEFAULT_FEED_MAX_INTERVAL_SECS,
            backoff_exp_cap: DEFAULT_FEED_BACKOFF_EXP_CAP,
            error_ceiling: DEFAULT_FEED_ERROR_CEILING,
            request_timeout_secs: DEFAULT_FEED_REQUEST_TIMEOUT_SECS,
            seed_urls: Vec::new(),
            notify: NotifyMode::default(),
            notify_webhook: None,
        }
    }
}
