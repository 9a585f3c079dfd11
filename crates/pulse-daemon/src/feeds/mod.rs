//! Syndicated feed ingestion: polls registered sources on a schedule,
//! deduplicates by content fingerprint and feeds new articles to the
//! broadcast layer.

mod notify;
mod parse;
mod worker;

pub use notify::{notifier_from_config, LogNotifier, NotificationSink, NullNotifier, WebhookNotifier};
pub use parse::{parse_feed, FeedItem};
pub use worker::FeedWorker;

#[cfg(test)]
mod tests;

use crate::config::FeedsConfig;
use crate::storage::FeedSourceRecord;
use serde::Serialize;

/// Result of one polling pass, also returned by the manual refresh
/// endpoint.
#[derive(Clone, Copy, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    /// Sources actually contacted this pass.
    pub refreshed: usize,
    /// Articles that were new to storage.
    pub inserted: usize,
}

/// Delay before a source may be polled again. Grows exponentially with
/// consecutive errors, capped so a flapping source retries within the
/// hour.
pub fn backoff_delay_secs(config: &FeedsConfig, error_count: u32) -> u64 {
    let exponent = error_count.min(config.backoff_exp_cap);
    config
        .base_interval_secs
        .saturating_mul(1u64 << exponent)
        .min(config.max_interval_secs)
}

/// Unix time at which the source becomes eligible again. Never-fetched
/// sources are eligible immediately.
pub fn next_eligible(config: &FeedsConfig, source: &FeedSourceRecord) -> i64 {
    match source.last_fetch {
        Some(at) => at + backoff_delay_secs(config, source.error_count) as i64,
        None => i64::MIN,
    }
}

/// Picks the batch for one pass: enabled sources under the error
/// ceiling that are due (or all of them when forced), stalest first.
pub fn select_due(
    config: &FeedsConfig,
    sources: &[FeedSourceRecord],
    now: i64,
    force: bool,
) -> Vec<FeedSourceRecord> {
    let mut due: Vec<FeedSourceRecord> = sources
        .iter()
        .filter(|s| s.enabled && s.error_count <= config.error_ceiling)
        .filter(|s| force || next_eligible(config, s) <= now)
        .cloned()
        .collect();

    due.sort_by_key(|s| s.last_fetch.unwrap_or(i64::MIN));
    due.truncate(config.batch_size);
    due
}
