use serde::{Deserialize, Serialize};

/// One external content origin, mutated after every poll attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedSourceRecord {
    pub id: u64,
    pub url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub error_count: u32,
    pub enabled: bool,
    /// Unix seconds of the last attempt, successful or not.
    pub last_fetch: Option<i64>,
}

impl FeedSourceRecord {
    pub fn new(id: u64, url: String) -> Self {
        Self {
            id,
            url,
            etag: None,
            last_modified: None,
            error_count: 0,
            enabled: true,
            last_fetch: None,
        }
    }
}

/// One ingested article; the fingerprint is the storage key so a second
/// sighting can never produce a second row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedArticleRecord {
    pub source_id: u64,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub published_at: Option<i64>,
    pub content_hash: String,
    pub created_at: i64,
}

/// Cumulative work counters for one registered node, persisted across
/// restarts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeStatsRecord {
    pub node_id: String,
    pub wallet: String,
    pub articles_cached: u64,
    pub articles_relayed: u64,
    pub bytes_processed: u64,
    pub last_seen: i64,
}
