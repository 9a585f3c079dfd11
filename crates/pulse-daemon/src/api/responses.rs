use pulse_types::protocol::{MetricsSnapshot, TaskType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub status: String,
    pub uptime_secs: i64,
}

/// Diagnostic view: the rolling window plus node and storage totals.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub snapshot: MetricsSnapshot,
    pub active_nodes: usize,
    pub articles_cached: u64,
    pub articles_relayed: u64,
    pub bytes_processed: u64,
    pub bytes_broadcast: u64,
    pub stored_articles: usize,
    pub feed_sources: usize,
}

/// Body for `POST /v1/node/task`. Unlike the channel protocol the
/// wallet rides in the body, since HTTP calls carry no session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTaskRequest {
    pub node_id: String,
    pub wallet: String,
    #[serde(default = "default_task_type")]
    pub task_type: TaskType,
    #[serde(default)]
    pub article_count: u64,
    #[serde(default)]
    pub bytes_processed: u64,
}

fn default_task_type() -> TaskType {
    TaskType::Cache
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTaskResponse {
    pub accepted: bool,
    pub node_id: String,
    pub articles_cached: u64,
    pub articles_relayed: u64,
    pub bytes_processed: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub node_id: String,
    pub wallet: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub acknowledged: bool,
    pub node_id: String,
}
