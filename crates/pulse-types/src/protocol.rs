//! Wire envelopes for the Pulse channel protocol.
//!
//! Messages are JSON objects tagged by a `type` string with the payload under
//! `data`. Client and server directions are separate sum types so dispatch is
//! exhaustive; broadcast fan-out uses the standalone [`PulseEvent`] envelope,
//! which additionally carries a top-level timestamp.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Messages a node may send over its channel.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "node:register")]
    Register(RegisterPayload),

    #[serde(rename = "node:task:complete")]
    TaskComplete(TaskReportPayload),

    #[serde(rename = "ping")]
    Ping,

    #[serde(rename = "unsubscribe")]
    Unsubscribe,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub wallet: String,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReportPayload {
    pub node_id: String,
    pub task_type: TaskType,
    pub article_count: u64,
    pub bytes_processed: u64,
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Cache,
    Relay,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Cache => write!(f, "cache"),
            TaskType::Relay => write!(f, "relay"),
        }
    }
}

/// Direct (non-broadcast) replies from server to a single node.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "auth:challenge")]
    AuthChallenge {
        challenge: String,
        wallet: String,
        nonce: String,
    },

    #[serde(rename = "auth:success")]
    #[serde(rename_all = "camelCase")]
    AuthSuccess {
        node_id: String,
        wallet: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
        capabilities: Vec<String>,
        metrics: MetricsSnapshot,
    },

    #[serde(rename = "auth:error")]
    AuthError { message: String },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "subscribed")]
    Subscribed {
        message: String,
        metrics: MetricsSnapshot,
    },

    #[serde(rename = "pong")]
    #[serde(rename_all = "camelCase")]
    Pong { server_time: i64 },

    #[serde(rename = "task:acknowledged")]
    #[serde(rename_all = "camelCase")]
    TaskAcknowledged { task_id: String, status: String },
}

/// Broadcast envelope fanned out to every subscriber.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PulseEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
    pub timestamp: i64,
}

impl PulseEvent {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn news_update(data: serde_json::Value) -> Self {
        Self::new("news:update", data)
    }

    pub fn metrics_update(data: serde_json::Value) -> Self {
        Self::new("metrics:update", data)
    }

    pub fn task_complete(data: serde_json::Value) -> Self {
        Self::new("node:task:complete", data)
    }
}

/// Point-in-time view of the rolling content metrics, embedded in
/// acknowledgments and pushed as `metrics:update`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_fetched: u64,
    pub total_cached: u64,
    pub total_relayed: u64,
    pub bandwidth_saved_pct: f64,
    pub active_subscribers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_broadcast: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_envelope_parses() {
        let raw = r#"{"type":"node:register","data":{"wallet":"0xab","signature":"0xcd"}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::Register(p) => {
                assert_eq!(p.wallet, "0xab");
                assert_eq!(p.signature.as_deref(), Some("0xcd"));
                assert!(p.session_token.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_ping_needs_no_data() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"node:destroy"}"#).is_err());
    }

    #[test]
    fn test_task_report_field_names_are_camel_case() {
        let raw = r#"{"type":"node:task:complete","data":{"nodeId":"pulse_1","taskType":"relay","articleCount":4,"bytesProcessed":2048}}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::TaskComplete(r) => {
                assert_eq!(r.task_type, TaskType::Relay);
                assert_eq!(r.article_count, 4);
                assert!(r.task_id.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_pulse_event_has_top_level_timestamp() {
        let event = PulseEvent::news_update(serde_json::json!({"count": 1}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "news:update");
        assert!(value["timestamp"].is_i64());
        assert_eq!(value["data"]["count"], 1);
    }

    #[test]
    fn test_auth_success_omits_missing_token() {
        let msg = ServerMessage::AuthSuccess {
            node_id: "pulse_1".into(),
            wallet: "0xab".into(),
            session_token: None,
            capabilities: vec!["cache".into()],
            metrics: MetricsSnapshot::default(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value["data"].get("sessionToken").is_none());
        assert_eq!(value["type"], "auth:success");
    }
}
