use super::server::dispatch;
use super::*;
use crate::auth::AuthenticatedNode;
use crate::config::PulseConfig;
use pulse_crypto::{address_of_secret, sign_personal_message};
use pulse_types::protocol::{PulseEvent, TaskReportPayload, TaskType};
use pulse_types::{EthAddress, NodeId};
use secp256k1::SecretKey;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_tungstenite::tungstenite::Message;

fn make_state() -> (Arc<PulseState>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(PulseStorage::open(dir.path().join("db")).unwrap());
    let state = Arc::new(PulseState::new(PulseConfig::default(), storage).unwrap());
    (state, dir)
}

fn connect(state: &PulseState) -> (ConnId, super::broadcast::Outbound, UnboundedReceiver<Message>) {
    let conn_id = state.sessions.open();
    let (tx, rx) = mpsc::unbounded_channel();
    (conn_id, tx, rx)
}

fn next_json(rx: &mut UnboundedReceiver<Message>) -> serde_json::Value {
    match rx.try_recv().expect("expected a message") {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame: {:?}", other),
    }
}

fn wallet_key(byte: u8) -> (SecretKey, EthAddress) {
    let secret = SecretKey::from_slice(&[byte; 32]).unwrap();
    let wallet = address_of_secret(&secret);
    (secret, wallet)
}

fn register_json(wallet: &EthAddress, signature: Option<&str>, token: Option<&str>) -> String {
    let mut data = serde_json::json!({"wallet": wallet.to_hex()});
    if let Some(sig) = signature {
        data["signature"] = serde_json::json!(sig);
    }
    if let Some(t) = token {
        data["sessionToken"] = serde_json::json!(t);
    }
    serde_json::json!({"type": "node:register", "data": data}).to_string()
}

/// Challenge, sign, verify over the dispatch path. Returns the
/// auth:success payload and drains the subscribed confirmation.
fn handshake(
    state: &PulseState,
    conn_id: ConnId,
    tx: &super::broadcast::Outbound,
    rx: &mut UnboundedReceiver<Message>,
    secret: &SecretKey,
    wallet: &EthAddress,
) -> serde_json::Value {
    dispatch(state, conn_id, tx, &register_json(wallet, None, None));
    let challenge_msg = next_json(rx);
    assert_eq!(challenge_msg["type"], "auth:challenge");

    let challenge = challenge_msg["data"]["challenge"].as_str().unwrap();
    let signature = sign_personal_message(secret, challenge.as_bytes()).unwrap();

    dispatch(
        state,
        conn_id,
        tx,
        &register_json(wallet, Some(&signature.to_hex()), None),
    );

    let subscribed = next_json(rx);
    assert_eq!(subscribed["type"], "subscribed");

    let success = next_json(rx);
    assert_eq!(success["type"], "auth:success");
    success
}

#[test]
fn test_full_handshake_subscribes_connection() {
    let (state, _dir) = make_state();
    let (conn_id, tx, mut rx) = connect(&state);
    let (secret, wallet) = wallet_key(0x11);

    let success = handshake(&state, conn_id, &tx, &mut rx, &secret, &wallet);

    assert_eq!(success["data"]["wallet"], wallet.to_hex());
    assert!(success["data"]["sessionToken"].is_string());
    assert!(success["data"]["capabilities"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c == "relay"));
    assert!(state.broadcast.is_subscribed(conn_id));
    assert_eq!(state.metrics.subscribers(), 1);
}

#[test]
fn test_consumed_signature_fails_on_fresh_connection() {
    let (state, _dir) = make_state();
    let (conn_id, tx, mut rx) = connect(&state);
    let (secret, wallet) = wallet_key(0x11);

    dispatch(&state, conn_id, &tx, &register_json(&wallet, None, None));
    let challenge = next_json(&mut rx)["data"]["challenge"]
        .as_str()
        .unwrap()
        .to_string();
    let signature = sign_personal_message(&secret, challenge.as_bytes()).unwrap();

    dispatch(
        &state,
        conn_id,
        &tx,
        &register_json(&wallet, Some(&signature.to_hex()), None),
    );
    assert_eq!(next_json(&mut rx)["type"], "subscribed");
    assert_eq!(next_json(&mut rx)["type"], "auth:success");

    // Replay over a new connection: no challenge session exists anymore.
    let (conn2, tx2, mut rx2) = connect(&state);
    dispatch(
        &state,
        conn2,
        &tx2,
        &register_json(&wallet, Some(&signature.to_hex()), None),
    );
    let reply = next_json(&mut rx2);
    assert_eq!(reply["type"], "auth:error");
    assert!(!state.broadcast.is_subscribed(conn2));
}

#[test]
fn test_reregister_is_idempotent() {
    let (state, _dir) = make_state();
    let (conn_id, tx, mut rx) = connect(&state);
    let (secret, wallet) = wallet_key(0x11);

    let first = handshake(&state, conn_id, &tx, &mut rx, &secret, &wallet);

    dispatch(&state, conn_id, &tx, &register_json(&wallet, None, None));
    let again = next_json(&mut rx);
    assert_eq!(again["type"], "auth:success");
    assert_eq!(again["data"]["nodeId"], first["data"]["nodeId"]);
    // No fresh token on re-confirmation.
    assert!(again["data"].get("sessionToken").is_none());
    assert_eq!(state.broadcast.subscriber_count(), 1);
}

#[test]
fn test_session_token_fast_path_over_channel() {
    let (state, _dir) = make_state();
    let (conn_id, tx, mut rx) = connect(&state);
    let (secret, wallet) = wallet_key(0x11);

    let success = handshake(&state, conn_id, &tx, &mut rx, &secret, &wallet);
    let token = success["data"]["sessionToken"].as_str().unwrap().to_string();

    let (conn2, tx2, mut rx2) = connect(&state);
    dispatch(&state, conn2, &tx2, &register_json(&wallet, None, Some(&token)));

    assert_eq!(next_json(&mut rx2)["type"], "subscribed");
    let fast = next_json(&mut rx2);
    assert_eq!(fast["type"], "auth:success");
    assert_eq!(fast["data"]["nodeId"], success["data"]["nodeId"]);
    assert!(state.broadcast.is_subscribed(conn2));
}

#[test]
fn test_unauthenticated_connection_never_receives_broadcasts() {
    let (state, _dir) = make_state();
    let (_conn, _tx, mut rx) = connect(&state);

    state.broadcast.broadcast(&PulseEvent::news_update(serde_json::json!({"count": 1})));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_broadcast_prunes_dead_connections() {
    let (state, _dir) = make_state();

    let mut receivers = Vec::new();
    for i in 0..3u8 {
        let (conn_id, tx, mut rx) = connect(&state);
        let (secret, wallet) = wallet_key(0x20 + i);
        handshake(&state, conn_id, &tx, &mut rx, &secret, &wallet);
        receivers.push(rx);
    }
    assert_eq!(state.broadcast.subscriber_count(), 3);

    // One socket dies uncleanly.
    drop(receivers.remove(1));

    let delivered = state
        .broadcast
        .broadcast(&PulseEvent::news_update(serde_json::json!({"count": 1})));
    assert_eq!(delivered, 2);
    assert_eq!(state.broadcast.subscriber_count(), 2);
    assert_eq!(state.metrics.subscribers(), 2);

    for rx in receivers.iter_mut() {
        assert_eq!(next_json(rx)["type"], "news:update");
    }
}

#[test]
fn test_ping_pong() {
    let (state, _dir) = make_state();
    let (conn_id, tx, mut rx) = connect(&state);

    dispatch(&state, conn_id, &tx, r#"{"type":"ping"}"#);
    let pong = next_json(&mut rx);
    assert_eq!(pong["type"], "pong");
    assert!(pong["data"]["serverTime"].is_i64());
}

#[test]
fn test_malformed_message_is_nonfatal() {
    let (state, _dir) = make_state();
    let (conn_id, tx, mut rx) = connect(&state);

    dispatch(&state, conn_id, &tx, "not json at all");
    assert_eq!(next_json(&mut rx)["type"], "error");

    dispatch(&state, conn_id, &tx, r#"{"type":"node:unknown"}"#);
    assert_eq!(next_json(&mut rx)["type"], "error");

    // Session is still alive and usable.
    dispatch(&state, conn_id, &tx, r#"{"type":"ping"}"#);
    assert_eq!(next_json(&mut rx)["type"], "pong");
}

#[test]
fn test_message_quota_drops_excess() {
    let (state, _dir) = make_state();
    let (conn_id, tx, mut rx) = connect(&state);

    for _ in 0..60 {
        dispatch(&state, conn_id, &tx, r#"{"type":"ping"}"#);
        assert_eq!(next_json(&mut rx)["type"], "pong");
    }

    dispatch(&state, conn_id, &tx, r#"{"type":"ping"}"#);
    let reply = next_json(&mut rx);
    assert_eq!(reply["type"], "error");
    // Connection stays open; session still registered.
    assert!(state.sessions.get(conn_id).is_some());
}

#[test]
fn test_task_report_with_pending_id_is_acknowledged() {
    let (state, _dir) = make_state();
    let (conn_id, tx, mut rx) = connect(&state);
    let (secret, wallet) = wallet_key(0x11);

    let success = handshake(&state, conn_id, &tx, &mut rx, &secret, &wallet);
    let node_id = success["data"]["nodeId"].as_str().unwrap().to_string();

    let delivered = state.publish_news(serde_json::json!({"count": 2}));
    assert_eq!(delivered, 1);
    let news = next_json(&mut rx);
    assert_eq!(news["type"], "news:update");
    let task_id = news["data"]["taskId"].as_str().unwrap().to_string();

    let report = serde_json::json!({
        "type": "node:task:complete",
        "data": {
            "nodeId": node_id,
            "taskType": "cache",
            "articleCount": 2,
            "bytesProcessed": 4096,
            "taskId": task_id,
        }
    });
    dispatch(&state, conn_id, &tx, &report.to_string());

    let ack = next_json(&mut rx);
    assert_eq!(ack["type"], "task:acknowledged");
    assert_eq!(ack["data"]["taskId"], task_id);
    assert_eq!(ack["data"]["status"], "completed");

    let totals = state.tasks.totals();
    assert_eq!(totals.articles_cached, 2);
    assert_eq!(totals.bytes_processed, 4096);
    assert_eq!(state.metrics.snapshot().total_cached, 2);

    // Same task id a second time: accepted as unsolicited, no second ack.
    dispatch(&state, conn_id, &tx, &report.to_string());
    assert!(rx.try_recv().is_err());
    assert_eq!(state.tasks.totals().articles_cached, 4);
}

#[test]
fn test_unsolicited_report_without_auth_is_rejected() {
    let (state, _dir) = make_state();
    let (conn_id, tx, mut rx) = connect(&state);

    let report = serde_json::json!({
        "type": "node:task:complete",
        "data": {
            "nodeId": "pulse_ghost",
            "taskType": "relay",
            "articleCount": 1,
            "bytesProcessed": 10,
        }
    });
    dispatch(&state, conn_id, &tx, &report.to_string());
    assert_eq!(next_json(&mut rx)["type"], "error");
}

#[test]
fn test_unsubscribe_is_idempotent() {
    let (state, _dir) = make_state();
    let (conn_id, tx, mut rx) = connect(&state);
    let (secret, wallet) = wallet_key(0x11);

    handshake(&state, conn_id, &tx, &mut rx, &secret, &wallet);
    assert_eq!(state.broadcast.subscriber_count(), 1);

    dispatch(&state, conn_id, &tx, r#"{"type":"unsubscribe"}"#);
    assert_eq!(state.broadcast.subscriber_count(), 0);

    dispatch(&state, conn_id, &tx, r#"{"type":"unsubscribe"}"#);
    assert_eq!(state.broadcast.subscriber_count(), 0);
}

#[test]
fn test_denied_connection_quota_holds_on_retry() {
    let (state, _dir) = make_state();
    let (_, wallet) = wallet_key(0x31);

    // Default quota: three connections per wallet per window.
    for _ in 0..3 {
        let (conn_id, tx, mut rx) = connect(&state);
        dispatch(&state, conn_id, &tx, &register_json(&wallet, None, None));
        assert_eq!(next_json(&mut rx)["type"], "auth:challenge");
    }

    let (conn4, tx4, mut rx4) = connect(&state);
    dispatch(&state, conn4, &tx4, &register_json(&wallet, None, None));
    assert_eq!(next_json(&mut rx4)["type"], "error");

    // Retrying on the same connection must not slip past the quota.
    dispatch(&state, conn4, &tx4, &register_json(&wallet, None, None));
    assert_eq!(next_json(&mut rx4)["type"], "error");
    assert!(!state.broadcast.is_subscribed(conn4));
}

#[test]
fn test_pruned_node_counters_survive_via_storage() {
    let (state, _dir) = make_state();
    let node = AuthenticatedNode {
        wallet: wallet_key(0x11).1,
        node_id: NodeId::generate(),
        authenticated_at: 1_000,
    };
    let report = TaskReportPayload {
        node_id: node.node_id.as_str().to_string(),
        task_type: TaskType::Cache,
        article_count: 10,
        bytes_processed: 1024,
        task_id: None,
    };

    state.tasks.report_at(&node, &report, 1_000);

    // The node goes quiet past the active window; reading totals evicts
    // its live entry.
    let totals = state.tasks.totals_at(1_100);
    assert_eq!(totals.active_nodes, 0);
    assert!(state.tasks.node(node.node_id.as_str()).is_none());

    // A later report must resume from the persisted counters.
    state.tasks.report_at(&node, &report, 1_200);
    let entry = state.tasks.node(node.node_id.as_str()).unwrap();
    assert_eq!(entry.articles_cached, 20);
    assert_eq!(entry.bytes_processed, 2048);

    let stored = state
        .storage
        .get_node_stats(node.node_id.as_str())
        .unwrap()
        .unwrap();
    assert_eq!(stored.articles_cached, 20);
    assert_eq!(stored.bytes_processed, 2048);
}

#[test]
fn test_pending_tasks_expire_after_ttl() {
    let registry = SessionRegistry::new();
    let conn = registry.open();

    registry.add_pending_task_at(conn, "stale", 1_000);
    registry.add_pending_task_at(conn, "fresh", 1_290);
    registry.prune_pending_tasks_at(1_301);

    assert!(!registry.take_pending_task(conn, "stale"));
    assert!(registry.take_pending_task(conn, "fresh"));
}

#[test]
fn test_close_removes_session_state() {
    let (state, _dir) = make_state();
    let (conn_id, tx, mut rx) = connect(&state);
    let (secret, wallet) = wallet_key(0x11);

    handshake(&state, conn_id, &tx, &mut rx, &secret, &wallet);

    state.broadcast.unsubscribe(conn_id);
    let closed = state.sessions.close(conn_id);
    assert!(closed.unwrap().authenticated);
    assert!(state.sessions.get(conn_id).is_none());
    assert_eq!(state.broadcast.subscriber_count(), 0);
}
