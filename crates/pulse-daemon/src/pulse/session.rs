use parking_lot::RwLock;
use pulse_types::{EthAddress, NodeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Pending task ids the node never reported on are dropped after this
/// long, so long-lived sessions stay bounded.
const PENDING_TASK_TTL_SECS: i64 = 300;

/// Opaque handle for one live channel. Monotonic, so iteration in key
/// order equals registration order.
pub type ConnId = u64;

/// Mutable per-connection state; created on open, discarded on close.
#[derive(Clone, Debug)]
pub struct NodeSession {
    pub conn_id: ConnId,
    pub wallet: Option<EthAddress>,
    pub node_id: Option<NodeId>,
    pub authenticated: bool,
    pub message_count: u64,
    pub last_message_at: i64,
    /// Task id to the time it was handed out.
    pub pending_tasks: HashMap<String, i64>,
    /// Nonce of the challenge issued to this connection, if any.
    pub nonce: Option<String>,
    /// Whether this connection was already counted against the per-wallet
    /// connection quota.
    pub connection_counted: bool,
}

impl NodeSession {
    fn new(conn_id: ConnId) -> Self {
        Self {
            conn_id,
            wallet: None,
            node_id: None,
            authenticated: false,
            message_count: 0,
            last_message_at: chrono::Utc::now().timestamp(),
            pending_tasks: HashMap::new(),
            nonce: None,
            connection_counted: false,
        }
    }
}

/// Single source of truth for "is this channel who it claims to be".
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnId, NodeSession>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn open(&self) -> ConnId {
        let conn_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.write().insert(conn_id, NodeSession::new(conn_id));
        debug!("Session {} opened", conn_id);
        conn_id
    }

    /// Removes the session along with its nonce state. The caller is
    /// responsible for unsubscribing the connection.
    pub fn close(&self, conn_id: ConnId) -> Option<NodeSession> {
        let removed = self.sessions.write().remove(&conn_id);
        if removed.is_some() {
            debug!("Session {} closed", conn_id);
        }
        removed
    }

    pub fn get(&self, conn_id: ConnId) -> Option<NodeSession> {
        self.sessions.read().get(&conn_id).cloned()
    }

    pub fn with_session<T>(
        &self,
        conn_id: ConnId,
        f: impl FnOnce(&mut NodeSession) -> T,
    ) -> Option<T> {
        self.sessions.write().get_mut(&conn_id).map(f)
    }

    pub fn note_message(&self, conn_id: ConnId) {
        self.with_session(conn_id, |s| {
            s.message_count += 1;
            s.last_message_at = chrono::Utc::now().timestamp();
        });
    }

    pub fn set_nonce(&self, conn_id: ConnId, nonce: String) {
        self.with_session(conn_id, |s| s.nonce = Some(nonce));
    }

    pub fn mark_authenticated(&self, conn_id: ConnId, wallet: EthAddress, node_id: NodeId) {
        self.with_session(conn_id, |s| {
            s.wallet = Some(wallet);
            s.node_id = Some(node_id);
            s.authenticated = true;
            s.nonce = None;
        });
    }

    /// Registers a server-assigned task id the node is expected to report
    /// back on.
    pub fn add_pending_task(&self, conn_id: ConnId, task_id: &str) {
        self.add_pending_task_at(conn_id, task_id, chrono::Utc::now().timestamp());
    }

    pub(crate) fn add_pending_task_at(&self, conn_id: ConnId, task_id: &str, now: i64) {
        self.with_session(conn_id, |s| {
            s.pending_tasks.insert(task_id.to_string(), now);
        });
    }

    /// True when the task id was pending on this session; clears it.
    pub fn take_pending_task(&self, conn_id: ConnId, task_id: &str) -> bool {
        self.with_session(conn_id, |s| s.pending_tasks.remove(task_id).is_some())
            .unwrap_or(false)
    }

    /// Expires pending task ids nobody reported on.
    pub fn prune_pending_tasks(&self) {
        self.prune_pending_tasks_at(chrono::Utc::now().timestamp());
    }

    pub(crate) fn prune_pending_tasks_at(&self, now: i64) {
        let mut sessions = self.sessions.write();
        for session in sessions.values_mut() {
            session
                .pending_tasks
                .retain(|_, issued_at| now - *issued_at < PENDING_TASK_TTL_SECS);
        }
    }

    pub fn authenticated_conn_ids(&self) -> Vec<ConnId> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.authenticated)
            .map(|s| s.conn_id)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
