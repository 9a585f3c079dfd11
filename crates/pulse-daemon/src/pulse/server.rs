use super::broadcast::Outbound;
use super::session::ConnId;
use super::PulseState;
use crate::cancellation::CancellationToken;
use futures::{SinkExt, StreamExt};
use pulse_types::protocol::{ClientMessage, RegisterPayload, ServerMessage, TaskReportPayload};
use pulse_types::{EcdsaSignature, EthAddress, PulseError, PulseResult, NODE_CAPABILITIES};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Accept loop for the persistent node channel.
pub struct ChannelServer {
    state: Arc<PulseState>,
}

impl ChannelServer {
    pub fn new(state: Arc<PulseState>) -> Self {
        Self { state }
    }

    pub async fn run(&self, addr: SocketAddr, mut cancel: CancellationToken) -> PulseResult<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| PulseError::Network(format!("Failed to bind channel server: {}", e)))?;
        info!("Channel server listening on {}", addr);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Channel server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let state = Arc::clone(&self.state);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(state, stream, peer).await {
                                    debug!("Connection from {} ended: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => warn!("Accept failed: {}", e),
                    }
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    state: Arc<PulseState>,
    stream: TcpStream,
    peer: SocketAddr,
) -> PulseResult<()> {
    let ws = accept_async(stream)
        .await
        .map_err(|e| PulseError::Network(format!("Handshake failed: {}", e)))?;
    let (mut sink, mut source) = ws.split();

    let conn_id = state.sessions.open();
    debug!("Connection {} accepted from {}", conn_id, peer);

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = source.next().await {
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                debug!("Connection {} read error: {}", conn_id, e);
                break;
            }
        };

        match frame {
            Message::Text(text) => dispatch(&state, conn_id, &tx, &text),
            Message::Ping(data) => {
                let _ = tx.send(Message::Pong(data));
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // The only implicit path out of the subscriber set.
    state.broadcast.unsubscribe(conn_id);
    state.sessions.close(conn_id);
    drop(tx);
    let _ = writer.await;
    debug!("Connection {} closed", conn_id);
    Ok(())
}

fn send(tx: &Outbound, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(json) => {
            let _ = tx.send(Message::Text(json));
        }
        Err(e) => warn!("Failed to serialize server message: {}", e),
    }
}

fn send_failure(tx: &Outbound, err: &PulseError) {
    let message = match err {
        PulseError::Auth(m) => ServerMessage::AuthError { message: m.clone() },
        PulseError::RateLimited(m) => ServerMessage::Error { message: m.clone() },
        other => ServerMessage::Error {
            message: other.to_string(),
        },
    };
    send(tx, &message);
}

/// One inbound frame, executed to completion. Every failure turns into a
/// client-visible event; nothing here tears the connection down.
pub(crate) fn dispatch(state: &PulseState, conn_id: ConnId, tx: &Outbound, raw: &str) {
    state.sessions.note_message(conn_id);

    if !state.limits.messages.check(&format!("conn-{}", conn_id)) {
        send(
            tx,
            &ServerMessage::Error {
                message: "Message rate limit exceeded, message dropped".into(),
            },
        );
        return;
    }

    let message: ClientMessage = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(e) => {
            debug!("Connection {} sent malformed message: {}", conn_id, e);
            send(
                tx,
                &ServerMessage::Error {
                    message: "Unrecognized or malformed message".into(),
                },
            );
            return;
        }
    };

    match message {
        ClientMessage::Register(payload) => handle_register(state, conn_id, tx, payload),
        ClientMessage::TaskComplete(report) => handle_task_complete(state, conn_id, tx, report),
        ClientMessage::Ping => send(
            tx,
            &ServerMessage::Pong {
                server_time: chrono::Utc::now().timestamp_millis(),
            },
        ),
        ClientMessage::Unsubscribe => state.broadcast.unsubscribe(conn_id),
    }
}

fn handle_register(state: &PulseState, conn_id: ConnId, tx: &Outbound, payload: RegisterPayload) {
    let wallet = match EthAddress::from_hex(&payload.wallet) {
        Ok(w) => w,
        Err(e) => {
            send(
                tx,
                &ServerMessage::AuthError {
                    message: format!("Invalid wallet: {}", e),
                },
            );
            return;
        }
    };

    // Re-register on an authenticated session just re-confirms identity.
    if let Some(session) = state.sessions.get(conn_id) {
        if session.authenticated {
            if let (Some(node_id), Some(session_wallet)) = (session.node_id, session.wallet) {
                send(
                    tx,
                    &ServerMessage::AuthSuccess {
                        node_id: node_id.as_str().to_string(),
                        wallet: session_wallet.to_hex(),
                        session_token: None,
                        capabilities: capability_list(),
                        metrics: state.metrics.snapshot(),
                    },
                );
                return;
            }
        }
    }

    // Charged once per connection. The flag is set only after the quota
    // admits the wallet, so a denied register stays denied on retry.
    let already_counted = state
        .sessions
        .get(conn_id)
        .map(|s| s.connection_counted)
        .unwrap_or(false);

    if !already_counted {
        if !state.limits.connections.check(&wallet.to_hex()) {
            send(
                tx,
                &ServerMessage::Error {
                    message: "Too many connection attempts for wallet".into(),
                },
            );
            return;
        }
        state
            .sessions
            .with_session(conn_id, |s| s.connection_counted = true);
    }

    if let Some(signature_hex) = payload.signature.as_deref() {
        let nonce = match state.sessions.get(conn_id).and_then(|s| s.nonce) {
            Some(n) => n,
            None => {
                send(
                    tx,
                    &ServerMessage::AuthError {
                        message: "No active challenge session".into(),
                    },
                );
                return;
            }
        };

        let signature = match EcdsaSignature::from_hex(signature_hex) {
            Ok(s) => s,
            Err(e) => {
                send(
                    tx,
                    &ServerMessage::AuthError {
                        message: format!("Invalid signature encoding: {}", e),
                    },
                );
                return;
            }
        };

        match state.auth.verify_signature(&wallet, &nonce, &signature) {
            Ok(grant) => finish_auth(state, conn_id, tx, grant),
            Err(e) => send_failure(tx, &e),
        }
    } else if let Some(token) = payload.session_token.as_deref() {
        match state.auth.verify_token(&wallet, token) {
            Ok(grant) => finish_auth(state, conn_id, tx, grant),
            Err(e) => send_failure(tx, &e),
        }
    } else {
        match state.auth.issue_challenge(&wallet) {
            Ok((challenge, nonce)) => {
                state.sessions.set_nonce(conn_id, nonce.clone());
                send(
                    tx,
                    &ServerMessage::AuthChallenge {
                        challenge,
                        wallet: wallet.to_hex(),
                        nonce,
                    },
                );
            }
            Err(e) => send_failure(tx, &e),
        }
    }
}

fn finish_auth(state: &PulseState, conn_id: ConnId, tx: &Outbound, grant: crate::auth::AuthGrant) {
    state
        .sessions
        .mark_authenticated(conn_id, grant.wallet, grant.node_id.clone());
    state.broadcast.subscribe(conn_id, tx.clone());

    send(
        tx,
        &ServerMessage::AuthSuccess {
            node_id: grant.node_id.as_str().to_string(),
            wallet: grant.wallet.to_hex(),
            session_token: grant.session_token,
            capabilities: capability_list(),
            metrics: state.metrics.snapshot(),
        },
    );
}

fn handle_task_complete(
    state: &PulseState,
    conn_id: ConnId,
    tx: &Outbound,
    report: TaskReportPayload,
) {
    let session = match state.sessions.get(conn_id) {
        Some(s) if s.authenticated => s,
        _ => {
            send(
                tx,
                &ServerMessage::Error {
                    message: "Not authenticated".into(),
                },
            );
            return;
        }
    };

    let wallet = match session.wallet {
        Some(w) => w,
        None => return,
    };

    let node = match state.auth.validate_node(&report.node_id, &wallet) {
        Ok(n) => n,
        Err(e) => {
            send_failure(tx, &e);
            return;
        }
    };

    state.tasks.report(&node, &report);

    // Acknowledge only reports answering a task we handed out; anything
    // else is an unsolicited report.
    if let Some(task_id) = &report.task_id {
        if state.sessions.take_pending_task(conn_id, task_id) {
            send(
                tx,
                &ServerMessage::TaskAcknowledged {
                    task_id: task_id.clone(),
                    status: "completed".into(),
                },
            );
        }
    }
}

fn capability_list() -> Vec<String> {
    NODE_CAPABILITIES.iter().map(|s| s.to_string()).collect()
}
