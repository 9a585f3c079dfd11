use super::middleware::{ApiContext, AuthResult, RateLimitResult, RequestHeaders};
use super::responses::*;
use crate::feeds::FeedWorker;
use crate::pulse::PulseState;
use pulse_types::{EthAddress, PulseError, PulseResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const MAX_BODY_BYTES: usize = 64 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn handle_request(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<PulseState>,
    worker: Arc<FeedWorker>,
    started_at: i64,
    context: Arc<ApiContext>,
) -> PulseResult<()> {
    let mut reader = BufReader::new(&mut stream);
    let mut request_line = String::new();

    match tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut request_line)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            return send_error_response(
                &mut stream,
                400,
                "BAD_REQUEST",
                &format!("Failed to read request: {}", e),
            )
            .await;
        }
        Err(_) => {
            return send_error_response(&mut stream, 408, "TIMEOUT", "Request timeout").await;
        }
    }

    let parts: Vec<&str> = request_line.trim().split_whitespace().collect();
    if parts.len() < 2 {
        return send_error_response(&mut stream, 400, "BAD_REQUEST", "Invalid request line").await;
    }
    let method = parts[0].to_string();
    let path = parts[1].to_string();

    let mut header_lines = Vec::new();
    loop {
        let mut line = String::new();
        match tokio::time::timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
            Ok(Ok(_)) => {
                if line.trim().is_empty() {
                    break;
                }
                header_lines.push(line);
            }
            Ok(Err(e)) => {
                return send_error_response(
                    &mut stream,
                    400,
                    "BAD_REQUEST",
                    &format!("Failed to read headers: {}", e),
                )
                .await;
            }
            Err(_) => {
                return send_error_response(&mut stream, 408, "TIMEOUT", "Header read timeout")
                    .await;
            }
        }
    }

    let headers = RequestHeaders::parse(&header_lines);
    let client_ip = peer_addr.ip();

    match context.rate_limiter.check_request(client_ip) {
        RateLimitResult::Allowed => {}
        RateLimitResult::IpLimitExceeded => {
            return send_error_response(
                &mut stream,
                429,
                "RATE_LIMITED",
                "Too many requests from your IP",
            )
            .await;
        }
        RateLimitResult::GlobalLimitExceeded => {
            return send_error_response(
                &mut stream,
                503,
                "SERVICE_OVERLOADED",
                "Server is overloaded, please try again later",
            )
            .await;
        }
    }

    match context
        .authenticator
        .authenticate(&path, headers.authorization.as_deref())
    {
        AuthResult::Authenticated | AuthResult::NotRequired => {}
        AuthResult::MissingToken => {
            return send_error_response(
                &mut stream,
                401,
                "UNAUTHORIZED",
                "Missing Authorization header",
            )
            .await;
        }
        AuthResult::InvalidFormat => {
            return send_error_response(
                &mut stream,
                401,
                "UNAUTHORIZED",
                "Invalid Authorization format. Use: Bearer <token>",
            )
            .await;
        }
        AuthResult::InvalidToken => {
            return send_error_response(&mut stream, 403, "FORBIDDEN", "Invalid API token").await;
        }
    }

    if method == "OPTIONS" {
        return send_cors_preflight(&mut stream).await;
    }

    let body = if method == "POST" {
        let content_length = headers.content_length.unwrap_or(0);
        if content_length > MAX_BODY_BYTES {
            return send_error_response(
                &mut stream,
                413,
                "PAYLOAD_TOO_LARGE",
                "Request body too large",
            )
            .await;
        }

        let mut buf = vec![0u8; content_length];
        match tokio::time::timeout(READ_TIMEOUT, reader.read_exact(&mut buf)).await {
            Ok(Ok(_)) => String::from_utf8_lossy(&buf).into_owned(),
            _ => {
                return send_error_response(&mut stream, 400, "BAD_REQUEST", "Incomplete body")
                    .await;
            }
        }
    } else {
        String::new()
    };

    match (method.as_str(), path.as_str()) {
        ("GET", "/health") => serve_health(&mut stream, started_at).await,
        ("GET", "/v1/metrics") => serve_metrics(&mut stream, &state).await,
        ("POST", "/v1/node/task") => node_task(&mut stream, &state, &body).await,
        ("POST", "/v1/node/heartbeat") => node_heartbeat(&mut stream, &state, &body).await,
        ("POST", "/v1/feeds/refresh") => {
            feeds_refresh(&mut stream, &context, &worker, client_ip).await
        }
        _ => {
            send_error_response(
                &mut stream,
                404,
                "NOT_FOUND",
                &format!("Endpoint not found: {} {}", method, path),
            )
            .await
        }
    }
}

async fn serve_health(stream: &mut TcpStream, started_at: i64) -> PulseResult<()> {
    let response = HealthResponse {
        healthy: true,
        status: "running".to_string(),
        uptime_secs: (chrono::Utc::now().timestamp() - started_at).max(0),
    };

    let json = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
    send_response(stream, 200, "application/json", &json).await
}

async fn serve_metrics(stream: &mut TcpStream, state: &PulseState) -> PulseResult<()> {
    if !state.config.api.diagnostics_enabled {
        return send_error_response(stream, 403, "FORBIDDEN", "Diagnostics are disabled").await;
    }

    let totals = state.tasks.totals();
    let response = MetricsResponse {
        snapshot: state.metrics.snapshot(),
        active_nodes: totals.active_nodes,
        articles_cached: totals.articles_cached,
        articles_relayed: totals.articles_relayed,
        bytes_processed: totals.bytes_processed,
        bytes_broadcast: state.metrics.bytes_broadcast(),
        stored_articles: state.storage.article_count(),
        feed_sources: state.storage.list_sources()?.len(),
    };

    let json = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
    send_response(stream, 200, "application/json", &json).await
}

async fn node_task(stream: &mut TcpStream, state: &PulseState, body: &str) -> PulseResult<()> {
    let request: NodeTaskRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => {
            return send_error_response(
                stream,
                400,
                "BAD_REQUEST",
                &format!("Invalid task report: {}", e),
            )
            .await;
        }
    };

    let (node, stats) = match apply_report(state, &request) {
        Ok(pair) => pair,
        Err(e) => return send_auth_failure(stream, &e).await,
    };

    let response = NodeTaskResponse {
        accepted: true,
        node_id: node,
        articles_cached: stats.0,
        articles_relayed: stats.1,
        bytes_processed: stats.2,
    };

    let json = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
    send_response(stream, 200, "application/json", &json).await
}

fn apply_report(
    state: &PulseState,
    request: &NodeTaskRequest,
) -> PulseResult<(String, (u64, u64, u64))> {
    let wallet = EthAddress::from_hex(&request.wallet)
        .map_err(|e| PulseError::Auth(format!("Invalid wallet: {}", e)))?;
    let node = state.auth.validate_node(&request.node_id, &wallet)?;

    let payload = pulse_types::protocol::TaskReportPayload {
        node_id: request.node_id.clone(),
        task_type: request.task_type,
        article_count: request.article_count,
        bytes_processed: request.bytes_processed,
        task_id: None,
    };
    state.tasks.report(&node, &payload);

    let stats = state
        .tasks
        .node(&request.node_id)
        .map(|s| (s.articles_cached, s.articles_relayed, s.bytes_processed))
        .unwrap_or_default();
    Ok((request.node_id.clone(), stats))
}

async fn node_heartbeat(stream: &mut TcpStream, state: &PulseState, body: &str) -> PulseResult<()> {
    let request: HeartbeatRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => {
            return send_error_response(
                stream,
                400,
                "BAD_REQUEST",
                &format!("Invalid heartbeat: {}", e),
            )
            .await;
        }
    };

    let wallet = match EthAddress::from_hex(&request.wallet) {
        Ok(w) => w,
        Err(e) => {
            return send_error_response(
                stream,
                400,
                "BAD_REQUEST",
                &format!("Invalid wallet: {}", e),
            )
            .await;
        }
    };

    if let Err(e) = state.auth.validate_node(&request.node_id, &wallet) {
        return send_auth_failure(stream, &e).await;
    }
    state.tasks.touch(&request.node_id);

    let response = HeartbeatResponse {
        acknowledged: true,
        node_id: request.node_id,
    };
    let json = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
    send_response(stream, 200, "application/json", &json).await
}

async fn feeds_refresh(
    stream: &mut TcpStream,
    context: &ApiContext,
    worker: &FeedWorker,
    client_ip: std::net::IpAddr,
) -> PulseResult<()> {
    if !context.refresh_limiter.check(&client_ip.to_string()) {
        return send_error_response(
            stream,
            429,
            "RATE_LIMITED",
            "Refresh quota exhausted, try again later",
        )
        .await;
    }

    match worker.poll_due(true).await {
        Ok(outcome) => {
            let json = serde_json::to_string(&outcome).unwrap_or_else(|_| "{}".to_string());
            send_response(stream, 200, "application/json", &json).await
        }
        Err(PulseError::Feed(message)) => {
            send_error_response(stream, 409, "REFRESH_IN_PROGRESS", &message).await
        }
        Err(e) => {
            send_error_response(stream, 500, "INTERNAL_ERROR", &format!("Refresh failed: {}", e))
                .await
        }
    }
}

async fn send_auth_failure(stream: &mut TcpStream, err: &PulseError) -> PulseResult<()> {
    match err {
        PulseError::Auth(m) => send_error_response(stream, 401, "UNAUTHORIZED", m).await,
        other => {
            send_error_response(stream, 500, "INTERNAL_ERROR", &other.to_string()).await
        }
    }
}

pub async fn send_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &str,
) -> PulseResult<()> {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        409 => "Conflict",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    };

    let response = format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Authorization, Content-Type\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        content_type,
        body.len(),
        body
    );

    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| PulseError::Network(format!("Failed to send response: {}", e)))?;

    Ok(())
}

pub async fn send_error_response(
    stream: &mut TcpStream,
    status: u16,
    code: &str,
    message: &str,
) -> PulseResult<()> {
    let body = serde_json::json!({
        "error": {
            "code": code,
            "message": message,
            "status": status
        }
    });
    send_response(stream, status, "application/json", &body.to_string()).await
}

async fn send_cors_preflight(stream: &mut TcpStream) -> PulseResult<()> {
    let response = "HTTP/1.1 204 No Content\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Authorization, Content-Type\r\n\
         Access-Control-Max-Age: 86400\r\n\
         Connection: close\r\n\
         \r\n";

    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| PulseError::Network(format!("Failed to send CORS response: {}", e)))?;

    Ok(())
}
