use super::handlers::handle_request;
use super::middleware::ApiContext;
use crate::cancellation::CancellationToken;
use crate::config::ApiConfig;
use crate::feeds::FeedWorker;
use crate::pulse::PulseState;
use pulse_types::{PulseError, PulseResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Plain HTTP/1 endpoint for operators and node clients that cannot
/// hold a channel open.
pub struct ApiServer {
    state: Arc<PulseState>,
    worker: Arc<FeedWorker>,
    context: Arc<ApiContext>,
    started_at: i64,
}

impl ApiServer {
    pub fn new(state: Arc<PulseState>, worker: Arc<FeedWorker>) -> Self {
        let context = Arc::new(build_context(&state.config.api));
        Self {
            state,
            worker,
            context,
            started_at: chrono::Utc::now().timestamp(),
        }
    }

    pub async fn run(&self, addr: SocketAddr, mut cancel: CancellationToken) -> PulseResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| PulseError::Network(format!("Failed to bind API server: {}", e)))?;
        info!("API server listening on http://{}", addr);

        if self.context.authenticator.is_enabled() {
            info!("API authentication: enabled");
        } else {
            warn!("API authentication: disabled, API is open to all requests");
        }

        let rate_limiter = Arc::clone(&self.context.rate_limiter);
        let mut cleanup_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = cleanup_cancel.cancelled() => break,
                    _ = ticker.tick() => rate_limiter.cleanup(),
                }
            }
        });

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("API server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("API request from {}", peer);
                            let state = Arc::clone(&self.state);
                            let worker = Arc::clone(&self.worker);
                            let context = Arc::clone(&self.context);
                            let started_at = self.started_at;

                            tokio::spawn(async move {
                                if let Err(e) =
                                    handle_request(stream, peer, state, worker, started_at, context)
                                        .await
                                {
                                    let text = e.to_string();
                                    if !text.contains("connection reset")
                                        && !text.contains("broken pipe")
                                    {
                                        warn!("API request error from {}: {}", peer, text);
                                    }
                                }
                            });
                        }
                        Err(e) => warn!("API accept failed: {}", e),
                    }
                }
            }
        }

        Ok(())
    }
}

fn build_context(config: &ApiConfig) -> ApiContext {
    let token = match (&config.auth_token, config.auth_required) {
        (Some(token), _) if !token.is_empty() => Some(token.clone()),
        (_, true) => {
            let token = pulse_crypto::random_hex::<32>();
            warn!("auth_required set without auth_token. Generated token: {}", token);
            warn!("Add this to your config.toml: auth_token = \"{}\"", token);
            Some(token)
        }
        _ => None,
    };

    ApiContext::new(
        token,
        config.requests_per_second,
        config.burst_size,
        config.refresh_per_client_per_min,
    )
}
