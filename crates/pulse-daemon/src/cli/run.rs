use pulse_daemon::{
    shutdown_pair, ApiServer, ChannelServer, FeedWorker, PulseConfig, PulseState, PulseStorage,
};
use pulse_types::protocol::PulseEvent;
use pulse_types::{PulseError, PulseResult};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub async fn run_node(
    config_path: &PathBuf,
    data_dir: &PathBuf,
    pid_file: Option<PathBuf>,
) -> PulseResult<()> {
    info!("Starting Pulse daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", data_dir);

    if let Some(ref pid_path) = pid_file {
        std::fs::write(pid_path, std::process::id().to_string())
            .map_err(|e| PulseError::Config(format!("Failed to write PID file: {}", e)))?;
        info!("PID file written: {:?}", pid_path);
    }

    std::fs::create_dir_all(data_dir)
        .map_err(|e| PulseError::Config(format!("Failed to create data directory: {}", e)))?;

    let config = PulseConfig::load(config_path)?;

    let storage_path = data_dir.join("data");
    let storage = Arc::new(PulseStorage::open(&storage_path)?);
    info!("Storage initialized at {:?}", storage_path);

    for url in &config.feeds.seed_urls {
        storage.seed_source(url)?;
    }

    let state = Arc::new(PulseState::new(config.clone(), Arc::clone(&storage))?);

    let shutdown = Arc::new(AtomicBool::new(false));
    let (controller, cancel) = shutdown_pair();

    let metrics = Arc::clone(&state.metrics);
    let metrics_shutdown = Arc::clone(&shutdown);
    let prune_interval = config.metrics.prune_interval_secs;
    tokio::spawn(async move {
        metrics.run(prune_interval, metrics_shutdown).await;
    });

    let worker = Arc::new(FeedWorker::new(Arc::clone(&state))?);
    if config.feeds.enabled {
        let worker = Arc::clone(&worker);
        let worker_shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            worker.run(worker_shutdown).await;
        });
    } else {
        info!("Feed ingestion disabled");
    }

    if config.channel.enabled {
        let addr = std::net::SocketAddr::new(config.channel.bind_address, config.channel.port);
        let server = ChannelServer::new(Arc::clone(&state));
        let channel_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run(addr, channel_cancel).await {
                error!("Channel server error: {}", e);
            }
        });
    }

    if config.api.enabled {
        let addr = std::net::SocketAddr::new(config.api.bind_address, config.api.port);
        let server = ApiServer::new(Arc::clone(&state), Arc::clone(&worker));
        let api_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run(addr, api_cancel).await {
                error!("API server error: {}", e);
            }
        });
    }

    // Housekeeping: quota windows, expired auth state, stale nodes, and
    // a periodic metrics push so idle subscribers stay current.
    {
        let state = Arc::clone(&state);
        let storage = Arc::clone(&storage);
        let maintenance_shutdown = Arc::clone(&shutdown);
        let push_interval = config.metrics.prune_interval_secs.max(1);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(push_interval));
            loop {
                if maintenance_shutdown.load(Ordering::SeqCst) {
                    break;
                }
                ticker.tick().await;

                state.cleanup();
                if let Err(e) = storage.flush() {
                    warn!("Storage flush failed: {}", e);
                }

                if state.broadcast.subscriber_count() > 0 {
                    let snapshot = state.metrics.snapshot();
                    match serde_json::to_value(&snapshot) {
                        Ok(data) => {
                            state.broadcast.broadcast(&PulseEvent::metrics_update(data));
                        }
                        Err(e) => warn!("Failed to serialize metrics snapshot: {}", e),
                    }
                }
            }
        });
    }

    info!(
        "Pulse is running (channel :{}, api :{})",
        config.channel.port, config.api.port
    );

    wait_for_shutdown().await;

    info!("Shutting down...");
    shutdown.store(true, Ordering::SeqCst);
    controller.shutdown();

    // Give the accept loops a moment to drain before the final flush.
    tokio::time::sleep(Duration::from_millis(200)).await;
    storage.flush()?;

    if let Some(ref pid_path) = pid_file {
        let _ = std::fs::remove_file(pid_path);
    }

    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to install SIGINT handler: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C");
        }
    }
}
