#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod auth;
pub mod cancellation;
pub mod config;
pub mod feeds;
pub mod limits;
pub mod metrics;
pub mod pulse;
pub mod storage;

pub use api::ApiServer;
pub use auth::{AuthEngine, AuthGrant, AuthenticatedNode};
pub use cancellation::{shutdown_pair, CancellationToken, ShutdownController};
pub use config::{
    ApiConfig, ChannelConfig, FeedsConfig, LoggingConfig, MetricsConfig, NotifyMode, PulseConfig,
    RateLimitConfig,
};
pub use feeds::{FeedWorker, NotificationSink, RefreshOutcome};
pub use limits::{RateLimiters, WindowLimiter};
pub use metrics::MetricsAggregator;
pub use pulse::{BroadcastEngine, ChannelServer, PulseState, SessionRegistry, TaskTracker};
pub use storage::{FeedArticleRecord, FeedSourceRecord, NodeStatsRecord, PulseStorage};
