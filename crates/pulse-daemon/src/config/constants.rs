pub const DEFAULT_CHANNEL_PORT: u16 = 8460;

pub const DEFAULT_API_PORT: u16 = 8461;

pub const DEFAULT_RATE_LIMIT_RPS: u32 = 100;

/// Sliding-window length shared by the wallet/session limiters.
pub const DEFAULT_LIMIT_WINDOW_SECS: u64 = 60;

pub const DEFAULT_CONNECTIONS_PER_WALLET: u32 = 3;

pub const DEFAULT_CHALLENGES_PER_WALLET: u32 = 5;

pub const DEFAULT_MESSAGES_PER_SESSION: u32 = 60;

/// Feed scheduler tick.
pub const DEFAULT_FEED_POLL_SECS: u64 = 60;

/// Sources polled per tick, least-recently-fetched first.
pub const DEFAULT_FEED_BATCH_SIZE: usize = 5;

pub const DEFAULT_FEED_BASE_INTERVAL_SECS: u64 = 300;

pub const DEFAULT_FEED_MAX_INTERVAL_SECS: u64 = 3_600;

/// Exponent cap for feed backoff (2^6 = 64x base).
pub const DEFAULT_FEED_BACKOFF_EXP_CAP: u32 = 6;

/// Sources past this many consecutive errors are skipped until reset.
pub const DEFAULT_FEED_ERROR_CEILING: u32 = 10;

pub const DEFAULT_FEED_REQUEST_TIMEOUT_SECS: u64 = 20;

pub const DEFAULT_METRICS_WINDOW_SECS: i64 = 3_600;

pub const DEFAULT_METRICS_PRUNE_SECS: u64 = 300;

/// On-demand refresh calls allowed per client per window.
pub const DEFAULT_REFRESH_PER_CLIENT: u32 = 5;
