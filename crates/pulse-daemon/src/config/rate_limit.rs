use super::constants::{
    DEFAULT_CHALLENGES_PER_WALLET, DEFAULT_CONNECTIONS_PER_WALLET, DEFAULT_LIMIT_WINDOW_SECS,
    DEFAULT_MESSAGES_PER_SESSION,
};
use serde::{Deserialize, Serialize};

/// Sliding-window quotas for the channel protocol. Exceeding one never
/// drops the connection, only the offending message.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub connections_per_wallet: u32,
    pub challenges_per_wallet: u32,
    pub messages_per_session: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            connections_per_wallet: DEFAULT_CONNECTIONS_PER_WALLET,
            challenges_per_wallet: DEFAULT_CHALLENGES_PER_WALLET,
            messages_per_session: DEFAULT_MESSAGES_PER_SESSION,
            window_secs: DEFAULT_LIMIT_WINDOW_SECS,
        }
    }
}
