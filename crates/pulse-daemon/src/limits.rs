//! Per-identity sliding-window quotas for the channel protocol.

use crate::config::RateLimitConfig;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug)]
struct WindowState {
    count: u32,
    reset_at: i64,
}

/// One `{count, reset_at}` window per identity. The first check after
/// `reset_at` starts a fresh window with count 1; inside the window the
/// counter increments and is compared against the limit.
pub struct WindowLimiter {
    limit: u32,
    window_secs: i64,
    state: RwLock<HashMap<String, WindowState>>,
}

impl WindowLimiter {
    pub fn new(limit: u32, window_secs: u64) -> Self {
        Self {
            limit,
            window_secs: window_secs as i64,
            state: RwLock::new(HashMap::new()),
        }
    }

    /// True when the identity is still within its quota.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, chrono::Utc::now().timestamp())
    }

    fn check_at(&self, key: &str, now: i64) -> bool {
        let mut state = self.state.write();
        let window = state.entry(key.to_string()).or_insert(WindowState {
            count: 0,
            reset_at: now + self.window_secs,
        });

        if now >= window.reset_at {
            window.count = 1;
            window.reset_at = now + self.window_secs;
            return true;
        }

        window.count += 1;
        window.count <= self.limit
    }

    /// Drops windows whose reset time has passed.
    pub fn cleanup(&self) {
        let now = chrono::Utc::now().timestamp();
        self.state.write().retain(|_, w| w.reset_at > now);
    }

    pub fn tracked(&self) -> usize {
        self.state.read().len()
    }
}

/// The three independent channel quotas.
pub struct RateLimiters {
    pub connections: WindowLimiter,
    pub challenges: WindowLimiter,
    pub messages: WindowLimiter,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            connections: WindowLimiter::new(config.connections_per_wallet, config.window_secs),
            challenges: WindowLimiter::new(config.challenges_per_wallet, config.window_secs),
            messages: WindowLimiter::new(config.messages_per_session, config.window_secs),
        }
    }

    pub fn cleanup(&self) {
        self.connections.cleanup();
        self.challenges.cleanup();
        self.messages.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_boundary() {
        let limiter = WindowLimiter::new(60, 60);

        for i in 0..60 {
            assert!(limiter.check_at("session-1", 1_000), "message {} should pass", i + 1);
        }
        assert!(!limiter.check_at("session-1", 1_000), "61st message must be rejected");
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let limiter = WindowLimiter::new(3, 60);

        for _ in 0..3 {
            assert!(limiter.check_at("0xwallet", 1_000));
        }
        assert!(!limiter.check_at("0xwallet", 1_030));

        // First check past reset_at starts a fresh window with count 1.
        assert!(limiter.check_at("0xwallet", 1_061));
        assert!(limiter.check_at("0xwallet", 1_062));
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = WindowLimiter::new(1, 60);

        assert!(limiter.check_at("a", 1_000));
        assert!(!limiter.check_at("a", 1_001));
        assert!(limiter.check_at("b", 1_001));
    }

    #[test]
    fn test_cleanup_drops_expired_windows() {
        let limiter = WindowLimiter::new(5, 0);

        limiter.check("stale");
        assert_eq!(limiter.tracked(), 1);
        limiter.cleanup();
        assert_eq!(limiter.tracked(), 0);
    }

    #[test]
    fn test_config_wiring() {
        let limits = RateLimiters::from_config(&RateLimitConfig::default());
        assert!(limits.connections.check("0xw"));
        assert!(limits.challenges.check("0xw"));
        assert!(limits.messages.check("conn-1"));
    }
}
