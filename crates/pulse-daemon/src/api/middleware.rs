use crate::limits::WindowLimiter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

/// Token-bucket limiter, one bucket per client IP plus a global bucket
/// sized at ten clients' worth.
pub struct ApiRateLimiter {
    tokens_per_sec: f64,
    burst_size: u32,
    state: RwLock<HashMap<IpAddr, TokenBucket>>,
    global: RwLock<TokenBucket>,
}

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(initial: f64) -> Self {
        Self {
            tokens: initial,
            last_update: Instant::now(),
        }
    }

    fn try_consume(&mut self, rate: f64, max: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        self.tokens = (self.tokens + elapsed * rate).min(max);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed,
    IpLimitExceeded,
    GlobalLimitExceeded,
}

impl ApiRateLimiter {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            tokens_per_sec: requests_per_second as f64,
            burst_size,
            state: RwLock::new(HashMap::new()),
            global: RwLock::new(TokenBucket::new(burst_size as f64 * 10.0)),
        }
    }

    pub fn check_request(&self, ip: IpAddr) -> RateLimitResult {
        {
            let mut global = self.global.write();
            if !global.try_consume(self.tokens_per_sec * 10.0, self.burst_size as f64 * 10.0) {
                return RateLimitResult::GlobalLimitExceeded;
            }
        }

        let mut state = self.state.write();
        let bucket = state
            .entry(ip)
            .or_insert_with(|| TokenBucket::new(self.burst_size as f64));

        if bucket.try_consume(self.tokens_per_sec, self.burst_size as f64) {
            RateLimitResult::Allowed
        } else {
            RateLimitResult::IpLimitExceeded
        }
    }

    /// Drops buckets idle for five minutes.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.state
            .write()
            .retain(|_, bucket| now.duration_since(bucket.last_update).as_secs() < 300);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    Authenticated,
    NotRequired,
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

/// Bearer-token gate. With no token configured every path is open.
pub struct ApiAuthenticator {
    token: Option<String>,
    public_paths: Vec<&'static str>,
}

impl ApiAuthenticator {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            public_paths: vec!["/health"],
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(&self.token, Some(t) if !t.is_empty())
    }

    pub fn authenticate(&self, path: &str, auth_header: Option<&str>) -> AuthResult {
        let expected = match &self.token {
            Some(t) if !t.is_empty() => t,
            _ => return AuthResult::NotRequired,
        };

        if self.public_paths.contains(&path) {
            return AuthResult::NotRequired;
        }

        let header = match auth_header {
            Some(h) => h,
            None => return AuthResult::MissingToken,
        };

        let provided = match header.strip_prefix("Bearer ") {
            Some(p) => p,
            None => return AuthResult::InvalidFormat,
        };

        if constant_time_compare(provided, expected) {
            AuthResult::Authenticated
        } else {
            AuthResult::InvalidToken
        }
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[derive(Debug, Default)]
pub struct RequestHeaders {
    pub authorization: Option<String>,
    pub content_length: Option<usize>,
    pub content_type: Option<String>,
}

impl RequestHeaders {
    pub fn parse(lines: &[String]) -> Self {
        let mut headers = Self::default();

        for line in lines {
            let line = line.trim();
            if let Some(colon) = line.find(':') {
                let name = line[..colon].trim().to_lowercase();
                let value = line[colon + 1..].trim().to_string();

                match name.as_str() {
                    "authorization" => headers.authorization = Some(value),
                    "content-length" => headers.content_length = value.parse().ok(),
                    "content-type" => headers.content_type = Some(value),
                    _ => {}
                }
            }
        }

        headers
    }
}

/// Everything the request path needs besides the application state.
#[derive(Clone)]
pub struct ApiContext {
    pub rate_limiter: Arc<ApiRateLimiter>,
    pub authenticator: Arc<ApiAuthenticator>,
    /// Per-client budget for the manual feed refresh, keyed by IP.
    pub refresh_limiter: Arc<WindowLimiter>,
}

impl ApiContext {
    pub fn new(
        auth_token: Option<String>,
        requests_per_second: u32,
        burst_size: u32,
        refresh_per_client_per_min: u32,
    ) -> Self {
        Self {
            rate_limiter: Arc::new(ApiRateLimiter::new(requests_per_second, burst_size)),
            authenticator: Arc::new(ApiAuthenticator::new(auth_token)),
            refresh_limiter: Arc::new(WindowLimiter::new(refresh_per_client_per_min, 60)),
        }
    }
}
