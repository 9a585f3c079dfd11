use super::constants::{DEFAULT_API_PORT, DEFAULT_RATE_LIMIT_RPS, DEFAULT_REFRESH_PER_CLIENT};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: IpAddr,
    pub port: u16,
    /// Bearer token required for diagnostic endpoints when set.
    pub auth_token: Option<String>,
    pub auth_required: bool,
    /// Gate for `/v1/metrics`; off by default outside development.
    pub diagnostics_enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
    pub refresh_per_client_per_min: u32,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_API_PORT,
            auth_token: None,
            auth_required: false,
            diagnostics_enabled: false,
            requests_per_second: DEFAULT_RATE_LIMIT_RPS,
            burst_size: 200,
            refresh_per_client_per_min: DEFAULT_REFRESH_PER_CLIENT,
            request_timeout_secs: 30,
        }
    }
}
