use super::constants::DEFAULT_CHANNEL_PORT;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Bind configuration for the persistent node channel (WebSocket).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub enabled: bool,
    pub bind_address: IpAddr,
    pub port: u16,
    pub max_connections: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_CHANNEL_PORT,
            max_connections: 10_000,
        }
    }
}
