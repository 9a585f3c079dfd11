mod api;
mod channel;
mod constants;
mod feeds;
mod logging;
mod metrics;
mod node;
mod rate_limit;
mod types;

pub use api::ApiConfig;
pub use channel::ChannelConfig;
pub use constants::*;
pub use feeds::FeedsConfig;
pub use logging::LoggingConfig;
pub use metrics::MetricsConfig;
pub use node::PulseConfig;
pub use rate_limit::RateLimitConfig;
pub use types::{LogLevel, NotifyMode};

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_default_config_validates() {
        let config = PulseConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_defaults_to_localhost() {
        let config = PulseConfig::default();
        assert_eq!(config.api.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = PulseConfig::default();
        config.channel.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_ports_rejected() {
        let mut config = PulseConfig::default();
        config.channel.port = 8460;
        config.api.port = 8460;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_feed_intervals_rejected() {
        let mut config = PulseConfig::default();
        config.feeds.base_interval_secs = 600;
        config.feeds.max_interval_secs = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_http_seed_url_rejected() {
        let mut config = PulseConfig::default();
        config.feeds.seed_urls = vec!["ftp://feeds.example.com/a.xml".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_webhook_mode_requires_url() {
        let mut config = PulseConfig::default();
        config.feeds.notify = NotifyMode::Webhook;
        config.feeds.notify_webhook = None;
        assert!(config.validate().is_err());

        config.feeds.notify_webhook = Some("https://hooks.example.com/pulse".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_defaults_match_protocol_quotas() {
        let limits = RateLimitConfig::default();
        assert_eq!(limits.connections_per_wallet, 3);
        assert_eq!(limits.challenges_per_wallet, 5);
        assert_eq!(limits.messages_per_session, 60);
        assert_eq!(limits.window_secs, 60);
    }
}
