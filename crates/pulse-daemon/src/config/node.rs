use pulse_types::{PulseError, PulseResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use super::api::ApiConfig;
use super::channel::ChannelConfig;
use super::feeds::FeedsConfig;
use super::logging::LoggingConfig;
use super::metrics::MetricsConfig;
use super::rate_limit::RateLimitConfig;
use super::types::{LogLevel, NotifyMode};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub data_dir: PathBuf,
    pub channel: ChannelConfig,
    pub api: ApiConfig,
    pub feeds: FeedsConfig,
    pub rate_limits: RateLimitConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/var/lib/pulse"));
        Self {
            data_dir: home.join(".pulse"),
            channel: ChannelConfig::default(),
            api: ApiConfig::default(),
            feeds: FeedsConfig::default(),
            rate_limits: RateLimitConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PulseConfig {
    pub fn load(path: impl AsRef<std::path::Path>) -> PulseResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| PulseError::Config(format!("Failed to read config: {}", e)))?;

            toml::from_str(&contents)
                .map_err(|e| PulseError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<std::path::Path>) -> PulseResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| PulseError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PulseError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path.as_ref(), contents)
            .map_err(|e| PulseError::Config(format!("Failed to write config: {}", e)))?;

        info!("Configuration saved to {:?}", path.as_ref());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("PULSE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(port) = std::env::var("PULSE_CHANNEL_PORT") {
            if let Ok(p) = port.parse() {
                self.channel.port = p;
            }
        }

        if let Ok(port) = std::env::var("PULSE_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        if let Ok(bind) = std::env::var("PULSE_API_BIND") {
            if let Ok(addr) = bind.parse() {
                self.api.bind_address = addr;
                if bind != "127.0.0.1" && bind != "::1" {
                    warn!(
                        "API server binding to non-localhost address: {}. Ensure proper firewall rules.",
                        bind
                    );
                }
            }
        }

        if let Ok(token) = std::env::var("PULSE_API_TOKEN") {
            if !token.is_empty() {
                self.api.auth_token = Some(token);
                self.api.auth_required = true;
            }
        }

        if std::env::var("PULSE_DIAGNOSTICS").is_ok() {
            self.api.diagnostics_enabled = true;
        }

        if let Ok(url) = std::env::var("PULSE_NOTIFY_WEBHOOK") {
            self.feeds.notify_webhook = Some(url);
            self.feeds.notify = NotifyMode::Webhook;
        }

        if let Ok(level) = std::env::var("PULSE_LOG_LEVEL") {
            self.logging.level = match level.to_lowercase().as_str() {
                "error" => LogLevel::Error,
                "warn" => LogLevel::Warn,
                "info" => LogLevel::Info,
                "debug" => LogLevel::Debug,
                "trace" => LogLevel::Trace,
                _ => LogLevel::Info,
            };
        }
    }

    pub fn validate(&self) -> PulseResult<()> {
        if self.channel.enabled && self.channel.port == 0 {
            return Err(PulseError::Config("Channel port cannot be 0".into()));
        }

        if self.api.enabled && self.api.port == 0 {
            return Err(PulseError::Config("API port cannot be 0".into()));
        }

        if self.channel.enabled && self.api.enabled && self.channel.port == self.api.port {
            return Err(PulseError::Config(
                "Channel and API ports cannot be the same".into(),
            ));
        }

        if self.feeds.batch_size == 0 {
            return Err(PulseError::Config("Feed batch size cannot be 0".into()));
        }

        if self.feeds.base_interval_secs == 0
            || self.feeds.max_interval_secs < self.feeds.base_interval_secs
        {
            return Err(PulseError::Config(
                "Feed intervals must satisfy 0 < base <= max".into(),
            ));
        }

        if self.metrics.window_secs <= 0 {
            return Err(PulseError::Config("Metrics window must be positive".into()));
        }

        for url in &self.feeds.seed_urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(PulseError::Config(format!("Invalid feed URL: {}", url)));
            }
        }

        if self.feeds.notify == NotifyMode::Webhook && self.feeds.notify_webhook.is_none() {
            return Err(PulseError::Config(
                "notify = \"webhook\" requires notify_webhook".into(),
            ));
        }

        Ok(())
    }
}
