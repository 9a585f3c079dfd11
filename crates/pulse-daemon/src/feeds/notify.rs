use crate::config::{FeedsConfig, NotifyMode};
use crate::storage::FeedArticleRecord;
use async_trait::async_trait;
use pulse_types::{PulseError, PulseResult};
use tracing::{info, warn};

/// Where freshly ingested articles go besides the broadcast channel.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_new_article(&self, article: &FeedArticleRecord) -> PulseResult<()>;
}

/// Default sink: one structured log line per article.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify_new_article(&self, article: &FeedArticleRecord) -> PulseResult<()> {
        info!("New article: {} ({})", article.title, article.url);
        Ok(())
    }
}

/// Posts each article as JSON to a configured endpoint. Delivery is
/// best-effort; a failing webhook never blocks ingestion.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify_new_article(&self, article: &FeedArticleRecord) -> PulseResult<()> {
        let payload = serde_json::json!({
            "title": article.title,
            "description": article.description,
            "url": article.url,
            "imageUrl": article.image_url,
            "publishedAt": article.published_at,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PulseError::Network(format!("Webhook delivery failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PulseError::Network(format!(
                "Webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

pub struct NullNotifier;

#[async_trait]
impl NotificationSink for NullNotifier {
    async fn notify_new_article(&self, _article: &FeedArticleRecord) -> PulseResult<()> {
        Ok(())
    }
}

pub fn notifier_from_config(
    config: &FeedsConfig,
    client: reqwest::Client,
) -> Box<dyn NotificationSink> {
    match config.notify {
        NotifyMode::Log => Box::new(LogNotifier),
        NotifyMode::Off => Box::new(NullNotifier),
        NotifyMode::Webhook => match config.notify_webhook.clone() {
            Some(url) => Box::new(WebhookNotifier::new(client, url)),
            None => {
                // Validation rejects this combination at load; degrade
                // gracefully if it slips through an env override.
                warn!("Webhook notify mode without a webhook URL, falling back to log");
                Box::new(LogNotifier)
            }
        },
    }
}
