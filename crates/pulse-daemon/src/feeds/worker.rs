use super::notify::{notifier_from_config, NotificationSink};
use super::parse::parse_feed;
use super::{select_due, RefreshOutcome};
use crate::pulse::PulseState;
use crate::storage::{FeedArticleRecord, FeedSourceRecord};
use pulse_crypto::article_fingerprint;
use pulse_types::{PulseError, PulseResult};
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Polls due sources on a fixed tick, with conditional requests and
/// fingerprint dedup. One pass runs at a time; a tick that lands while
/// the previous pass is still in flight is skipped.
pub struct FeedWorker {
    state: Arc<PulseState>,
    client: reqwest::Client,
    notifier: Box<dyn NotificationSink>,
    busy: AtomicBool,
}

/// Releases the overlap guard even when a pass errors out mid-flight.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl FeedWorker {
    pub fn new(state: Arc<PulseState>) -> PulseResult<Self> {
        let timeout = Duration::from_secs(state.config.feeds.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PulseError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let notifier = notifier_from_config(&state.config.feeds, client.clone());

        Ok(Self {
            state,
            client,
            notifier,
            busy: AtomicBool::new(false),
        })
    }

    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        let config = &self.state.config.feeds;
        let mut ticker = interval(Duration::from_secs(config.poll_interval_secs.max(1)));
        info!(
            "Feed worker running ({}s tick, batch {})",
            config.poll_interval_secs, config.batch_size
        );

        loop {
            if shutdown.load(Ordering::SeqCst) {
                info!("Feed worker shutting down");
                break;
            }

            ticker.tick().await;

            match self.poll_due(false).await {
                Ok(outcome) if outcome.refreshed > 0 => {
                    debug!(
                        "Poll pass refreshed {} sources, {} new articles",
                        outcome.refreshed, outcome.inserted
                    );
                }
                Ok(_) => {}
                Err(e) => debug!("Poll pass skipped: {}", e),
            }
        }
    }

    /// One polling pass over the due batch. Also the manual refresh
    /// entry point, which forces eligibility but not the batch cap.
    pub async fn poll_due(&self, force: bool) -> PulseResult<RefreshOutcome> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PulseError::Feed("Refresh already in progress".to_string()));
        }
        let _guard = PassGuard(&self.busy);

        let config = &self.state.config.feeds;
        let now = chrono::Utc::now().timestamp();
        let sources = self.state.storage.list_sources()?;
        let batch = select_due(config, &sources, now, force);

        let mut outcome = RefreshOutcome::default();
        let mut new_articles = Vec::new();

        for mut source in batch {
            match self.poll_source(&mut source, now).await {
                Ok(mut fresh) => {
                    outcome.refreshed += 1;
                    new_articles.append(&mut fresh);
                }
                Err(e) => {
                    warn!("Source {} failed: {}", source.url, e);
                    source.error_count += 1;
                    source.last_fetch = Some(now);
                }
            }
            if let Err(e) = self.state.storage.put_source(&source) {
                warn!("Failed to persist source {}: {}", source.url, e);
            }
        }

        outcome.inserted = new_articles.len();
        if !new_articles.is_empty() {
            self.state.metrics.record_fetch(new_articles.len() as u64);

            if let Err(e) = self.notifier.notify_new_article(&new_articles[0]).await {
                warn!("Notification failed: {}", e);
            }

            let delivered = self.state.publish_news(news_payload(&new_articles));
            info!(
                "Ingested {} new articles, broadcast to {} nodes",
                new_articles.len(),
                delivered
            );
        }

        Ok(outcome)
    }

    /// Fetches one source with a conditional request and stores every
    /// previously unseen item. Mutates the record in place; the caller
    /// persists it.
    async fn poll_source(
        &self,
        source: &mut FeedSourceRecord,
        now: i64,
    ) -> PulseResult<Vec<FeedArticleRecord>> {
        let mut request = self.client.get(&source.url);
        if let Some(etag) = &source.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(modified) = &source.last_modified {
            request = request.header(IF_MODIFIED_SINCE, modified);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PulseError::Network(format!("Request failed: {}", e)))?;

        // A 304 is a healthy answer: the source responded correctly, it
        // just has nothing new.
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("Source {} not modified", source.url);
            source.error_count = 0;
            source.last_fetch = Some(now);
            return Ok(Vec::new());
        }

        if !response.status().is_success() {
            return Err(PulseError::Network(format!(
                "Unexpected status {}",
                response.status()
            )));
        }

        let header_string = |name| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        let etag = header_string(ETAG);
        let last_modified = header_string(LAST_MODIFIED);

        let body = response
            .bytes()
            .await
            .map_err(|e| PulseError::Network(format!("Body read failed: {}", e)))?;
        let items = parse_feed(&body)?;

        let mut fresh = Vec::new();
        for item in items {
            let fingerprint = article_fingerprint(&item.title, &item.link);
            let record = FeedArticleRecord {
                source_id: source.id,
                title: item.title,
                description: item.description,
                url: item.link,
                image_url: item.image_url,
                published_at: item.published_at,
                content_hash: fingerprint.to_hex(),
                created_at: now,
            };
            if self.state.storage.insert_article_if_new(&fingerprint, &record)? {
                fresh.push(record);
            }
        }

        source.etag = etag;
        source.last_modified = last_modified;
        source.error_count = 0;
        source.last_fetch = Some(now);

        debug!("Source {} yielded {} new articles", source.url, fresh.len());
        Ok(fresh)
    }
}

fn news_payload(articles: &[FeedArticleRecord]) -> serde_json::Value {
    let preview: Vec<serde_json::Value> = articles
        .iter()
        .take(5)
        .map(|a| {
            serde_json::json!({
                "title": a.title,
                "description": a.description,
                "url": a.url,
                "imageUrl": a.image_url,
                "publishedAt": a.published_at,
            })
        })
        .collect();

    serde_json::json!({
        "count": articles.len(),
        "articles": preview,
    })
}
