use super::*;
use crate::storage::{FeedArticleRecord, PulseStorage};
use proptest::prelude::*;
use pulse_crypto::article_fingerprint;

fn config() -> FeedsConfig {
    FeedsConfig::default()
}

fn source(id: u64, last_fetch: Option<i64>, error_count: u32) -> FeedSourceRecord {
    FeedSourceRecord {
        id,
        url: format!("https://feeds.example.com/{}.xml", id),
        etag: None,
        last_modified: None,
        error_count,
        enabled: true,
        last_fetch,
    }
}

#[test]
fn test_backoff_doubles_then_caps() {
    let cfg = config();
    assert_eq!(backoff_delay_secs(&cfg, 0), cfg.base_interval_secs);
    assert_eq!(backoff_delay_secs(&cfg, 1), cfg.base_interval_secs * 2);
    assert_eq!(backoff_delay_secs(&cfg, 2), cfg.base_interval_secs * 4);
    // Past the exponent cap the delay pins at the ceiling.
    assert_eq!(backoff_delay_secs(&cfg, 6), cfg.max_interval_secs);
    assert_eq!(backoff_delay_secs(&cfg, 60), cfg.max_interval_secs);
}

#[test]
fn test_never_fetched_source_is_immediately_eligible() {
    let cfg = config();
    assert!(next_eligible(&cfg, &source(1, None, 0)) <= 0);

    let fetched = source(2, Some(1_000), 0);
    assert_eq!(
        next_eligible(&cfg, &fetched),
        1_000 + cfg.base_interval_secs as i64
    );
}

#[test]
fn test_select_due_prefers_stalest_sources() {
    let cfg = config();
    let now = 100_000;
    let sources = vec![
        source(1, Some(now - 10_000), 0),
        source(2, None, 0),
        source(3, Some(now - 50_000), 0),
    ];

    let due = select_due(&cfg, &sources, now, false);
    let order: Vec<u64> = due.iter().map(|s| s.id).collect();
    assert_eq!(order, vec![2, 3, 1]);
}

#[test]
fn test_select_due_skips_disabled_and_dead_sources() {
    let cfg = config();
    let now = 100_000;

    let mut disabled = source(1, None, 0);
    disabled.enabled = false;
    let dead = source(2, None, cfg.error_ceiling + 1);
    let at_ceiling = source(3, None, cfg.error_ceiling);

    let due = select_due(&cfg, &[disabled, dead, at_ceiling], now, false);
    let order: Vec<u64> = due.iter().map(|s| s.id).collect();
    assert_eq!(order, vec![3]);
}

#[test]
fn test_select_due_respects_batch_size_even_when_forced() {
    let cfg = config();
    let now = 100_000;
    let sources: Vec<FeedSourceRecord> = (0..20)
        .map(|i| source(i, Some(now - 1), 0)) // not yet eligible
        .collect();

    assert!(select_due(&cfg, &sources, now, false).is_empty());

    let forced = select_due(&cfg, &sources, now, true);
    assert_eq!(forced.len(), cfg.batch_size);
}

proptest! {
    #[test]
    fn prop_backoff_is_monotonic_and_bounded(a in 0u32..100, b in 0u32..100) {
        let cfg = config();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(backoff_delay_secs(&cfg, lo) <= backoff_delay_secs(&cfg, hi));
        prop_assert!(backoff_delay_secs(&cfg, hi) <= cfg.max_interval_secs);
        prop_assert!(backoff_delay_secs(&cfg, lo) >= cfg.base_interval_secs);
    }
}

#[test]
fn test_parse_rss_items() {
    let xml = br#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Wire</title>
    <item>
      <title>  First story  </title>
      <link>https://news.example.com/1</link>
      <description>Short summary</description>
      <enclosure url="https://cdn.example.com/1.jpg" length="1024" type="image/jpeg"/>
      <pubDate>Mon, 24 Aug 2026 10:00:00 GMT</pubDate>
    </item>
    <item>
      <description>No title, should be dropped</description>
    </item>
    <item>
      <title>Second story</title>
      <link>https://news.example.com/2</link>
      <enclosure url="https://cdn.example.com/2.mp3" length="2048" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    let items = parse_feed(xml).unwrap();
    assert_eq!(items.len(), 2);

    assert_eq!(items[0].title, "First story");
    assert_eq!(items[0].link, "https://news.example.com/1");
    assert_eq!(items[0].description.as_deref(), Some("Short summary"));
    assert_eq!(
        items[0].image_url.as_deref(),
        Some("https://cdn.example.com/1.jpg")
    );
    assert!(items[0].published_at.is_some());

    // Non-image enclosures are not cover art.
    assert_eq!(items[1].title, "Second story");
    assert!(items[1].image_url.is_none());
}

#[test]
fn test_parse_atom_entries() {
    let xml = br#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <id>urn:example:feed</id>
  <updated>2026-08-24T10:00:00Z</updated>
  <entry>
    <title>Atom story</title>
    <id>urn:example:1</id>
    <updated>2026-08-24T10:00:00Z</updated>
    <published>2026-08-24T09:30:00Z</published>
    <link rel="alternate" href="https://news.example.com/atom/1"/>
    <summary>Atom summary</summary>
  </entry>
</feed>"#;

    let items = parse_feed(xml).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Atom story");
    assert_eq!(items[0].link, "https://news.example.com/atom/1");
    assert_eq!(items[0].description.as_deref(), Some("Atom summary"));
    assert!(items[0].published_at.is_some());
}

#[test]
fn test_parse_rejects_unknown_documents() {
    assert!(parse_feed(b"<html><body>not a feed</body></html>").is_err());
    assert!(parse_feed(b"").is_err());
}

#[test]
fn test_fingerprint_dedup_across_passes() {
    let dir = tempfile::tempdir().unwrap();
    let storage = PulseStorage::open(dir.path().join("db")).unwrap();

    let fingerprint = article_fingerprint("First story", "https://news.example.com/1");
    let record = FeedArticleRecord {
        source_id: 1,
        title: "First story".to_string(),
        description: None,
        url: "https://news.example.com/1".to_string(),
        image_url: None,
        published_at: None,
        content_hash: fingerprint.to_hex(),
        created_at: 0,
    };

    assert!(storage.insert_article_if_new(&fingerprint, &record).unwrap());
    // Second sighting, whether from a re-poll or another source, is a no-op.
    assert!(!storage.insert_article_if_new(&fingerprint, &record).unwrap());
    assert_eq!(storage.article_count(), 1);
}
