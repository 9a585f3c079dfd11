use chrono::DateTime;
use pulse_types::{PulseError, PulseResult};
use tracing::debug;

/// One entry lifted out of either wire format. Items without a title or
/// link are dropped during parsing, so every `FeedItem` is broadcastable.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub description: Option<String>,
    pub link: String,
    pub image_url: Option<String>,
    pub published_at: Option<i64>,
}

/// Parses a feed document, sniffing the format from the payload itself.
/// Servers routinely lie in Content-Type, so the root element decides.
pub fn parse_feed(body: &[u8]) -> PulseResult<Vec<FeedItem>> {
    let head = String::from_utf8_lossy(&body[..body.len().min(512)]);

    if head.contains("<rss") {
        parse_rss(body)
    } else if head.contains("<feed") {
        parse_atom(body)
    } else {
        Err(PulseError::Feed(
            "Document is neither RSS nor Atom".to_string(),
        ))
    }
}

fn parse_rss(body: &[u8]) -> PulseResult<Vec<FeedItem>> {
    let channel = rss::Channel::read_from(body)
        .map_err(|e| PulseError::Feed(format!("RSS parse failed: {}", e)))?;

    let mut items = Vec::new();
    for item in channel.items() {
        let (title, link) = match (item.title(), item.link()) {
            (Some(t), Some(l)) => (t.trim().to_string(), l.trim().to_string()),
            _ => {
                debug!("Skipping RSS item without title or link");
                continue;
            }
        };

        let image_url = item
            .enclosure()
            .filter(|e| e.mime_type().starts_with("image/"))
            .map(|e| e.url().to_string());

        let published_at = item
            .pub_date()
            .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
            .map(|d| d.timestamp());

        items.push(FeedItem {
            title,
            description: item.description().map(|d| d.trim().to_string()),
            link,
            image_url,
            published_at,
        });
    }

    Ok(items)
}

fn parse_atom(body: &[u8]) -> PulseResult<Vec<FeedItem>> {
    let feed = atom_syndication::Feed::read_from(body)
        .map_err(|e| PulseError::Feed(format!("Atom parse failed: {}", e)))?;

    let mut items = Vec::new();
    for entry in feed.entries() {
        let title = entry.title().value.trim().to_string();
        if title.is_empty() {
            debug!("Skipping Atom entry without title");
            continue;
        }

        let link = match entry
            .links()
            .iter()
            .find(|l| l.rel() == "alternate")
            .or_else(|| entry.links().first())
        {
            Some(l) => l.href().trim().to_string(),
            None => {
                debug!("Skipping Atom entry without link");
                continue;
            }
        };

        items.push(FeedItem {
            title,
            description: entry.summary().map(|s| s.value.trim().to_string()),
            link,
            image_url: None,
            published_at: entry.published().map(|d| d.timestamp()),
        });
    }

    Ok(items)
}
