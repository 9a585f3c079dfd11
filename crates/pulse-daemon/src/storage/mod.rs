mod types;

pub use types::*;

use pulse_types::{Blake3Hash, PulseError, PulseResult};
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, info};

const CURRENT_SCHEMA_VERSION: u32 = 1;
const SCHEMA_KEY: &[u8] = b"__schema_version__";

pub struct PulseStorage {
    db: Db,
    schema: Tree,
    sources: Tree,
    articles: Tree,
    nodes: Tree,
}

impl PulseStorage {
    pub fn open(path: impl AsRef<Path>) -> PulseResult<Self> {
        let path = path.as_ref();
        info!("Opening storage at {:?}", path);

        let db = sled::Config::new()
            .path(path)
            .mode(sled::Mode::HighThroughput)
            .open()
            .map_err(|e| PulseError::Storage(format!("Failed to open database: {}", e)))?;

        let storage = Self::create_from_db(db)?;
        storage.ensure_schema()?;

        info!(
            "Storage opened successfully (schema version {})",
            CURRENT_SCHEMA_VERSION
        );
        Ok(storage)
    }

    fn create_from_db(db: Db) -> PulseResult<Self> {
        let schema = Self::open_tree(&db, "schema")?;
        let sources = Self::open_tree(&db, "sources")?;
        let articles = Self::open_tree(&db, "articles")?;
        let nodes = Self::open_tree(&db, "nodes")?;

        Ok(Self {
            db,
            schema,
            sources,
            articles,
            nodes,
        })
    }

    fn open_tree(db: &Db, name: &str) -> PulseResult<Tree> {
        db.open_tree(name)
            .map_err(|e| PulseError::Storage(format!("Failed to open tree {}: {}", name, e)))
    }

    fn ensure_schema(&self) -> PulseResult<()> {
        let stored = self
            .schema
            .get(SCHEMA_KEY)
            .map_err(|e| PulseError::Storage(format!("Failed to read schema version: {}", e)))?;

        match stored {
            Some(bytes) if bytes.len() == 4 => {
                let version = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                if version > CURRENT_SCHEMA_VERSION {
                    return Err(PulseError::Storage(format!(
                        "Storage schema {} is newer than supported {}",
                        version, CURRENT_SCHEMA_VERSION
                    )));
                }
            }
            _ => {
                self.schema
                    .insert(SCHEMA_KEY, &CURRENT_SCHEMA_VERSION.to_be_bytes())
                    .map_err(|e| {
                        PulseError::Storage(format!("Failed to write schema version: {}", e))
                    })?;
            }
        }

        Ok(())
    }

    fn encode<T: serde::Serialize>(value: &T) -> PulseResult<Vec<u8>> {
        bincode::serialize(value)
            .map_err(|e| PulseError::Serialization(format!("Failed to serialize: {}", e)))
    }

    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> PulseResult<T> {
        bincode::deserialize(bytes)
            .map_err(|e| PulseError::Serialization(format!("Failed to deserialize: {}", e)))
    }

    // ---- feed sources ----

    /// Registers a source URL, returning the existing record when the URL
    /// is already known.
    pub fn seed_source(&self, url: &str) -> PulseResult<FeedSourceRecord> {
        if let Some(existing) = self.source_by_url(url)? {
            return Ok(existing);
        }

        let id = self
            .db
            .generate_id()
            .map_err(|e| PulseError::Storage(format!("Failed to generate source id: {}", e)))?;

        let record = FeedSourceRecord::new(id, url.to_string());
        self.put_source(&record)?;
        info!("Seeded feed source {} ({})", id, url);
        Ok(record)
    }

    pub fn put_source(&self, record: &FeedSourceRecord) -> PulseResult<()> {
        let value = Self::encode(record)?;
        self.sources
            .insert(record.id.to_be_bytes(), value)
            .map_err(|e| PulseError::Storage(format!("Failed to store source: {}", e)))?;
        Ok(())
    }

    pub fn get_source(&self, id: u64) -> PulseResult<Option<FeedSourceRecord>> {
        let bytes = self
            .sources
            .get(id.to_be_bytes())
            .map_err(|e| PulseError::Storage(format!("Failed to read source: {}", e)))?;
        bytes.map(|b| Self::decode(&b)).transpose()
    }

    pub fn source_by_url(&self, url: &str) -> PulseResult<Option<FeedSourceRecord>> {
        for record in self.list_sources()? {
            if record.url == url {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    pub fn list_sources(&self) -> PulseResult<Vec<FeedSourceRecord>> {
        let mut records = Vec::new();
        for entry in self.sources.iter() {
            let (_, value) =
                entry.map_err(|e| PulseError::Storage(format!("Failed to iterate sources: {}", e)))?;
            records.push(Self::decode(&value)?);
        }
        Ok(records)
    }

    /// Clears a source's consecutive-error count so the scheduler picks it
    /// up again.
    pub fn reset_source_errors(&self, id: u64) -> PulseResult<bool> {
        match self.get_source(id)? {
            Some(mut record) => {
                record.error_count = 0;
                self.put_source(&record)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ---- articles ----

    /// Inserts an article keyed by its content fingerprint. Returns false
    /// without touching anything when the fingerprint already exists, which
    /// makes duplicate ingestion a no-op even under concurrent callers.
    pub fn insert_article_if_new(
        &self,
        fingerprint: &Blake3Hash,
        record: &FeedArticleRecord,
    ) -> PulseResult<bool> {
        let value = Self::encode(record)?;
        let outcome = self
            .articles
            .compare_and_swap(
                fingerprint.as_bytes(),
                None as Option<&[u8]>,
                Some(value),
            )
            .map_err(|e| PulseError::Storage(format!("Failed to insert article: {}", e)))?;

        match outcome {
            Ok(()) => Ok(true),
            Err(_) => {
                debug!("Duplicate article fingerprint {}", fingerprint);
                Ok(false)
            }
        }
    }

    pub fn get_article(&self, fingerprint: &Blake3Hash) -> PulseResult<Option<FeedArticleRecord>> {
        let bytes = self
            .articles
            .get(fingerprint.as_bytes())
            .map_err(|e| PulseError::Storage(format!("Failed to read article: {}", e)))?;
        bytes.map(|b| Self::decode(&b)).transpose()
    }

    pub fn article_count(&self) -> usize {
        self.articles.len()
    }

    /// Most recently created articles, newest first.
    pub fn recent_articles(&self, limit: usize) -> PulseResult<Vec<FeedArticleRecord>> {
        let mut records: Vec<FeedArticleRecord> = Vec::new();
        for entry in self.articles.iter() {
            let (_, value) = entry
                .map_err(|e| PulseError::Storage(format!("Failed to iterate articles: {}", e)))?;
            records.push(Self::decode(&value)?);
        }
        records.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        records.truncate(limit);
        Ok(records)
    }

    // ---- node work stats ----

    pub fn store_node_stats(&self, record: &NodeStatsRecord) -> PulseResult<()> {
        let value = Self::encode(record)?;
        self.nodes
            .insert(record.node_id.as_bytes(), value)
            .map_err(|e| PulseError::Storage(format!("Failed to store node stats: {}", e)))?;
        Ok(())
    }

    pub fn get_node_stats(&self, node_id: &str) -> PulseResult<Option<NodeStatsRecord>> {
        match self
            .nodes
            .get(node_id.as_bytes())
            .map_err(|e| PulseError::Storage(format!("Failed to read node stats: {}", e)))?
        {
            Some(value) => Ok(Some(Self::decode(&value)?)),
            None => Ok(None),
        }
    }

    pub fn all_node_stats(&self) -> PulseResult<Vec<NodeStatsRecord>> {
        let mut records = Vec::new();
        for entry in self.nodes.iter() {
            let (_, value) =
                entry.map_err(|e| PulseError::Storage(format!("Failed to iterate nodes: {}", e)))?;
            records.push(Self::decode(&value)?);
        }
        Ok(records)
    }

    pub fn flush(&self) -> PulseResult<()> {
        self.db
            .flush()
            .map_err(|e| PulseError::Storage(format!("Failed to flush: {}", e)))?;
        Ok(())
    }
}
