use anyhow::{Context, Result};
use search_core::store::optional_rfc3339;
use search_core::DocumentStore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{CrawlResult, CrawlStatus};

const MAX_ERROR_MESSAGE: usize = 2048;

/// One crawl run as kept in the `crawl_history` tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlHistory {
    pub id: u64,
    pub start_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "optional_rfc3339")]
    pub finished_at: Option<OffsetDateTime>,
    pub status: CrawlStatus,
    pub pages_crawled: usize,
    pub documents_indexed: usize,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
}

/// Crawl runs stored next to the documents, keyed by big-endian id.
#[derive(Clone)]
pub struct CrawlHistoryLog {
    db: sled::Db,
    tree: sled::Tree,
}

impl CrawlHistoryLog {
    pub fn open(store: &DocumentStore) -> Result<Self> {
        let db = store.db().clone();
        let tree = db.open_tree("crawl_history")?;
        Ok(Self { db, tree })
    }

    /// Records a run in `STARTED` state.
    pub fn start(&self, start_url: &str) -> Result<CrawlHistory> {
        let entry = CrawlHistory {
            id: self.db.generate_id()?,
            start_url: start_url.to_string(),
            started_at: OffsetDateTime::now_utc(),
            finished_at: None,
            status: CrawlStatus::Started,
            pages_crawled: 0,
            documents_indexed: 0,
            duration_ms: None,
            error_message: None,
        };
        self.put(&entry)?;
        Ok(entry)
    }

    pub fn finish(&self, entry: &mut CrawlHistory, result: &CrawlResult) -> Result<()> {
        entry.finished_at = Some(OffsetDateTime::now_utc());
        entry.status = result.status;
        entry.pages_crawled = result.pages_processed;
        entry.documents_indexed = result.documents_indexed;
        entry.duration_ms = Some(result.crawl_time_ms);
        entry.error_message = if result.errors.is_empty() {
            None
        } else {
            Some(result.errors.join("; ").chars().take(MAX_ERROR_MESSAGE).collect())
        };
        self.put(entry)
    }

    pub fn get(&self, id: u64) -> Result<Option<CrawlHistory>> {
        match self.tree.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).context("decoding crawl history")?)),
            None => Ok(None),
        }
    }

    /// Every run, oldest first.
    pub fn list(&self) -> Result<Vec<CrawlHistory>> {
        self.tree
            .iter()
            .values()
            .map(|bytes| -> Result<CrawlHistory> { Ok(bincode::deserialize(&bytes?).context("decoding crawl history")?) })
            .collect()
    }

    fn put(&self, entry: &CrawlHistory) -> Result<()> {
        self.tree.insert(entry.id.to_be_bytes().to_vec(), bincode::serialize(entry)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_finish() {
        let store = DocumentStore::temporary().unwrap();
        let log = CrawlHistoryLog::open(&store).unwrap();
        let mut entry = log.start("http://site.test/").unwrap();
        assert_eq!(log.get(entry.id).unwrap().unwrap().status, CrawlStatus::Started);

        let result = CrawlResult {
            status: CrawlStatus::Partial,
            pages_processed: 3,
            documents_indexed: 2,
            error_count: 1,
            errors: vec!["Failed to fetch http://site.test/x: HTTP 404".into()],
            crawl_time_ms: 12,
            history_id: Some(entry.id),
        };
        log.finish(&mut entry, &result).unwrap();

        let stored = log.get(entry.id).unwrap().unwrap();
        assert_eq!(stored, entry);
        assert_eq!(stored.status, CrawlStatus::Partial);
        assert!(stored.finished_at.is_some());
        assert_eq!(stored.error_message.as_deref(), Some("Failed to fetch http://site.test/x: HTTP 404"));
        assert_eq!(log.list().unwrap().len(), 1);
        assert!(log.get(entry.id + 1000).unwrap().is_none());
    }
}
