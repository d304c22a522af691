//! Durable document metadata on `sled`.
//!
//! Documents are keyed by big-endian id; a second tree maps each URL to its
//! id and enforces URL uniqueness.

use crate::index::DocId;
use crate::search::MetadataLookup;
use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use std::path::Path;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub content: String,
    pub url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "optional_rfc3339")]
    pub crawled_at: Option<OffsetDateTime>,
}

/// RFC 3339 for `Option<OffsetDateTime>` that also decodes from bincode.
///
/// `time::serde::rfc3339::option` deserializes through `deserialize_any`,
/// which bincode does not implement, so the value goes through `Option<String>`.
pub mod optional_rfc3339 {
    use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error> {
        let text = match value {
            Some(ts) => Some(ts.format(&Rfc3339).map_err(ser::Error::custom)?),
            None => None,
        };
        text.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => OffsetDateTime::parse(&text, &Rfc3339).map(Some).map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(Document),
    /// Another document already owns the URL.
    DuplicateUrl(DocId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(Document),
    NotFound,
    DuplicateUrl(DocId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(Document),
    Updated(Document),
}

impl UpsertOutcome {
    pub fn document(&self) -> &Document {
        match self {
            UpsertOutcome::Created(doc) | UpsertOutcome::Updated(doc) => doc,
        }
    }
}

pub struct DocumentStore {
    db: sled::Db,
    docs: sled::Tree,
    urls: sled::Tree,
    // serializes the read-check-write sequences guarding URL uniqueness
    writes: Mutex<()>,
}

impl DocumentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).with_context(|| format!("opening document store at {}", path.display()))?;
        Self::from_db(db)
    }

    /// In-memory store removed on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let docs = db.open_tree("documents")?;
        let urls = db.open_tree("urls")?;
        Ok(Self { db, docs, urls, writes: Mutex::new(()) })
    }

    pub fn insert(&self, request: DocumentRequest) -> Result<InsertOutcome> {
        let _guard = self.writes.lock();
        if let Some(existing) = self.id_for_url(&request.url)? {
            return Ok(InsertOutcome::DuplicateUrl(existing));
        }
        let doc = self.create(request, None)?;
        Ok(InsertOutcome::Inserted(doc))
    }

    pub fn update(&self, id: DocId, request: DocumentRequest) -> Result<UpdateOutcome> {
        let _guard = self.writes.lock();
        let Some(mut doc) = self.get(id)? else {
            return Ok(UpdateOutcome::NotFound);
        };
        let mut stale_url = None;
        if doc.url != request.url {
            if let Some(owner) = self.id_for_url(&request.url)? {
                return Ok(UpdateOutcome::DuplicateUrl(owner));
            }
            stale_url = Some(std::mem::replace(&mut doc.url, request.url));
        }
        doc.title = request.title;
        doc.content = request.content;
        doc.updated_at = OffsetDateTime::now_utc();
        self.commit(&doc, stale_url.as_deref())?;
        Ok(UpdateOutcome::Updated(doc))
    }

    /// Adds the document or refreshes the one already stored under its URL,
    /// stamping `crawled_at` either way.
    pub fn upsert_by_url(&self, request: DocumentRequest) -> Result<UpsertOutcome> {
        let _guard = self.writes.lock();
        let now = OffsetDateTime::now_utc();
        match self.id_for_url(&request.url)?.map(|id| self.get(id)).transpose()?.flatten() {
            Some(mut doc) => {
                doc.title = request.title;
                doc.content = request.content;
                doc.updated_at = now;
                doc.crawled_at = Some(now);
                self.commit(&doc, None)?;
                Ok(UpsertOutcome::Updated(doc))
            }
            None => Ok(UpsertOutcome::Created(self.create(request, Some(now))?)),
        }
    }

    pub fn get(&self, id: DocId) -> Result<Option<Document>> {
        match self.docs.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).context("decoding stored document")?)),
            None => Ok(None),
        }
    }

    pub fn get_by_url(&self, url: &str) -> Result<Option<Document>> {
        match self.id_for_url(url)? {
            Some(id) => self.get(id),
            None => Ok(None),
        }
    }

    /// All documents, newest first.
    pub fn list(&self) -> Result<Vec<Document>> {
        let mut docs = self.all()?;
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(docs)
    }

    /// All documents in id order.
    pub fn all(&self) -> Result<Vec<Document>> {
        self.docs
            .iter()
            .values()
            .map(|bytes| -> Result<Document> {
                Ok(bincode::deserialize(&bytes?).context("decoding stored document")?)
            })
            .collect()
    }

    /// Returns whether a document was deleted.
    pub fn delete(&self, id: DocId) -> Result<bool> {
        let _guard = self.writes.lock();
        let Some(doc) = self.get(id)? else {
            return Ok(false);
        };
        let key = id.to_be_bytes().to_vec();
        (&self.docs, &self.urls)
            .transaction(|(docs, urls)| {
                docs.remove(key.clone())?;
                urls.remove(doc.url.as_bytes())?;
                Ok::<_, ConflictableTransactionError<sled::Error>>(())
            })
            .map_err(|err: TransactionError<sled::Error>| anyhow!("deleting document {id}: {err}"))?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.writes.lock();
        self.docs.clear()?;
        self.urls.clear()?;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.docs.len()
    }

    /// The underlying database, for callers keeping their own trees next to
    /// the documents.
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn create(&self, request: DocumentRequest, crawled_at: Option<OffsetDateTime>) -> Result<Document> {
        let now = OffsetDateTime::now_utc();
        let doc = Document {
            id: self.db.generate_id()?,
            title: request.title,
            content: request.content,
            url: request.url,
            created_at: now,
            updated_at: now,
            crawled_at,
        };
        self.commit(&doc, None)?;
        Ok(doc)
    }

    /// Writes the document and its URL entry in one transaction, dropping
    /// `stale_url` if the document moved away from it.
    fn commit(&self, doc: &Document, stale_url: Option<&str>) -> Result<()> {
        let bytes = bincode::serialize(doc)?;
        let key = doc.id.to_be_bytes().to_vec();
        (&self.docs, &self.urls)
            .transaction(|(docs, urls)| {
                if let Some(old) = stale_url {
                    urls.remove(old.as_bytes())?;
                }
                urls.insert(doc.url.as_bytes(), key.clone())?;
                docs.insert(key.clone(), bytes.clone())?;
                Ok::<_, ConflictableTransactionError<sled::Error>>(())
            })
            .map_err(|err: TransactionError<sled::Error>| anyhow!("writing document {}: {err}", doc.id))?;
        Ok(())
    }

    fn id_for_url(&self, url: &str) -> Result<Option<DocId>> {
        match self.urls.get(url.as_bytes())? {
            Some(raw) => {
                let bytes = <[u8; 8]>::try_from(&raw[..]).context("corrupt url entry")?;
                Ok(Some(DocId::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }
}

impl MetadataLookup for DocumentStore {
    fn title(&self, doc_id: DocId) -> Option<String> {
        match self.get(doc_id) {
            Ok(doc) => doc.map(|d| d.title),
            Err(err) => {
                tracing::warn!(doc_id, error = %err, "title lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(title: &str, content: &str, url: &str) -> DocumentRequest {
        DocumentRequest { title: title.into(), content: content.into(), url: url.into() }
    }

    fn inserted(outcome: InsertOutcome) -> Document {
        match outcome {
            InsertOutcome::Inserted(doc) => doc,
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let store = DocumentStore::temporary().unwrap();
        let a = inserted(store.insert(req("A", "alpha", "http://a")).unwrap());
        let b = inserted(store.insert(req("B", "beta", "http://b")).unwrap());
        assert!(b.id > a.id);
        assert_eq!(store.count(), 2);
        assert_eq!(store.get(a.id).unwrap().unwrap().content, "alpha");
        assert_eq!(store.get_by_url("http://b").unwrap().unwrap().id, b.id);
    }

    #[test]
    fn duplicate_url_is_reported() {
        let store = DocumentStore::temporary().unwrap();
        let a = inserted(store.insert(req("A", "alpha", "http://a")).unwrap());
        let dup = store.insert(req("A2", "other", "http://a")).unwrap();
        assert_eq!(dup, InsertOutcome::DuplicateUrl(a.id));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn update_checks_url_ownership() {
        let store = DocumentStore::temporary().unwrap();
        let a = inserted(store.insert(req("A", "alpha", "http://a")).unwrap());
        let b = inserted(store.insert(req("B", "beta", "http://b")).unwrap());

        let clash = store.update(a.id, req("A", "alpha", "http://b")).unwrap();
        assert_eq!(clash, UpdateOutcome::DuplicateUrl(b.id));

        match store.update(a.id, req("A!", "changed", "http://c")).unwrap() {
            UpdateOutcome::Updated(doc) => {
                assert_eq!(doc.content, "changed");
                assert_eq!(doc.created_at, a.created_at);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(store.get_by_url("http://a").unwrap().is_none());
        assert_eq!(store.get_by_url("http://c").unwrap().unwrap().id, a.id);
        // the old url is released along with the move
        inserted(store.insert(req("A again", "alpha", "http://a")).unwrap());
        assert_eq!(store.update(999, req("x", "y", "z")).unwrap(), UpdateOutcome::NotFound);
    }

    #[test]
    fn upsert_refreshes_existing_url() {
        let store = DocumentStore::temporary().unwrap();
        let first = store.upsert_by_url(req("T", "one", "http://x")).unwrap();
        assert!(matches!(first, UpsertOutcome::Created(_)));
        let second = store.upsert_by_url(req("T", "two", "http://x")).unwrap();
        let UpsertOutcome::Updated(doc) = second else { panic!("expected update") };
        assert_eq!(doc.id, first.document().id);
        assert_eq!(doc.content, "two");
        assert!(doc.crawled_at.is_some());
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn crawled_documents_read_back() {
        let store = DocumentStore::temporary().unwrap();
        let created = store.upsert_by_url(req("T", "one", "http://x")).unwrap();
        let stored = store.get(created.document().id).unwrap().unwrap();
        assert_eq!(&stored, created.document());
        assert!(stored.crawled_at.is_some());
        assert_eq!(store.all().unwrap().len(), 1);
        assert_eq!(store.list().unwrap()[0].url, "http://x");

        // plain inserts keep crawled_at empty through the same encoding
        let plain = inserted(store.insert(req("P", "two", "http://p")).unwrap());
        assert_eq!(store.get(plain.id).unwrap().unwrap().crawled_at, None);
    }

    #[test]
    fn crawled_at_serializes_as_rfc3339() {
        let store = DocumentStore::temporary().unwrap();
        let doc = store.upsert_by_url(req("T", "one", "http://x")).unwrap().document().clone();
        let json = serde_json::to_value(&doc).unwrap();
        let text = json["crawled_at"].as_str().unwrap();
        assert!(text.contains('T'));
        let back: Document = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn delete_and_clear() {
        let store = DocumentStore::temporary().unwrap();
        let a = inserted(store.insert(req("A", "alpha", "http://a")).unwrap());
        inserted(store.insert(req("B", "beta", "http://b")).unwrap());
        assert!(store.delete(a.id).unwrap());
        assert!(!store.delete(a.id).unwrap());
        assert!(store.get_by_url("http://a").unwrap().is_none());
        assert!(store.db().open_tree("urls").unwrap().get(b"http://a").unwrap().is_none());
        // url is free again
        inserted(store.insert(req("A", "alpha", "http://a")).unwrap());

        store.clear().unwrap();
        assert_eq!(store.count(), 0);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn title_lookup() {
        let store = DocumentStore::temporary().unwrap();
        let a = inserted(store.insert(req("Rust Book", "alpha", "http://a")).unwrap());
        assert_eq!(store.title(a.id).as_deref(), Some("Rust Book"));
        assert_eq!(store.title(12345), None);
    }
}
