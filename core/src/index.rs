use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type DocId = u64;
pub type Position = u32;
/// Document id -> ascending token positions of one term in that document.
pub type Postings = BTreeMap<DocId, Vec<Position>>;

static EMPTY_POSTINGS: Postings = BTreeMap::new();

/// Postings and forward entries of an index.
///
/// A forward entry exists iff the document is indexed, and every
/// (term, doc id) pair in `postings` refers to a live forward entry.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IndexData {
    postings: HashMap<String, Postings>,
    forward: HashMap<DocId, String>,
    next_doc_id: DocId,
}

impl IndexData {
    /// Empty for unknown terms.
    pub fn postings(&self, term: &str) -> &Postings {
        self.postings.get(term).unwrap_or(&EMPTY_POSTINGS)
    }

    pub fn text(&self, doc_id: DocId) -> Option<&str> {
        self.forward.get(&doc_id).map(String::as_str)
    }

    pub fn contains(&self, doc_id: DocId) -> bool {
        self.forward.contains_key(&doc_id)
    }

    pub fn count(&self) -> usize {
        self.forward.len()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn next_doc_id(&self) -> DocId {
        self.next_doc_id
    }

    /// Live document ids, ascending.
    pub fn doc_ids(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self.forward.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The counter saturates at `DocId::MAX`.
    fn allocate(&mut self) -> DocId {
        let id = self.next_doc_id;
        self.next_doc_id = id.saturating_add(1);
        id
    }

    fn advance_past(&mut self, doc_id: DocId) {
        if doc_id >= self.next_doc_id {
            self.next_doc_id = doc_id.saturating_add(1);
        }
    }

    fn insert(&mut self, doc_id: DocId, text: &str, tokens: &[String]) {
        self.forward.insert(doc_id, text.to_string());
        for (pos, term) in tokens.iter().enumerate() {
            self.postings
                .entry(term.clone())
                .or_default()
                .entry(doc_id)
                .or_default()
                .push(pos as Position);
        }
    }

    fn remove(&mut self, doc_id: DocId) -> bool {
        let existed = self.forward.remove(&doc_id).is_some();
        self.postings.retain(|_, docs| {
            docs.remove(&doc_id);
            !docs.is_empty()
        });
        existed
    }

    fn clear(&mut self) {
        self.postings.clear();
        self.forward.clear();
        self.next_doc_id = 0;
    }

    /// Moves every document of `other` in under a freshly allocated id.
    /// Position lists are copied as they are, without re-analysis.
    fn absorb(&mut self, other: IndexData) -> usize {
        let mut incoming: Vec<(DocId, String)> = other.forward.into_iter().collect();
        incoming.sort_unstable_by_key(|(id, _)| *id);

        let mut remap: HashMap<DocId, DocId> = HashMap::with_capacity(incoming.len());
        for (old_id, text) in incoming {
            let new_id = self.allocate();
            self.forward.insert(new_id, text);
            remap.insert(old_id, new_id);
        }

        for (term, docs) in other.postings {
            let moved: Vec<(DocId, Vec<Position>)> = docs
                .into_iter()
                .filter_map(|(old_id, positions)| remap.get(&old_id).map(|&new_id| (new_id, positions)))
                .collect();
            if moved.is_empty() {
                continue;
            }
            let target = self.postings.entry(term).or_default();
            for (new_id, positions) in moved {
                target.entry(new_id).or_default().extend(positions);
            }
        }
        remap.len()
    }
}

/// Thread-safe in-memory inverted index.
///
/// Writers (`add_document*`, `replace_document`, `remove`, `clear`, `merge`) take the
/// write lock for the whole mutation. Readers take the read lock, so they never
/// observe a half-applied write. Use [`InvertedIndex::read`] to hold one
/// consistent view across several lookups.
#[derive(Debug, Default)]
pub struct InvertedIndex {
    inner: RwLock<IndexData>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: IndexData) -> Self {
        Self { inner: RwLock::new(data) }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, IndexData> {
        self.inner.read()
    }

    /// Index `text` under the next sequential id.
    pub fn add_document(&self, text: &str, tokens: &[String]) -> DocId {
        let mut data = self.inner.write();
        let doc_id = data.allocate();
        data.insert(doc_id, text, tokens);
        tracing::debug!(doc_id, tokens = tokens.len(), "document indexed");
        doc_id
    }

    /// Index `text` under a caller supplied id, e.g. a store primary key.
    ///
    /// The id counter is advanced past `doc_id`. Re-adding a live id appends
    /// to its existing postings; callers must `remove` it first.
    pub fn add_document_with_id(&self, doc_id: DocId, text: &str, tokens: &[String]) {
        let mut data = self.inner.write();
        data.insert(doc_id, text, tokens);
        data.advance_past(doc_id);
        tracing::debug!(doc_id, tokens = tokens.len(), "document indexed with external id");
    }

    /// Drops any previous postings of `doc_id` and indexes `text` in its place
    /// under a single write lock.
    pub fn replace_document(&self, doc_id: DocId, text: &str, tokens: &[String]) {
        let mut data = self.inner.write();
        data.remove(doc_id);
        data.insert(doc_id, text, tokens);
        data.advance_past(doc_id);
        tracing::debug!(doc_id, tokens = tokens.len(), "document reindexed");
    }

    pub fn postings(&self, term: &str) -> Postings {
        self.inner.read().postings(term).clone()
    }

    pub fn text(&self, doc_id: DocId) -> Option<String> {
        self.inner.read().text(doc_id).map(str::to_string)
    }

    pub fn count(&self) -> usize {
        self.inner.read().count()
    }

    /// Returns whether the document was indexed.
    pub fn remove(&self, doc_id: DocId) -> bool {
        let removed = self.inner.write().remove(doc_id);
        tracing::debug!(doc_id, removed, "document removed");
        removed
    }

    /// Drops every document and restarts ids at zero.
    pub fn clear(&self) {
        self.inner.write().clear();
        tracing::debug!("index cleared");
    }

    /// Absorbs all documents of `other` under fresh ids. Returns how many
    /// documents were added.
    pub fn merge(&self, other: &InvertedIndex) -> usize {
        let incoming = other.snapshot();
        if incoming.forward.is_empty() {
            return 0;
        }
        let added = self.inner.write().absorb(incoming);
        tracing::debug!(added, "index merged");
        added
    }

    pub fn snapshot(&self) -> IndexData {
        self.inner.read().clone()
    }
}
