use crate::analyzer::Analyzer;
use crate::index::{DocId, InvertedIndex};
use crate::store::DocumentStore;
use anyhow::Result;
use std::sync::Arc;

/// Write side of the search core: analyzes text and feeds the shared index.
#[derive(Debug, Clone)]
pub struct IndexingService {
    index: Arc<InvertedIndex>,
    analyzer: Arc<Analyzer>,
}

impl IndexingService {
    pub fn new(index: Arc<InvertedIndex>, analyzer: Arc<Analyzer>) -> Self {
        Self { index, analyzer }
    }

    pub fn index(&self) -> &Arc<InvertedIndex> {
        &self.index
    }

    /// Indexes `text` under `doc_id`, or under the next free id when none is given.
    pub fn add(&self, doc_id: Option<DocId>, text: &str) -> DocId {
        let tokens = self.analyzer.analyze(text);
        match doc_id {
            Some(id) => {
                self.index.add_document_with_id(id, text, &tokens);
                id
            }
            None => self.index.add_document(text, &tokens),
        }
    }

    /// Replaces whatever was indexed under `doc_id`.
    pub fn reindex(&self, doc_id: DocId, text: &str) {
        let tokens = self.analyzer.analyze(text);
        self.index.replace_document(doc_id, text, &tokens);
    }

    pub fn remove(&self, doc_id: DocId) -> bool {
        self.index.remove(doc_id)
    }

    pub fn clear(&self) {
        tracing::info!("clearing index");
        self.index.clear();
    }

    pub fn count(&self) -> usize {
        self.index.count()
    }

    /// Replays every stored document into an emptied index, keeping store ids.
    pub fn rebuild_from(&self, store: &DocumentStore) -> Result<usize> {
        let documents = store.all()?;
        self.index.clear();
        for doc in &documents {
            self.add(Some(doc.id), &doc.content);
        }
        tracing::info!(documents = documents.len(), terms = self.index.read().term_count(), "index rebuilt from store");
        Ok(documents.len())
    }
}
