use crate::analyzer::Analyzer;
use crate::index::{DocId, IndexData};
use std::collections::HashSet;
use std::sync::Arc;

/// TF-IDF relevance of a document for a set of analyzed query terms.
///
/// `tf = occurrences / analyzed document length`, `idf = ln(1 + N / df)`,
/// summed over the distinct query terms. Missing or empty documents score 0.
#[derive(Debug, Clone)]
pub struct TfIdfScorer {
    analyzer: Arc<Analyzer>,
}

impl TfIdfScorer {
    /// `analyzer` must be the one the index was built with, otherwise the
    /// length denominator drifts from the recorded positions.
    pub fn new(analyzer: Arc<Analyzer>) -> Self {
        Self { analyzer }
    }

    pub fn score(&self, index: &IndexData, doc_id: DocId, query_terms: &[String]) -> f64 {
        let total_docs = index.count().max(1) as f64;
        let text = match index.text(doc_id) {
            Some(text) if !text.trim().is_empty() => text,
            _ => return 0.0,
        };
        let doc_len = self.analyzer.analyze(text).len();
        if doc_len == 0 {
            return 0.0;
        }

        let mut seen = HashSet::new();
        let mut score = 0.0;
        for term in query_terms {
            if !seen.insert(term.as_str()) {
                continue;
            }
            let postings = index.postings(term);
            let Some(positions) = postings.get(&doc_id) else { continue };
            if positions.is_empty() {
                continue;
            }
            let tf = positions.len() as f64 / doc_len as f64;
            let df = postings.len().max(1) as f64;
            let idf = (1.0 + total_docs / df).ln();
            score += tf * idf;
        }
        score
    }
}
