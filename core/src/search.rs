use crate::analyzer::Analyzer;
use crate::index::{DocId, IndexData, InvertedIndex, Postings};
use crate::scorer::TfIdfScorer;
use crate::snippet::{build_snippet, DEFAULT_MAX_LENGTH};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_LIMIT: usize = 10;
/// Compounding multiplier per matched term found in the title.
pub const TITLE_BOOST: f64 = 1.3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}
fn default_limit() -> usize { DEFAULT_LIMIT }

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), limit: DEFAULT_LIMIT, offset: 0 }
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    /// Rounded to 2 decimals.
    pub score: f64,
    pub matched_terms: Vec<String>,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    /// Candidates before pagination.
    pub total_results: usize,
    pub limit: usize,
    pub offset: usize,
    pub results: Vec<SearchHit>,
    pub took_ms: u64,
}

/// Document metadata owned outside the index.
pub trait MetadataLookup {
    fn title(&self, doc_id: DocId) -> Option<String>;
}

/// No titles, hence no title boosts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataLookup for NoMetadata {
    fn title(&self, _doc_id: DocId) -> Option<String> {
        None
    }
}

impl MetadataLookup for HashMap<DocId, String> {
    fn title(&self, doc_id: DocId) -> Option<String> {
        self.get(&doc_id).cloned()
    }
}

struct Ranked {
    doc_id: DocId,
    score: f64,
    matched_terms: Vec<String>,
}

/// Boolean-AND retrieval with TF-IDF ranking over a shared index.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    index: Arc<InvertedIndex>,
    analyzer: Arc<Analyzer>,
    scorer: TfIdfScorer,
}

impl QueryEngine {
    pub fn new(index: Arc<InvertedIndex>, analyzer: Arc<Analyzer>) -> Self {
        let scorer = TfIdfScorer::new(analyzer.clone());
        Self { index, analyzer, scorer }
    }

    pub fn index(&self) -> &Arc<InvertedIndex> {
        &self.index
    }

    /// Runs `request` against one consistent view of the index.
    ///
    /// Only documents containing every distinct analyzed query token are
    /// candidates. Candidates are ranked by score descending, ties by
    /// ascending document id, and the page is cut from the full ranking.
    pub fn search(&self, request: &SearchRequest, metadata: &dyn MetadataLookup) -> SearchResults {
        let start = Instant::now();
        let query_tokens = self.analyzer.analyze(&request.query);
        if query_tokens.is_empty() {
            return empty_results(request, start);
        }

        let data = self.index.read();
        let candidates = intersect_candidates(&data, &query_tokens);
        if candidates.is_empty() {
            return empty_results(request, start);
        }

        let mut ranked: Vec<Ranked> = candidates
            .into_iter()
            .filter_map(|doc_id| self.rank(&data, doc_id, &query_tokens, metadata))
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));

        let total_results = ranked.len();
        let results: Vec<SearchHit> = ranked
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|r| SearchHit {
                snippet: build_snippet(data.text(r.doc_id).unwrap_or_default(), &r.matched_terms, DEFAULT_MAX_LENGTH),
                doc_id: r.doc_id,
                score: round2(r.score),
                matched_terms: r.matched_terms,
            })
            .collect();
        drop(data);

        let took_ms = start.elapsed().as_millis() as u64;
        tracing::info!(query = %request.query, total_results, returned = results.len(), took_ms, "search completed");
        SearchResults {
            query: request.query.clone(),
            total_results,
            limit: request.limit,
            offset: request.offset,
            results,
            took_ms,
        }
    }

    fn rank(&self, data: &IndexData, doc_id: DocId, query_tokens: &[String], metadata: &dyn MetadataLookup) -> Option<Ranked> {
        let score = self.scorer.score(data, doc_id, query_tokens);
        if score <= 0.0 {
            return None;
        }
        let text = data.text(doc_id)?;
        let title = metadata.title(doc_id).unwrap_or_default();
        let doc_tokens: HashSet<String> = self.analyzer.analyze(&format!("{title} {text}")).into_iter().collect();

        let mut matched_terms: Vec<String> = Vec::new();
        for token in query_tokens {
            if doc_tokens.contains(token) && !matched_terms.contains(token) {
                matched_terms.push(token.clone());
            }
        }

        let title_lower = title.to_lowercase();
        let boosted = matched_terms
            .iter()
            .filter(|term| title_lower.contains(term.as_str()))
            .fold(score, |acc, _| acc * TITLE_BOOST);
        Some(Ranked { doc_id, score: boosted, matched_terms })
    }
}

/// Documents present in the postings of every distinct token, ascending.
fn intersect_candidates(data: &IndexData, tokens: &[String]) -> Vec<DocId> {
    let mut seen = HashSet::new();
    let mut lists: Vec<&Postings> = Vec::new();
    for token in tokens {
        if seen.insert(token.as_str()) {
            lists.push(data.postings(token));
        }
    }
    lists.sort_by_key(|postings| postings.len());
    let Some((smallest, rest)) = lists.split_first() else {
        return Vec::new();
    };
    smallest
        .keys()
        .copied()
        .filter(|doc_id| rest.iter().all(|postings| postings.contains_key(doc_id)))
        .collect()
}

fn empty_results(request: &SearchRequest, start: Instant) -> SearchResults {
    SearchResults {
        query: request.query.clone(),
        total_results: 0,
        limit: request.limit,
        offset: request.offset,
        results: Vec::new(),
        took_ms: start.elapsed().as_millis() as u64,
    }
}

fn round2(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(texts: &[&str]) -> QueryEngine {
        let analyzer = Arc::new(Analyzer::english());
        let index = Arc::new(InvertedIndex::new());
        for text in texts {
            index.add_document(text, &analyzer.analyze(text));
        }
        QueryEngine::new(index, analyzer)
    }

    fn ids(results: &SearchResults) -> Vec<DocId> {
        results.results.iter().map(|h| h.doc_id).collect()
    }

    #[test]
    fn blank_query_returns_nothing() {
        let engine = engine_with(&["some text"]);
        let res = engine.search(&SearchRequest::new("   "), &NoMetadata);
        assert_eq!(res.total_results, 0);
        assert!(res.results.is_empty());
        let res = engine.search(&SearchRequest::new("the and"), &NoMetadata);
        assert_eq!(res.total_results, 0);
    }

    #[test]
    fn requires_every_token() {
        let engine = engine_with(&["rust programming", "rust", "programming"]);
        let res = engine.search(&SearchRequest::new("rust programming"), &NoMetadata);
        assert_eq!(ids(&res), vec![0]);
        assert_eq!(res.total_results, 1);
    }

    #[test]
    fn unknown_token_yields_empty() {
        let engine = engine_with(&["rust programming"]);
        let res = engine.search(&SearchRequest::new("rust cobol"), &NoMetadata);
        assert!(res.results.is_empty());
    }

    #[test]
    fn sorted_by_score_descending() {
        let engine = engine_with(&["java", "java programming", "java java java"]);
        let res = engine.search(&SearchRequest::new("java"), &NoMetadata);
        assert_eq!(res.total_results, 3);
        let scores: Vec<f64> = res.results.iter().map(|h| h.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        // equal scores fall back to ascending id
        assert_eq!(ids(&res), vec![0, 2, 1]);
    }

    #[test]
    fn paginates_global_ranking() {
        let engine = engine_with(&["java", "java programming", "java java java", "java is a programming language used widely"]);
        let all = engine.search(&SearchRequest::new("java"), &NoMetadata);
        let page = engine.search(&SearchRequest::new("java").page(2, 1), &NoMetadata);
        assert_eq!(page.total_results, 4);
        assert_eq!(ids(&page), ids(&all)[1..3].to_vec());

        let beyond = engine.search(&SearchRequest::new("java").page(10, 50), &NoMetadata);
        assert_eq!(beyond.total_results, 4);
        assert!(beyond.results.is_empty());
    }

    #[test]
    fn title_matches_compound_boost() {
        let engine = engine_with(&["rust compiler internals", "rust compiler internals"]);
        let mut titles: HashMap<DocId, String> = HashMap::new();
        titles.insert(1, "Rust compiler guide".to_string());

        let res = engine.search(&SearchRequest::new("rust compiler"), &titles);
        assert_eq!(ids(&res), vec![1, 0]);
        let plain = res.results[1].score;
        let boosted = res.results[0].score;
        assert!((boosted - round2(plain * TITLE_BOOST * TITLE_BOOST)).abs() <= 0.011);
    }

    #[test]
    fn hits_report_matched_terms_and_snippet() {
        let engine = engine_with(&["Deep learning is part of machine learning"]);
        let res = engine.search(&SearchRequest::new("learning machines"), &NoMetadata);
        let hit = &res.results[0];
        assert_eq!(hit.matched_terms, vec!["learn".to_string(), "machin".to_string()]);
        assert_eq!(hit.snippet, "Deep learning is part of machine learning");
    }

    #[test]
    fn removed_documents_disappear() {
        let engine = engine_with(&["alpha beta", "alpha gamma"]);
        engine.index().remove(0);
        let res = engine.search(&SearchRequest::new("alpha"), &NoMetadata);
        assert_eq!(ids(&res), vec![1]);
    }
}
