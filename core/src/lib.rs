//! Text analysis, inverted index and TF-IDF ranking.

pub mod analyzer;
pub mod index;
pub mod indexing;
pub mod persist;
pub mod scorer;
pub mod search;
pub mod snippet;
pub mod store;

pub use analyzer::{analyze, Analyzer, NoStemming, Stem};
pub use index::{DocId, IndexData, InvertedIndex, Position, Postings};
pub use indexing::IndexingService;
pub use scorer::TfIdfScorer;
pub use search::{MetadataLookup, NoMetadata, QueryEngine, SearchHit, SearchRequest, SearchResults};
pub use store::{Document, DocumentRequest, DocumentStore, InsertOutcome, UpdateOutcome, UpsertOutcome};
