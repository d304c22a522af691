use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[\p{L}\p{N}]+").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a", "an", "and", "are", "as", "at", "be", "but", "by",
            "for", "if", "in", "into", "is", "it", "no", "not",
            "of", "on", "or", "such", "that", "the", "their", "then",
            "there", "these", "they", "this", "to", "was", "will", "with",
        ];
        words.iter().copied().collect()
    };
    static ref ENGLISH: Analyzer = Analyzer::english();
}

/// Reduces a word to its canonical surface form.
pub trait Stem: Send + Sync {
    fn stem<'a>(&self, word: &'a str) -> Cow<'a, str>;
}

impl Stem for Stemmer {
    fn stem<'a>(&self, word: &'a str) -> Cow<'a, str> {
        Stemmer::stem(self, word)
    }
}

/// Leaves every word untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStemming;

impl Stem for NoStemming {
    fn stem<'a>(&self, word: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(word)
    }
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Text analysis pipeline shared by indexing, scoring and querying.
///
/// Text is NFKC-normalized and lowercased, split on runs of non-alphanumeric
/// characters, stripped of stopwords and finally stemmed. Positions recorded
/// in postings are indices into the output of [`Analyzer::analyze`], so the
/// same analyzer must be used at index time and at query time.
pub struct Analyzer {
    stemmer: Box<dyn Stem>,
}

impl Analyzer {
    /// Snowball English stemming.
    pub fn english() -> Self {
        Self::with_stemmer(Stemmer::create(Algorithm::English))
    }

    pub fn with_stemmer(stemmer: impl Stem + 'static) -> Self {
        Self { stemmer: Box::new(stemmer) }
    }

    /// Blank input yields no tokens.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        WORD.find_iter(&normalized)
            .map(|m| m.as_str())
            .filter(|token| !is_stopword(token))
            .map(|token| self.stem_token(token))
            .collect()
    }

    fn stem_token(&self, token: &str) -> String {
        let stem = self.stemmer.stem(token);
        if stem.is_empty() {
            token.to_string()
        } else {
            stem.into_owned()
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::english()
    }
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer").finish_non_exhaustive()
    }
}

/// Analyze with the process-wide English analyzer.
pub fn analyze(text: &str) -> Vec<String> {
    ENGLISH.analyze(text)
}
