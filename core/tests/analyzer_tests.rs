use search_core::analyzer::{analyze, Analyzer, NoStemming};

#[test]
fn it_normalizes_and_stems() {
    let words = analyze("Running Runners RUN! The ﬁle's menu.");
    assert!(words.contains(&"run".to_string()));
    // NFKC folds the ligature before splitting
    assert!(words.contains(&"file".to_string()));
    assert!(words.contains(&"menu".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let words = analyze("The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert_eq!(words, vec!["quick", "brown", "fox", "lazi", "dog"]);
}

#[test]
fn positions_follow_output_sequence() {
    // stopwords do not leave gaps
    let words = Analyzer::with_stemmer(NoStemming).analyze("the cat is on the mat");
    assert_eq!(words, vec!["cat", "mat"]);
}

#[test]
fn stopwords_are_checked_before_stemming() {
    // "thing" is not a stopword even though "the" is its prefix
    assert_eq!(analyze("this thing"), vec!["thing"]);
}
