use anyhow::{Context, Result};
use search_core::persist::load_snapshot;
use search_core::{Analyzer, DocumentRequest, DocumentStore, IndexingService, InvertedIndex, QueryEngine, UpsertOutcome};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Debug, Deserialize)]
struct InputDoc {
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default, alias = "body")]
    content: String,
    url: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Opens the store and replays it into a fresh index.
pub fn open_pipeline(data_dir: &Path) -> Result<(DocumentStore, IndexingService, QueryEngine)> {
    let store = DocumentStore::open(data_dir)?;
    let analyzer = Arc::new(Analyzer::english());
    let index = Arc::new(InvertedIndex::new());
    let indexing = IndexingService::new(index.clone(), analyzer.clone());
    indexing.rebuild_from(&store)?;
    Ok((store, indexing, QueryEngine::new(index, analyzer)))
}

/// Ingests a `.json`/`.jsonl` file, or every such file below a directory.
pub fn ingest_path(store: &DocumentStore, input: &Path) -> Result<IngestSummary> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }

    let mut summary = IngestSummary::default();
    for file in files {
        tracing::debug!(file = %file.display(), "ingesting");
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            ingest_jsonl(store, &file, &mut summary)?;
        } else {
            ingest_json(store, &file, &mut summary)?;
        }
    }
    Ok(summary)
}

fn ingest_jsonl(store: &DocumentStore, file: &Path, summary: &mut IngestSummary) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: InputDoc = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), line_no + 1))?;
        ingest_doc(store, doc, summary)?;
    }
    Ok(())
}

fn ingest_json(store: &DocumentStore, file: &Path, summary: &mut IngestSummary) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                ingest_doc(store, serde_json::from_value(v)?, summary)?;
            }
        }
        serde_json::Value::Object(_) => ingest_doc(store, serde_json::from_value(json)?, summary)?,
        _ => tracing::warn!(file = %file.display(), "expected a JSON object or array"),
    }
    Ok(())
}

fn ingest_doc(store: &DocumentStore, doc: InputDoc, summary: &mut IngestSummary) -> Result<()> {
    // documents without a url fall back to their external id as the unique key
    let Some(url) = doc.url.or(doc.id) else {
        tracing::warn!(title = %doc.title, "skipping document without url or id");
        summary.skipped += 1;
        return Ok(());
    };
    match store.upsert_by_url(DocumentRequest { title: doc.title, content: doc.content, url })? {
        UpsertOutcome::Created(_) => summary.created += 1,
        UpsertOutcome::Updated(_) => summary.updated += 1,
    }
    Ok(())
}

/// Merges snapshot files in order into one index.
pub fn merge_snapshots(inputs: &[PathBuf]) -> Result<InvertedIndex> {
    let merged = InvertedIndex::new();
    for path in inputs {
        let part = InvertedIndex::from_data(load_snapshot(path)?);
        let added = merged.merge(&part);
        tracing::info!(path = %path.display(), added, "snapshot merged");
    }
    Ok(merged)
}
