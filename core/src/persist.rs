//! Whole-index snapshots: one bincode file plus a JSON meta sidecar.
//!
//! The layout carries no compatibility guarantees beyond `SNAPSHOT_VERSION`.

use crate::index::IndexData;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: usize,
    pub num_terms: usize,
    pub created_at: String,
    pub version: u32,
}

pub fn meta_path(snapshot: &Path) -> PathBuf {
    snapshot.with_extension("meta.json")
}

pub fn save_snapshot(path: &Path, data: &IndexData) -> Result<MetaFile> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir)?;
    }
    let mut f = BufWriter::new(File::create(path).with_context(|| format!("creating {}", path.display()))?);
    let bytes = bincode::serialize(data)?;
    f.write_all(&bytes)?;
    f.flush()?;

    let meta = MetaFile {
        num_docs: data.count(),
        num_terms: data.term_count(),
        created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        version: SNAPSHOT_VERSION,
    };
    save_meta(&meta_path(path), &meta)?;
    tracing::info!(path = %path.display(), num_docs = meta.num_docs, num_terms = meta.num_terms, "snapshot saved");
    Ok(meta)
}

pub fn load_snapshot(path: &Path) -> Result<IndexData> {
    let meta_file = meta_path(path);
    if meta_file.exists() {
        let meta = load_meta(&meta_file)?;
        if meta.version != SNAPSHOT_VERSION {
            bail!("unsupported snapshot version {} in {}", meta.version, meta_file.display());
        }
    }
    let mut f = BufReader::new(File::open(path).with_context(|| format!("opening {}", path.display()))?);
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let data: IndexData = bincode::deserialize(&buf).with_context(|| format!("decoding snapshot {}", path.display()))?;
    Ok(data)
}

pub fn save_meta(path: &Path, meta: &MetaFile) -> Result<()> {
    let mut f = File::create(path)?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(path: &Path) -> Result<MetaFile> {
    let mut f = File::open(path)?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}
