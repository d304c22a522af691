use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use indexer::{ingest_path, merge_snapshots, open_pipeline};
use search_core::persist::save_snapshot;
use search_core::{DocumentStore, SearchRequest};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Load documents and maintain the TF-IDF search index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upsert documents from JSON/JSONL files (or a directory of them) into the store
    Ingest {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Document store directory
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },
    /// Rebuild the index from the store and write a snapshot
    Snapshot {
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
        /// Snapshot file to write
        #[arg(long)]
        output: PathBuf,
    },
    /// Merge snapshots into one; merged documents get fresh ids
    Merge {
        #[arg(long, num_args = 1.., required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Run a query against the store and print the JSON response
    Search {
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Print document and term counts
    Stats {
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { input, data_dir } => {
            if !input.exists() {
                bail!("input {} does not exist", input.display());
            }
            let store = DocumentStore::open(&data_dir)?;
            let summary = ingest_path(&store, &input)?;
            store.flush()?;
            tracing::info!(created = summary.created, updated = summary.updated, skipped = summary.skipped, "ingest complete");
        }
        Commands::Snapshot { data_dir, output } => {
            let (_, indexing, _) = open_pipeline(&data_dir)?;
            save_snapshot(&output, &indexing.index().snapshot())?;
        }
        Commands::Merge { inputs, output } => {
            let merged = merge_snapshots(&inputs)?;
            save_snapshot(&output, &merged.snapshot())?;
        }
        Commands::Search { data_dir, query, limit, offset } => {
            let (store, _, engine) = open_pipeline(&data_dir)?;
            let results = engine.search(&SearchRequest::new(query).page(limit, offset), &store);
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Stats { data_dir } => {
            let (store, indexing, _) = open_pipeline(&data_dir)?;
            let data = indexing.index().read();
            let stats = serde_json::json!({
                "stored_documents": store.count(),
                "indexed_documents": data.count(),
                "terms": data.term_count(),
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
