use anyhow::Result;
use clap::Parser;
use crawler::{CrawlRequest, Crawler};
use search_core::DocumentStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Crawl one site breadth-first into the document store")]
struct Cli {
    /// Page to start from; only links on the same host are followed
    #[arg(long)]
    start_url: String,
    /// Document store directory
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
    /// Maximum number of pages to fetch
    #[arg(long, default_value_t = 10)]
    max_pages: usize,
    /// Maximum link depth from the start page
    #[arg(long, default_value_t = 2)]
    max_depth: usize,
    /// Pause between requests in milliseconds
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,
    /// Do not fetch or honour robots.txt
    #[arg(long)]
    ignore_robots: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let store = Arc::new(DocumentStore::open(&args.data_dir)?);
    // the server rebuilds its index from the store on start
    let crawler = Crawler::new(store.clone(), None)?;
    let request = CrawlRequest {
        start_url: args.start_url,
        max_pages: args.max_pages,
        max_depth: args.max_depth,
        respect_robots_txt: !args.ignore_robots,
        delay_ms: args.delay_ms,
    };
    let result = crawler.crawl(&request).await?;
    store.flush()?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
