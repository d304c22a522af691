use anyhow::Result;
use clap::Parser;
use search_core::persist::save_snapshot;
use search_core::DocumentStore;
use server::{build_app, AppState, DEFAULT_MAX_LIMIT};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Document store directory
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Write an index snapshot here on shutdown
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Upper bound for the `limit` search parameter
    #[arg(long, default_value_t = DEFAULT_MAX_LIMIT)]
    max_limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let store = DocumentStore::open(&args.data_dir)?;
    let state = AppState::new(store, args.max_limit)?;
    let app = build_app(state.clone());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, documents = state.indexing.count(), "server listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("shutting down");
    if let Some(path) = &args.snapshot {
        save_snapshot(path, &state.indexing.index().snapshot())?;
    }
    state.store.flush()?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
