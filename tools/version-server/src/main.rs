//! Version metadata server.
//!
//! Serves the update-check API the SnapUp updater consumes, plus the
//! administrative version operations snapctl issues. Versions are kept
//! in a JSON file store; artifacts themselves are hosted elsewhere and
//! only linked from here.

mod routes;
mod store;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

use routes::AppState;
use store::VersionStore;

#[derive(Parser)]
#[command(name = "version-server")]
#[command(about = "SnapUp version metadata server", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:5000")]
    listen: String,

    /// Directory holding versions.json and stats.json
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Base URL download links point at
    #[arg(long, default_value = "http://127.0.0.1:5000/packages")]
    artifact_base_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    info!("Version server v{} starting", env!("CARGO_PKG_VERSION"));
    let store = VersionStore::open(&cli.data_dir, &cli.artifact_base_url)?;

    let state = Arc::new(AppState {
        store: RwLock::new(store),
    });
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    info!("  Listening on http://{}", cli.listen);

    axum::serve(listener, app).await?;
    Ok(())
}
