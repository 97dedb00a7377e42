//! SnapUp Daemon - self-update orchestration service
//!
//! Checks the version server on a schedule, acquires newer application
//! packages through the HTTP transfer engine, and hands validated
//! artifacts to the platform install surface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{info, warn, Level};

use snapup_common::update_state::{CYCLE_STATE_PATH, UPDATE_STATE_PATH};
use snapup_common::{
    HttpMetadataClient, Installer, UpdateConfig, UpdateEventSink, UpdateOrchestrator,
};
use snapupd::engine::HttpTransferEngine;
use snapupd::notify::DesktopNotifier;
use snapupd::scheduler::UpdateScheduler;
use snapupd::surface::CommandInstallSurface;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("SnapUp daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let config = UpdateConfig::load();
    info!(
        "Watching {} for versions newer than {}",
        config.server_url, config.current_version
    );

    if let Err(e) = std::fs::create_dir_all(&config.download_dir) {
        warn!(
            "Cannot create download dir {}: {e}",
            config.download_dir.display()
        );
    }

    let events: Arc<dyn UpdateEventSink> = Arc::new(DesktopNotifier::new());
    let engine = Arc::new(HttpTransferEngine::new(config.download_dir.clone())?);
    let surface = Arc::new(CommandInstallSurface::new(
        config.installer_command.clone(),
        config.settings_command.clone(),
    ));
    let installer = Arc::new(Installer::new(
        surface,
        Arc::clone(&events),
        config.artifact_policy(),
        config.package_mime.clone(),
    ));
    let metadata = Arc::new(HttpMetadataClient::new(&config.server_url)?);

    let orchestrator = Arc::new(UpdateOrchestrator::new(
        metadata,
        engine,
        installer,
        events,
        config.clone(),
    ));

    let publisher = spawn_state_publisher(
        Arc::clone(&orchestrator),
        PathBuf::from(CYCLE_STATE_PATH),
    );
    let scheduler = UpdateScheduler::new(
        Arc::clone(&orchestrator),
        PathBuf::from(UPDATE_STATE_PATH),
        config.check_interval_secs,
    )
    .start();

    info!("SnapUp daemon ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down gracefully");

    scheduler.abort();
    publisher.abort();
    // Deterministically drop the completion listeners before exit.
    orchestrator.dispose();

    Ok(())
}

/// Mirrors every cycle state change to disk so snapctl can show live
/// progress without talking to the daemon directly.
fn spawn_state_publisher(
    orchestrator: Arc<UpdateOrchestrator>,
    path: PathBuf,
) -> JoinHandle<()> {
    let mut states = orchestrator.subscribe();
    tokio::spawn(async move {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        while states.changed().await.is_ok() {
            let snapshot = states.borrow_and_update().clone();
            match serde_json::to_string_pretty(&snapshot) {
                Ok(json) => {
                    if let Err(e) = std::fs::write(&path, json) {
                        warn!("Failed to mirror cycle state: {e}");
                    }
                }
                Err(e) => warn!("Failed to serialize cycle state: {e}"),
            }
        }
    })
}
