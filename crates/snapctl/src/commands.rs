//! snapctl command implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use owo_colors::OwoColorize;

use snapup_common::update_state::{CYCLE_STATE_PATH, UPDATE_STATE_PATH};
use snapup_common::{
    CycleOutcome, DaemonUpdateState, HttpMetadataClient, Installer, LastOutcome, MetadataClient,
    UpdateConfig, UpdateCycleState, UpdateEventSink, UpdateOrchestrator, VersionId,
    VersionIncrementRequest, VersionResetRequest,
};
use snapupd::engine::HttpTransferEngine;
use snapupd::notify::DesktopNotifier;
use snapupd::surface::CommandInstallSurface;

/// Version increment stops here; a reset starts the next cycle.
const VERSION_CAP: VersionId = VersionId { major: 1, minor: 3 };

/// Next version to publish, or an error once the cap is reached.
fn next_version(current: &VersionId) -> Result<VersionId> {
    if *current >= VERSION_CAP {
        bail!(
            "maximum version reached ({VERSION_CAP}); run `snapctl version reset` to start a new cycle"
        );
    }
    Ok(VersionId::new(current.major, current.minor + 1))
}

fn load_config(server_override: Option<String>) -> UpdateConfig {
    let mut config = UpdateConfig::load();
    if let Some(server) = server_override {
        config.server_url = server;
    }
    config
}

fn client_for(config: &UpdateConfig) -> Result<HttpMetadataClient> {
    HttpMetadataClient::new(&config.server_url)
        .with_context(|| format!("cannot reach version server at {}", config.server_url))
}

pub async fn status() -> Result<()> {
    let state = DaemonUpdateState::load();

    println!("{}", "SnapUp Updater".bold());
    println!("  mode:          {}", state.format_mode());
    println!("  installed:     {}", state.installed_version);
    println!("  last check:    {}", state.format_last_check());
    println!("  last outcome:  {}", state.format_outcome());

    // Live cycle state, when the daemon has mirrored one.
    if let Ok(content) = std::fs::read_to_string(Path::new(CYCLE_STATE_PATH)) {
        if let Ok(cycle) = serde_json::from_str::<UpdateCycleState>(&content) {
            println!();
            println!("{}", "Current cycle".bold());
            println!("  phase:         {}", cycle.phase.as_str());
            println!("  progress:      {}%", cycle.progress);
            println!("  status:        {}", cycle.status_text);
            if let Some(error) = cycle.error {
                println!("  error:         {}", error.red());
            }
        }
    }

    Ok(())
}

pub async fn check(server: Option<String>) -> Result<()> {
    let config = load_config(server);
    let client = client_for(&config)?;

    println!("Checking {} ...", config.server_url.dimmed());
    let response = client
        .check_update(&config.current_version)
        .await
        .context("update check failed")?;

    match response.to_update_info() {
        Some(info) => {
            println!(
                "{} {} -> {}",
                "Update available:".green().bold(),
                config.current_version,
                info.version_name.bold()
            );
            if !info.release_notes.is_empty() {
                println!("  {}", info.release_notes);
            }
            if info.is_force_update {
                println!("  {}", "This update is mandatory".yellow());
            }
        }
        None => {
            println!(
                "{} (current {})",
                "Already up to date".green(),
                config.current_version
            );
        }
    }

    Ok(())
}

/// One-shot foreground update cycle with the real collaborators.
pub async fn update(server: Option<String>) -> Result<()> {
    let config = load_config(server);

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
    let metadata = Arc::new(client_for(&config)?);

    let orchestrator = UpdateOrchestrator::new(
        metadata,
        engine,
        installer,
        events,
        config.clone(),
    );

    // Echo progress while the cycle runs.
    let mut states = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        let mut last_line = String::new();
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            let line = format!("[{}] {}", state.phase.as_str(), state.status_text);
            if line != last_line {
                println!("  {}", line.dimmed());
                last_line = line;
            }
        }
    });

    let outcome = orchestrator.run_cycle().await;
    orchestrator.dispose();
    progress.abort();

    // Manual cycles record state just like scheduled ones.
    let mut state = DaemonUpdateState::load();
    match &outcome {
        CycleOutcome::NoUpdate => state.record_check(LastOutcome::NoUpdate),
        CycleOutcome::Installed { version } => state.record_check(LastOutcome::Installed {
            version: version.clone(),
        }),
        CycleOutcome::Failed { error } => state.record_check(LastOutcome::Failed {
            error: error.clone(),
        }),
        CycleOutcome::Superseded => {}
    }
    if let Err(e) = state.save_to(Path::new(UPDATE_STATE_PATH)) {
        eprintln!("  {} {e}", "warning: could not persist state:".yellow());
    }

    match outcome {
        CycleOutcome::NoUpdate => println!("{}", "Already up to date".green()),
        CycleOutcome::Installed { version } => println!(
            "{} {}",
            "Install handed off for version".green().bold(),
            version.bold()
        ),
        CycleOutcome::Failed { error } => bail!("update cycle failed: {error}"),
        CycleOutcome::Superseded => println!("Cycle superseded by another updater"),
    }

    Ok(())
}

pub async fn version_current(server: Option<String>) -> Result<()> {
    let config = load_config(server);
    let client = client_for(&config)?;

    let info = client
        .server_version()
        .await
        .context("cannot fetch server version")?;

    println!("{} {}", "Server version:".bold(), info.current_version);
    println!("  code:          {}", info.version_code);
    if !info.release_notes.is_empty() {
        println!("  notes:         {}", info.release_notes);
    }
    if info.is_force_update {
        println!("  {}", "marked as forced update".yellow());
    }

    Ok(())
}

pub async fn version_increment(
    server: Option<String>,
    notes: Option<String>,
    force_update: bool,
) -> Result<()> {
    let config = load_config(server);
    let client = client_for(&config)?;

    let current = client
        .server_version()
        .await
        .context("cannot fetch server version")?;
    let version: VersionId = current
        .current_version
        .parse()
        .context("server reported a malformed version")?;

    let next = next_version(&version)?;
    let request = VersionIncrementRequest {
        version: next.to_string(),
        release_notes: notes.unwrap_or_else(|| format!("Auto-generated version {next}")),
        is_force_update: force_update,
    };

    let response = client
        .increment_version(&request)
        .await
        .context("increment request failed")?;

    if response.success {
        println!(
            "{} {} -> {}",
            "Version incremented:".green().bold(),
            current.current_version,
            response.new_version.bold()
        );
    } else {
        bail!("server refused increment: {}", response.message);
    }

    Ok(())
}

pub async fn version_reset(server: Option<String>, to: String) -> Result<()> {
    let config = load_config(server);
    let client = client_for(&config)?;

    // Validate before asking the server to do anything.
    let _: VersionId = to.parse().context("reset target is not a valid version")?;

    let request = VersionResetRequest {
        target_version: to,
        ..Default::default()
    };
    let response = client
        .reset_version(&request)
        .await
        .context("reset request failed")?;

    if response.success {
        println!(
            "{} {} (was {})",
            "Version reset to".green().bold(),
            response.reset_version.bold(),
            response.previous_version
        );
    } else {
        bail!("server refused reset: {}", response.message);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_version_increments_minor() {
        assert_eq!(
            next_version(&VersionId::new(1, 0)).unwrap(),
            VersionId::new(1, 1)
        );
        assert_eq!(
            next_version(&VersionId::new(1, 2)).unwrap(),
            VersionId::new(1, 3)
        );
    }

    #[test]
    fn test_next_version_stops_at_cap() {
        let err = next_version(&VersionId::new(1, 3)).unwrap_err();
        assert!(err.to_string().contains("maximum version reached"));
        // Anything past the cap is equally refused.
        assert!(next_version(&VersionId::new(2, 0)).is_err());
    }
}
