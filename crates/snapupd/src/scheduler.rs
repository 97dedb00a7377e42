//! Automatic update scheduler.
//!
//! Ticks once a minute, consults the persisted daemon state for mode
//! and due time, and runs an update cycle when one is due. The cycle
//! cadence itself comes from config so it can be changed at runtime.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use snapup_common::update_state::LastOutcome;
use snapup_common::{CycleOutcome, DaemonUpdateState, UpdateOrchestrator};

/// Scheduler tick; actual cycle cadence is enforced by the due check.
const TICK: Duration = Duration::from_secs(60);

pub struct UpdateScheduler {
    orchestrator: Arc<UpdateOrchestrator>,
    state_path: PathBuf,
    check_interval_secs: u64,
}

impl UpdateScheduler {
    pub fn new(
        orchestrator: Arc<UpdateOrchestrator>,
        state_path: PathBuf,
        check_interval_secs: u64,
    ) -> Self {
        Self {
            orchestrator,
            state_path,
            check_interval_secs,
        }
    }

    /// Spawn the scheduler loop.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("🔄 Auto-update scheduler started ({}s cadence)", self.check_interval_secs);
            loop {
                self.tick_once().await;
                tokio::time::sleep(TICK).await;
            }
        })
    }

    async fn tick_once(&self) {
        let mut state = DaemonUpdateState::load_from(&self.state_path);
        // Config wins over whatever interval the state file carries.
        state.interval_secs = self.check_interval_secs;

        if !state.is_check_due() {
            debug!("Next check {}", state.format_last_check());
            return;
        }

        info!("🔍 Scheduled update check (mode: {})", state.format_mode());
        let outcome = self.orchestrator.run_cycle().await;

        let recorded = match outcome {
            CycleOutcome::NoUpdate => Some(LastOutcome::NoUpdate),
            CycleOutcome::Installed { version } => {
                info!("✅ Update cycle handed off install of {version}");
                Some(LastOutcome::Installed { version })
            }
            CycleOutcome::Failed { error } => {
                error!("❌ Update cycle failed: {error}");
                Some(LastOutcome::Failed { error })
            }
            // A manual cycle took over; it does its own recording.
            CycleOutcome::Superseded => None,
        };

        if let Some(outcome) = recorded {
            state.record_check(outcome);
            if let Err(e) = state.save_to(&self.state_path) {
                error!("Failed to persist update state: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapup_common::{
        FakeInstallSurface, FakeMetadataClient, FakeTransferService, Installer, NullEventSink,
        UpdateConfig,
    };

    fn orchestrator(metadata: FakeMetadataClient) -> Arc<UpdateOrchestrator> {
        let config = UpdateConfig {
            download_dir: std::env::temp_dir().join("snapupd-sched-test"),
            ..Default::default()
        };
        let events = Arc::new(NullEventSink);
        let installer = Arc::new(Installer::new(
            Arc::new(FakeInstallSurface::new()),
            events.clone(),
            config.artifact_policy(),
            config.package_mime.clone(),
        ));
        Arc::new(UpdateOrchestrator::new(
            Arc::new(metadata),
            Arc::new(FakeTransferService::new()),
            installer,
            events,
            config,
        ))
    }

    #[tokio::test]
    async fn test_due_tick_records_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("update_state.json");

        let scheduler = UpdateScheduler::new(
            orchestrator(FakeMetadataClient::up_to_date("1.0")),
            state_path.clone(),
            600,
        );
        scheduler.tick_once().await;

        let state = DaemonUpdateState::load_from(&state_path);
        assert_eq!(state.last_outcome, LastOutcome::NoUpdate);
        assert!(state.last_check_epoch.is_some());
    }

    #[tokio::test]
    async fn test_recent_check_skips_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("update_state.json");

        // Seed a just-checked state.
        let mut state = DaemonUpdateState::default();
        state.record_check(LastOutcome::NoUpdate);
        state.save_to(&state_path).unwrap();

        let scheduler = UpdateScheduler::new(
            orchestrator(FakeMetadataClient::offering(
                "1.1",
                2,
                "http://host/snapup-v1.1.apk",
            )),
            state_path.clone(),
            600,
        );
        scheduler.tick_once().await;

        // No new cycle ran: outcome unchanged.
        let state = DaemonUpdateState::load_from(&state_path);
        assert_eq!(state.last_outcome, LastOutcome::NoUpdate);
    }
}
