//! Update cycle orchestrator.
//!
//! Sequences one full update cycle: fetch remote version metadata,
//! compare, resolve the source (cached artifact or fresh transfer),
//! watch the transfer through the redundant monitor, and hand the
//! validated artifact to the installer exactly once.
//!
//! Cycle state is published on a watch channel; observers only ever see
//! immutable snapshots. Phases move forward within a cycle; the only
//! way out of Failed is starting a fresh cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{MetadataClient, UpdateInfo};
use crate::artifact::{artifact_file_name, find_cached, sha256_file, Artifact};
use crate::config::UpdateConfig;
use crate::error::{Result, UpdateError};
use crate::events::{UpdateEvent, UpdateEventSink};
use crate::installer::Installer;
use crate::monitor::{MonitorStream, TransferMonitor};
use crate::transfer::{ensure_http_source, DownloadHandle, TransferService, TransferStatus};
use crate::version::{needs_update, VersionId};

/// Phase of the running update cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    CheckingVersion,
    Comparing,
    ResolvingSource,
    Acquiring,
    Installing,
    Failed,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Idle => "idle",
            CyclePhase::CheckingVersion => "checking version",
            CyclePhase::Comparing => "comparing",
            CyclePhase::ResolvingSource => "resolving source",
            CyclePhase::Acquiring => "acquiring",
            CyclePhase::Installing => "installing",
            CyclePhase::Failed => "failed",
        }
    }
}

/// Snapshot of the orchestrator's cycle state, for outside observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCycleState {
    pub phase: CyclePhase,
    pub error: Option<String>,
    pub progress: u8,
    pub status_text: String,
}

impl Default for UpdateCycleState {
    fn default() -> Self {
        Self {
            phase: CyclePhase::Idle,
            error: None,
            progress: 0,
            status_text: "idle".to_string(),
        }
    }
}

/// How one cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Already current
    NoUpdate,
    /// Artifact handed to the install surface
    Installed { version: String },
    /// Classified failure; also reflected in the cycle state
    Failed { error: String },
    /// A newer cycle took over this cycle's handle; nothing recorded
    Superseded,
}

pub struct UpdateOrchestrator {
    metadata: Arc<dyn MetadataClient>,
    transfer: Arc<dyn TransferService>,
    installer: Arc<Installer>,
    events: Arc<dyn UpdateEventSink>,
    config: UpdateConfig,
    state_tx: watch::Sender<UpdateCycleState>,
    state_rx: watch::Receiver<UpdateCycleState>,
    /// Handle of the acquisition the current cycle owns. Statuses for
    /// any other handle are stale and must not cause side effects.
    active_handle: Mutex<Option<DownloadHandle>>,
    /// Monitors kept alive past logical completion; torn down on
    /// dispose so the completion listeners deregister deterministically.
    retired: Mutex<Vec<MonitorStream>>,
}

impl UpdateOrchestrator {
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        transfer: Arc<dyn TransferService>,
        installer: Arc<Installer>,
        events: Arc<dyn UpdateEventSink>,
        config: UpdateConfig,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(UpdateCycleState::default());
        Self {
            metadata,
            transfer,
            installer,
            events,
            config,
            state_tx,
            state_rx,
            active_handle: Mutex::new(None),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Watch cycle state changes.
    pub fn subscribe(&self) -> watch::Receiver<UpdateCycleState> {
        self.state_rx.clone()
    }

    /// Current cycle state snapshot.
    pub fn snapshot(&self) -> UpdateCycleState {
        self.state_rx.borrow().clone()
    }

    /// Run one full update cycle. Never panics the host on failure; a
    /// classified error lands in the Failed phase and the returned
    /// outcome.
    pub async fn run_cycle(&self) -> CycleOutcome {
        // A new cycle invalidates the previous cycle's handle: late
        // statuses for it must no longer cause side effects. The old
        // polling loop is left to run out its own budget harmlessly.
        *self.active_handle.lock().unwrap() = None;

        // Fresh cycle: reset the published state.
        self.state_tx.send_replace(UpdateCycleState {
            phase: CyclePhase::CheckingVersion,
            error: None,
            progress: 0,
            status_text: "checking for updates".to_string(),
        });
        info!("🔍 Update cycle started (current {})", self.config.current_version);

        match self.cycle_inner().await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = e.to_string();
                warn!("❌ Update cycle failed: {reason}");
                self.events.emit(UpdateEvent::CycleFailed {
                    reason: reason.clone(),
                });
                self.state_tx.send_modify(|s| {
                    s.phase = CyclePhase::Failed;
                    s.error = Some(reason.clone());
                    s.status_text = "update failed".to_string();
                });
                CycleOutcome::Failed { error: reason }
            }
        }
    }

    /// Tear down retained monitors. Call when the owner shuts down;
    /// afterwards the orchestrator can still start fresh cycles.
    pub fn dispose(&self) {
        for stream in self.retired.lock().unwrap().drain(..) {
            stream.shutdown();
        }
        *self.active_handle.lock().unwrap() = None;
        debug!("🧹 Orchestrator disposed, monitor listeners stopped");
    }

    async fn cycle_inner(&self) -> Result<CycleOutcome> {
        let current: VersionId = self.config.current_version.parse()?;
        let response = self.metadata.check_update(&current.to_string()).await?;

        self.advance(CyclePhase::Comparing, "comparing versions");
        let Some(info) = response.to_update_info() else {
            info!("✅ No update available");
            self.finish_idle("up to date");
            return Ok(CycleOutcome::NoUpdate);
        };

        let server: VersionId = info.version_name.parse()?;
        if !needs_update(&current, &server) {
            info!("✅ Server offers {server}, not newer than {current}");
            self.finish_idle("up to date");
            return Ok(CycleOutcome::NoUpdate);
        }

        info!("🎯 Update available: {current} -> {server}");
        self.events.emit(UpdateEvent::UpdateAvailable {
            version: server.to_string(),
        });

        self.advance(CyclePhase::ResolvingSource, "resolving update source");
        let policy = self.config.artifact_policy();
        if let Some(cached) = find_cached(
            &self.config.download_dir,
            &self.config.artifact_prefix,
            &server,
            &policy,
        ) {
            info!("📦 Cache hit for {server}, skipping acquisition");
            self.advance(CyclePhase::Installing, "installing cached artifact");
            self.verify_integrity(&cached, info.sha256.as_deref())?;
            self.installer.install(&cached).await?;
            self.finish_idle("install handed off");
            return Ok(CycleOutcome::Installed {
                version: server.to_string(),
            });
        }

        // Cache miss: enqueue a fresh transfer and monitor it.
        ensure_http_source(&info.download_url)?;
        let destination = artifact_file_name(
            &self.config.artifact_prefix,
            &server,
            &self.config.package_extension,
        );
        let handle = self.transfer.enqueue(&info.download_url, &destination).await?;
        *self.active_handle.lock().unwrap() = Some(handle);
        info!("🚀 Transfer {handle} enqueued for {destination}");
        self.advance(CyclePhase::Acquiring, "downloading update");

        let mut stream =
            TransferMonitor::spawn(Arc::clone(&self.transfer), handle, self.config.monitor_config());
        let result = self.consume_statuses(&mut stream, handle, &info, &server).await;

        // The completion listener stays registered past logical
        // completion; dispose() is the one place it is torn down.
        self.retired.lock().unwrap().push(stream);
        result
    }

    /// Consume the merged status sequence until this cycle's terminal
    /// status has been acted on. First terminal wins; duplicates are
    /// acknowledged and inert; stale-handle statuses end the cycle
    /// without side effects.
    async fn consume_statuses(
        &self,
        stream: &mut MonitorStream,
        handle: DownloadHandle,
        info: &UpdateInfo,
        server: &VersionId,
    ) -> Result<CycleOutcome> {
        let acted = AtomicBool::new(false);

        while let Some(status) = stream.recv().await {
            if !self.is_active(handle) {
                debug!("Transfer {handle} superseded by a newer cycle, standing down");
                return Ok(CycleOutcome::Superseded);
            }

            match status {
                TransferStatus::Pending => self.set_text("waiting for transfer"),
                TransferStatus::Paused => self.set_text("transfer paused"),
                TransferStatus::Progress(p) => self.bump_progress(p),
                TransferStatus::Success => {
                    if acted
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                    {
                        debug!("Duplicate terminal status for {handle}, ignoring");
                        continue;
                    }
                    self.bump_progress(100);
                    info!("🎉 Transfer {handle} completed");
                    self.advance(CyclePhase::Installing, "transfer complete, installing");

                    let path = self.transfer.local_path(handle).await.ok_or_else(|| {
                        UpdateError::transfer_unavailable(format!(
                            "no local payload recorded for {handle}"
                        ))
                    })?;
                    let artifact = Artifact::from_path(&path)?;
                    self.verify_integrity(&artifact, info.sha256.as_deref())?;
                    self.installer.install(&artifact).await?;
                    self.finish_idle("install handed off");
                    return Ok(CycleOutcome::Installed {
                        version: server.to_string(),
                    });
                }
                TransferStatus::Failed(reason) => {
                    if acted
                        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                    {
                        debug!("Duplicate terminal status for {handle}, ignoring");
                        continue;
                    }
                    return Err(if reason == "timeout" {
                        UpdateError::Timeout(format!("transfer {handle} timed out"))
                    } else {
                        UpdateError::transfer_unavailable(reason)
                    });
                }
            }
        }

        Err(UpdateError::transfer_unavailable(
            "status stream ended without a terminal status",
        ))
    }

    /// Integrity gate: verified when the server advertises a checksum,
    /// otherwise the cycle proceeds on structural validation alone.
    fn verify_integrity(&self, artifact: &Artifact, expected: Option<&str>) -> Result<()> {
        match expected {
            Some(expected) => {
                let actual = sha256_file(&artifact.path)?;
                if actual.eq_ignore_ascii_case(expected) {
                    debug!("🔐 Checksum verified for {}", artifact.file_name);
                    Ok(())
                } else {
                    Err(UpdateError::ChecksumMismatch {
                        expected: expected.to_string(),
                        actual,
                    })
                }
            }
            None => {
                debug!(
                    "No checksum advertised for {}; integrity not verifiable",
                    artifact.file_name
                );
                Ok(())
            }
        }
    }

    fn is_active(&self, handle: DownloadHandle) -> bool {
        *self.active_handle.lock().unwrap() == Some(handle)
    }

    fn advance(&self, phase: CyclePhase, text: &str) {
        self.state_tx.send_modify(|s| {
            s.phase = phase;
            s.status_text = text.to_string();
        });
    }

    fn set_text(&self, text: &str) {
        self.state_tx.send_modify(|s| {
            s.status_text = text.to_string();
        });
    }

    /// Progress never regresses within a cycle; a late low-percentage
    /// report from the slower channel is kept from lowering the bar.
    fn bump_progress(&self, p: u8) {
        self.state_tx.send_modify(|s| {
            if p > s.progress {
                s.progress = p;
                s.status_text = format!("downloading {p}%");
            }
        });
    }

    fn finish_idle(&self, text: &str) {
        self.state_tx.send_modify(|s| {
            s.phase = CyclePhase::Idle;
            s.error = None;
            s.status_text = text.to_string();
        });
    }
}
