//! Install trigger.
//!
//! Hands a validated artifact to the platform's install surface and
//! reports progress through the event sink. Installation itself is
//! owned by the platform; from here it is fire-and-forget.
//!
//! The installer is idempotent per artifact path and tolerates being
//! invoked concurrently for the same artifact: both monitor channels
//! may race to trigger it, and upstream de-duplication is not assumed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::artifact::{Artifact, ArtifactPolicy};
use crate::error::{Result, UpdateError};
use crate::events::{UpdateEvent, UpdateEventSink};

/// The platform's package-install entry point.
#[async_trait]
pub trait InstallSurface: Send + Sync {
    /// Launch the platform install flow for the artifact. Returning Ok
    /// means the flow was handed off, not that installation finished.
    async fn launch(&self, artifact_path: &Path, mime: &str) -> Result<()>;

    /// Open the OS setting that grants install permission. Fallback
    /// offered when `launch` is refused.
    async fn open_permission_settings(&self) -> Result<()>;

    /// Whether the host currently holds install permission.
    fn can_install(&self) -> bool;
}

pub struct Installer {
    surface: Arc<dyn InstallSurface>,
    events: Arc<dyn UpdateEventSink>,
    policy: ArtifactPolicy,
    mime: String,
    launched: Mutex<HashSet<PathBuf>>,
}

impl Installer {
    pub fn new(
        surface: Arc<dyn InstallSurface>,
        events: Arc<dyn UpdateEventSink>,
        policy: ArtifactPolicy,
        mime: String,
    ) -> Self {
        Self {
            surface,
            events,
            policy,
            mime,
            launched: Mutex::new(HashSet::new()),
        }
    }

    /// Validate, then launch the platform install flow once per
    /// artifact. A repeat call for an already-launched artifact is a
    /// no-op returning Ok.
    pub async fn install(&self, artifact: &Artifact) -> Result<()> {
        if !self.policy.validate(artifact) {
            warn!("❌ Artifact failed validation: {}", artifact.file_name);
            self.events.emit(UpdateEvent::InstallFailed {
                file_name: artifact.file_name.clone(),
                reason: "artifact failed validation".to_string(),
            });
            return Err(UpdateError::invalid_artifact(artifact.file_name.clone()));
        }

        // Claim the artifact before touching the surface; a concurrent
        // duplicate sees the claim and backs off.
        {
            let mut launched = self.launched.lock().unwrap();
            if !launched.insert(artifact.path.clone()) {
                debug!(
                    "Install already triggered for {}, ignoring duplicate",
                    artifact.file_name
                );
                return Ok(());
            }
        }

        if !self.surface.can_install() {
            debug!("Install permission not held; launch may be refused");
        }

        info!("🚀 Launching install for {}", artifact.file_name);
        self.events.emit(UpdateEvent::InstallStarting {
            file_name: artifact.file_name.clone(),
        });

        match self.surface.launch(&artifact.path, &self.mime).await {
            Ok(()) => {
                info!("✅ Install flow handed off for {}", artifact.file_name);
                self.events.emit(UpdateEvent::InstallLaunched {
                    file_name: artifact.file_name.clone(),
                });
                Ok(())
            }
            Err(e) => {
                let reason = match &e {
                    UpdateError::InstallLaunchFailed(r) => r.clone(),
                    other => other.to_string(),
                };
                warn!("❌ Install launch refused for {}: {reason}", artifact.file_name);
                self.events.emit(UpdateEvent::InstallFailed {
                    file_name: artifact.file_name.clone(),
                    reason: reason.clone(),
                });

                // Release the claim so a later cycle can retry.
                self.launched.lock().unwrap().remove(&artifact.path);

                // Launch refusal is typically a permission gap; offer
                // the settings surface rather than leaving the user stuck.
                if let Err(se) = self.surface.open_permission_settings().await {
                    warn!("Could not open install permission settings: {se}");
                }

                Err(UpdateError::InstallLaunchFailed(reason))
            }
        }
    }
}

// ============================================================================
// Fake Install Surface (deterministic tests)
// ============================================================================

/// Scripted install surface for tests: counts launches and can be told
/// to refuse them.
pub struct FakeInstallSurface {
    pub refuse_launch: bool,
    launches: Mutex<Vec<PathBuf>>,
    settings_opened: Mutex<u32>,
}

impl FakeInstallSurface {
    pub fn new() -> Self {
        Self {
            refuse_launch: false,
            launches: Mutex::new(Vec::new()),
            settings_opened: Mutex::new(0),
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse_launch: true,
            ..Self::new()
        }
    }

    pub fn launches(&self) -> Vec<PathBuf> {
        self.launches.lock().unwrap().clone()
    }

    pub fn settings_opened(&self) -> u32 {
        *self.settings_opened.lock().unwrap()
    }
}

impl Default for FakeInstallSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstallSurface for FakeInstallSurface {
    async fn launch(&self, artifact_path: &Path, _mime: &str) -> Result<()> {
        if self.refuse_launch {
            return Err(UpdateError::InstallLaunchFailed(
                "install permission not granted".to_string(),
            ));
        }
        self.launches.lock().unwrap().push(artifact_path.to_path_buf());
        Ok(())
    }

    async fn open_permission_settings(&self) -> Result<()> {
        *self.settings_opened.lock().unwrap() += 1;
        Ok(())
    }

    fn can_install(&self) -> bool {
        !self.refuse_launch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;

    const MIME: &str = "application/vnd.android.package-archive";

    fn valid_artifact() -> Artifact {
        Artifact::from_parts(PathBuf::from("/downloads/snapup-v1.1.apk"), 2 * 1024 * 1024)
    }

    fn installer(surface: Arc<FakeInstallSurface>, sink: Arc<RecordingEventSink>) -> Installer {
        Installer::new(surface, sink, ArtifactPolicy::default(), MIME.to_string())
    }

    #[tokio::test]
    async fn test_install_launches_once() {
        let surface = Arc::new(FakeInstallSurface::new());
        let sink = Arc::new(RecordingEventSink::new());
        let installer = installer(surface.clone(), sink.clone());
        let artifact = valid_artifact();

        installer.install(&artifact).await.unwrap();
        // Second call is a safe no-op.
        installer.install(&artifact).await.unwrap();

        assert_eq!(surface.launches().len(), 1);
        assert_eq!(
            sink.count_of(|e| matches!(e, UpdateEvent::InstallStarting { .. })),
            1
        );
        assert_eq!(
            sink.count_of(|e| matches!(e, UpdateEvent::InstallLaunched { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_invocations_are_safe() {
        let surface = Arc::new(FakeInstallSurface::new());
        let sink = Arc::new(RecordingEventSink::new());
        let installer = Arc::new(installer(surface.clone(), sink.clone()));
        let artifact = valid_artifact();

        let a = {
            let installer = Arc::clone(&installer);
            let artifact = artifact.clone();
            tokio::spawn(async move { installer.install(&artifact).await })
        };
        let b = {
            let installer = Arc::clone(&installer);
            let artifact = artifact.clone();
            tokio::spawn(async move { installer.install(&artifact).await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert_eq!(surface.launches().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_artifact_rejected_before_launch() {
        let surface = Arc::new(FakeInstallSurface::new());
        let sink = Arc::new(RecordingEventSink::new());
        let installer = installer(surface.clone(), sink.clone());

        let tiny = Artifact::from_parts(PathBuf::from("/downloads/snapup-v1.1.apk"), 1024);
        let err = installer.install(&tiny).await.unwrap_err();

        assert!(matches!(err, UpdateError::InvalidArtifact(_)));
        assert!(surface.launches().is_empty());
        assert_eq!(
            sink.count_of(|e| matches!(e, UpdateEvent::InstallFailed { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_launch_refusal_opens_settings_and_allows_retry() {
        let surface = Arc::new(FakeInstallSurface::refusing());
        let sink = Arc::new(RecordingEventSink::new());
        let installer = installer(surface.clone(), sink.clone());
        let artifact = valid_artifact();

        let err = installer.install(&artifact).await.unwrap_err();
        assert!(matches!(err, UpdateError::InstallLaunchFailed(_)));
        assert_eq!(surface.settings_opened(), 1);

        // The claim was released; a retry attempts the launch again.
        let err = installer.install(&artifact).await.unwrap_err();
        assert!(matches!(err, UpdateError::InstallLaunchFailed(_)));
        assert_eq!(surface.settings_opened(), 2);
    }
}
