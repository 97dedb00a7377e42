//! Command-based install surface.
//!
//! Hands a completed artifact to the platform's package installer by
//! spawning the configured opener command. Installation UI and the
//! final confirmation belong to the platform; this is fire-and-forget.

use std::path::Path;
use std::process::Command;

use async_trait::async_trait;
use tracing::{info, warn};

use snapup_common::{InstallSurface, Result, UpdateError};

pub struct CommandInstallSurface {
    installer_command: Vec<String>,
    settings_command: Vec<String>,
}

impl CommandInstallSurface {
    pub fn new(installer_command: Vec<String>, settings_command: Vec<String>) -> Self {
        Self {
            installer_command,
            settings_command,
        }
    }

    fn spawn_command(parts: &[String], extra: Option<&Path>) -> std::io::Result<()> {
        let mut cmd = Command::new(&parts[0]);
        cmd.args(&parts[1..]);
        if let Some(path) = extra {
            cmd.arg(path);
        }
        cmd.spawn().map(|_| ())
    }
}

#[async_trait]
impl InstallSurface for CommandInstallSurface {
    async fn launch(&self, artifact_path: &Path, mime: &str) -> Result<()> {
        if self.installer_command.is_empty() {
            return Err(UpdateError::InstallLaunchFailed(
                "no installer command configured".to_string(),
            ));
        }

        info!(
            "🔧 Opening install surface for {} ({mime})",
            artifact_path.display()
        );
        Self::spawn_command(&self.installer_command, Some(artifact_path))
            .map_err(|e| UpdateError::InstallLaunchFailed(e.to_string()))
    }

    async fn open_permission_settings(&self) -> Result<()> {
        if self.settings_command.is_empty() {
            warn!("No settings command configured; cannot open install permission settings");
            return Ok(());
        }

        info!("🔧 Opening install permission settings");
        Self::spawn_command(&self.settings_command, None)
            .map_err(|e| UpdateError::InstallLaunchFailed(e.to_string()))
    }

    fn can_install(&self) -> bool {
        let Some(binary) = self.installer_command.first() else {
            return false;
        };
        Command::new("which")
            .arg(binary)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_missing_command_refuses_launch() {
        let surface = CommandInstallSurface::new(vec![], vec![]);
        let err = surface
            .launch(&PathBuf::from("/tmp/pkg.apk"), "application/octet-stream")
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::InstallLaunchFailed(_)));
        assert!(!surface.can_install());
    }

    #[tokio::test]
    async fn test_nonexistent_binary_refuses_launch() {
        let surface =
            CommandInstallSurface::new(vec!["snapup-no-such-binary".to_string()], vec![]);
        let err = surface
            .launch(&PathBuf::from("/tmp/pkg.apk"), "application/octet-stream")
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::InstallLaunchFailed(_)));
        assert!(!surface.can_install());
    }

    #[tokio::test]
    async fn test_unconfigured_settings_fallback_is_silent() {
        let surface = CommandInstallSurface::new(vec![], vec![]);
        assert!(surface.open_permission_settings().await.is_ok());
    }
}
