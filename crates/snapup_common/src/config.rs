//! Configuration for the update suite.
//!
//! Loaded from /etc/snapup/config.toml; every field has a default so a
//! missing or partial file still yields a working setup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::artifact::{ArtifactPolicy, MIN_ARTIFACT_BYTES};
use crate::monitor::MonitorConfig;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/snapup/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Base URL of the version metadata server
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Installed application version this host reports
    #[serde(default = "default_current_version")]
    pub current_version: String,

    /// Directory transfers land in; also the artifact cache
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Artifact file name prefix, completed by the version and extension
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,

    /// Expected package extension
    #[serde(default = "default_package_extension")]
    pub package_extension: String,

    /// MIME type handed to the install surface
    #[serde(default = "default_package_mime")]
    pub package_mime: String,

    /// Size floor for a plausible package
    #[serde(default = "default_min_artifact_bytes")]
    pub min_artifact_bytes: u64,

    /// Monitor poll cadence in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Monitor wall-clock budget in seconds
    #[serde(default = "default_monitor_budget_secs")]
    pub monitor_budget_secs: u64,

    /// Scheduler cadence for automatic checks, in seconds
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Command that opens the platform install flow; the artifact path
    /// is appended as the final argument
    #[serde(default = "default_installer_command")]
    pub installer_command: Vec<String>,

    /// Command that opens the install-permission settings surface;
    /// empty disables the fallback
    #[serde(default)]
    pub settings_command: Vec<String>,
}

fn default_server_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_current_version() -> String {
    "1.0".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("/var/lib/snapup/downloads")
}

fn default_artifact_prefix() -> String {
    "snapup-v".to_string()
}

fn default_package_extension() -> String {
    ".apk".to_string()
}

fn default_package_mime() -> String {
    "application/vnd.android.package-archive".to_string()
}

fn default_min_artifact_bytes() -> u64 {
    MIN_ARTIFACT_BYTES
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_monitor_budget_secs() -> u64 {
    600
}

fn default_check_interval_secs() -> u64 {
    600
}

fn default_installer_command() -> Vec<String> {
    vec!["xdg-open".to_string()]
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            current_version: default_current_version(),
            download_dir: default_download_dir(),
            artifact_prefix: default_artifact_prefix(),
            package_extension: default_package_extension(),
            package_mime: default_package_mime(),
            min_artifact_bytes: default_min_artifact_bytes(),
            poll_interval_secs: default_poll_interval_secs(),
            monitor_budget_secs: default_monitor_budget_secs(),
            check_interval_secs: default_check_interval_secs(),
            installer_command: default_installer_command(),
            settings_command: Vec::new(),
        }
    }
}

impl UpdateConfig {
    /// Load from the standard path, falling back to defaults when the
    /// file is absent or unreadable.
    pub fn load() -> Self {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Config at {} is invalid, using defaults: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            budget: Duration::from_secs(self.monitor_budget_secs.max(1)),
        }
    }

    pub fn artifact_policy(&self) -> ArtifactPolicy {
        ArtifactPolicy {
            min_bytes: self.min_artifact_bytes,
            extension: self.package_extension.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UpdateConfig::default();
        assert_eq!(config.poll_interval_secs, 1);
        assert_eq!(config.monitor_budget_secs, 600);
        assert_eq!(config.package_extension, ".apk");
        assert_eq!(config.artifact_prefix, "snapup-v");
        assert_eq!(config.min_artifact_bytes, 1024 * 1024);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "server_url = \"http://updates.example:8080\"\npoll_interval_secs = 2\n")
            .unwrap();

        let config = UpdateConfig::load_from(&path);
        assert_eq!(config.server_url, "http://updates.example:8080");
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.monitor_budget_secs, 600);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = UpdateConfig::load_from(Path::new("/nonexistent/snapup.toml"));
        assert_eq!(config.server_url, default_server_url());
    }

    #[test]
    fn test_monitor_config_conversion() {
        let config = UpdateConfig::default();
        let mc = config.monitor_config();
        assert_eq!(mc.poll_interval, Duration::from_secs(1));
        assert_eq!(mc.budget, Duration::from_secs(600));
    }
}
