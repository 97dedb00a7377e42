//! Persisted daemon update state.
//!
//! Stores scheduler mode and the last cycle's outcome so `snapctl
//! status` reports the truth across restarts.
//! State file: /var/lib/snapup/update_state.json

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Path to the persisted state file
pub const UPDATE_STATE_PATH: &str = "/var/lib/snapup/update_state.json";

/// Path where the daemon mirrors the live cycle state for snapctl
pub const CYCLE_STATE_PATH: &str = "/var/lib/snapup/cycle_state.json";

/// Scheduler modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Periodic automatic cycles
    Auto,
    /// Cycles run only when requested
    Manual,
    /// Updater disabled entirely
    Disabled,
}

impl Default for UpdateMode {
    fn default() -> Self {
        Self::Auto
    }
}

/// Outcome of the last completed update cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastOutcome {
    /// No cycle has run yet
    Pending,
    /// Cycle ran; already current
    NoUpdate,
    /// Cycle handed an artifact to the install surface
    Installed { version: String },
    /// Cycle failed
    Failed { error: String },
}

impl Default for LastOutcome {
    fn default() -> Self {
        Self::Pending
    }
}

/// Daemon scheduler state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonUpdateState {
    pub mode: UpdateMode,
    /// Seconds between automatic checks
    pub interval_secs: u64,
    /// Last check timestamp (epoch seconds)
    pub last_check_epoch: Option<u64>,
    pub last_outcome: LastOutcome,
    /// Version the host currently runs
    pub installed_version: String,
    /// State file schema version
    pub version: u32,
}

impl Default for DaemonUpdateState {
    fn default() -> Self {
        Self {
            mode: UpdateMode::default(),
            interval_secs: 600,
            last_check_epoch: None,
            last_outcome: LastOutcome::default(),
            installed_version: "1.0".to_string(),
            version: 1,
        }
    }
}

fn now_epoch() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

impl DaemonUpdateState {
    pub fn load() -> Self {
        Self::load_from(Path::new(UPDATE_STATE_PATH))
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(Path::new(UPDATE_STATE_PATH))
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
    }

    /// Record a completed cycle's outcome and stamp the check time.
    pub fn record_check(&mut self, outcome: LastOutcome) {
        self.last_check_epoch = Some(now_epoch());
        if let LastOutcome::Installed { version } = &outcome {
            self.installed_version = version.clone();
        }
        self.last_outcome = outcome;
    }

    /// Whether an automatic check is due now.
    pub fn is_check_due(&self) -> bool {
        if self.mode != UpdateMode::Auto {
            return false;
        }
        match self.last_check_epoch {
            Some(last) => now_epoch() >= last + self.interval_secs,
            None => true,
        }
    }

    pub fn format_last_check(&self) -> String {
        match self.last_check_epoch {
            Some(epoch) => {
                let age = now_epoch().saturating_sub(epoch);
                format!("{} ago", format_duration(age))
            }
            None => "never".to_string(),
        }
    }

    pub fn format_outcome(&self) -> String {
        match &self.last_outcome {
            LastOutcome::Pending => "pending".to_string(),
            LastOutcome::NoUpdate => "up to date".to_string(),
            LastOutcome::Installed { version } => format!("installed {version}"),
            LastOutcome::Failed { error } => format!("failed: {error}"),
        }
    }

    pub fn format_mode(&self) -> &'static str {
        match self.mode {
            UpdateMode::Auto => "auto",
            UpdateMode::Manual => "manual",
            UpdateMode::Disabled => "disabled",
        }
    }
}

/// Human-readable duration
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = DaemonUpdateState::default();
        assert_eq!(state.mode, UpdateMode::Auto);
        assert_eq!(state.interval_secs, 600);
        assert!(state.last_check_epoch.is_none());
        assert_eq!(state.last_outcome, LastOutcome::Pending);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update_state.json");

        let mut state = DaemonUpdateState::default();
        state.record_check(LastOutcome::Installed {
            version: "1.2".to_string(),
        });
        state.save_to(&path).unwrap();

        let loaded = DaemonUpdateState::load_from(&path);
        assert_eq!(loaded.installed_version, "1.2");
        assert!(matches!(loaded.last_outcome, LastOutcome::Installed { .. }));
        assert!(loaded.last_check_epoch.is_some());
    }

    #[test]
    fn test_check_due() {
        let mut state = DaemonUpdateState::default();
        assert!(state.is_check_due());

        state.record_check(LastOutcome::NoUpdate);
        assert!(!state.is_check_due());

        state.mode = UpdateMode::Manual;
        state.last_check_epoch = None;
        assert!(!state.is_check_due());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(120), "2m");
        assert_eq!(format_duration(7200), "2h");
        assert_eq!(format_duration(172800), "2d");
    }

    #[test]
    fn test_corrupt_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update_state.json");
        std::fs::write(&path, "not json").unwrap();

        let state = DaemonUpdateState::load_from(&path);
        assert_eq!(state.mode, UpdateMode::Auto);
    }
}
