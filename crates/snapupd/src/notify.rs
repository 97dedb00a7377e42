//! Desktop notification sink.
//!
//! Routes update events to the user via notify-send when a desktop
//! environment is available; otherwise events are logged and dropped.

use std::process::Command;

use tracing::{debug, warn};

use snapup_common::{UpdateEvent, UpdateEventSink};

pub struct DesktopNotifier {
    has_notify_send: bool,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        let has_notify_send = Command::new("which")
            .arg("notify-send")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !has_notify_send {
            debug!("notify-send not available; update notifications stay in the log");
        }
        Self { has_notify_send }
    }

    fn render(event: &UpdateEvent) -> (String, String, &'static str) {
        match event {
            UpdateEvent::UpdateAvailable { version } => (
                "Update Available".to_string(),
                format!("Version {version} is ready to download"),
                "normal",
            ),
            UpdateEvent::InstallStarting { file_name } => (
                "Starting installation".to_string(),
                format!("Installing {file_name}"),
                "low",
            ),
            UpdateEvent::InstallLaunched { file_name } => (
                "Installation started".to_string(),
                format!("Please confirm {file_name} in the installer"),
                "low",
            ),
            UpdateEvent::InstallFailed { file_name, reason } => (
                "Installation failed".to_string(),
                format!("{file_name}: {reason}"),
                "critical",
            ),
            UpdateEvent::CycleFailed { reason } => (
                "Update failed".to_string(),
                reason.clone(),
                "critical",
            ),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateEventSink for DesktopNotifier {
    fn emit(&self, event: UpdateEvent) {
        let (title, message, urgency) = Self::render(&event);

        if !self.has_notify_send {
            debug!("🔔 {title}: {message}");
            return;
        }

        let result = Command::new("notify-send")
            .arg("--app-name=SnapUp")
            .arg("--icon=system-software-update")
            .arg("--urgency")
            .arg(urgency)
            .arg(&title)
            .arg(&message)
            .spawn();

        if let Err(e) = result {
            warn!("Failed to send notification: {e}");
        }
    }
}
