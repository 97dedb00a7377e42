//! User-visible update events.
//!
//! The installer and orchestrator report noteworthy moments through an
//! injected sink instead of talking to a notification surface directly,
//! so tests can assert on emitted events and the daemon can route them
//! to desktop notifications.

use std::sync::Mutex;

/// Something the user may want to hear about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// A newer version was found on the server
    UpdateAvailable { version: String },
    /// Installation of an artifact is about to be launched
    InstallStarting { file_name: String },
    /// The platform install surface was handed the artifact
    InstallLaunched { file_name: String },
    /// Installation could not be launched
    InstallFailed { file_name: String, reason: String },
    /// An update cycle ended in a classified failure
    CycleFailed { reason: String },
}

/// Observer for update events. Emission is fire-and-forget; sinks must
/// not block.
pub trait UpdateEventSink: Send + Sync {
    fn emit(&self, event: UpdateEvent);
}

/// Sink that drops everything. Default for embedders without a
/// notification surface.
pub struct NullEventSink;

impl UpdateEventSink for NullEventSink {
    fn emit(&self, _event: UpdateEvent) {}
}

/// Sink that records events for test assertions.
pub struct RecordingEventSink {
    events: Mutex<Vec<UpdateEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<UpdateEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_of(&self, pred: impl Fn(&UpdateEvent) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }
}

impl Default for RecordingEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateEventSink for RecordingEventSink {
    fn emit(&self, event: UpdateEvent) {
        self.events.lock().unwrap().push(event);
    }
}
