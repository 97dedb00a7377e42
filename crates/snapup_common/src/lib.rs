//! Shared library for the SnapUp self-update suite.
//!
//! Holds the full update pipeline: version comparison, transfer service
//! abstraction, the redundant download monitor, artifact validation,
//! the install trigger, and the cycle orchestrator. The snapupd daemon
//! and snapctl CLI are thin hosts around these pieces.

pub mod api;
pub mod artifact;
pub mod config;
pub mod error;
pub mod events;
pub mod installer;
pub mod monitor;
pub mod orchestrator;
pub mod transfer;
pub mod update_state;
pub mod version;

pub use api::{
    FakeMetadataClient, HttpMetadataClient, MetadataClient, ServerVersionInfo, UpdateInfo,
    UpdateResponse, VersionIncrementRequest, VersionIncrementResponse, VersionResetRequest,
    VersionResetResponse,
};
pub use artifact::{
    artifact_file_name, find_cached, sha256_file, Artifact, ArtifactPolicy, MIN_ARTIFACT_BYTES,
};
pub use config::UpdateConfig;
pub use error::{Result, UpdateError};
pub use events::{NullEventSink, RecordingEventSink, UpdateEvent, UpdateEventSink};
pub use installer::{FakeInstallSurface, InstallSurface, Installer};
pub use monitor::{MonitorConfig, MonitorStream, TransferMonitor};
pub use orchestrator::{CycleOutcome, CyclePhase, UpdateCycleState, UpdateOrchestrator};
pub use transfer::{
    ensure_http_source, DownloadHandle, FakeTransferService, TransferService, TransferSnapshot,
    TransferStatus,
};
pub use update_state::{DaemonUpdateState, LastOutcome, UpdateMode};
pub use version::{needs_update, needs_update_str, VersionId};
