//! Error taxonomy for the update pipeline.
//!
//! Every classified failure the orchestrator can surface lives here.
//! Transient conditions (a single failed poll) are absorbed where they
//! occur and never become an `UpdateError`.

use thiserror::Error;

/// Classified errors surfaced by the update pipeline
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("malformed version identifier: {0}")]
    MalformedVersion(String),

    #[error("invalid download source: {0}")]
    InvalidSource(String),

    #[error("transfer service unavailable: {0}")]
    TransferUnavailable(String),

    #[error("invalid update artifact: {0}")]
    InvalidArtifact(String),

    #[error("failed to launch install surface: {0}")]
    InstallLaunchFailed(String),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("artifact checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the update pipeline
pub type Result<T> = std::result::Result<T, UpdateError>;

impl UpdateError {
    pub fn malformed_version<S: Into<String>>(msg: S) -> Self {
        UpdateError::MalformedVersion(msg.into())
    }

    pub fn invalid_source<S: Into<String>>(msg: S) -> Self {
        UpdateError::InvalidSource(msg.into())
    }

    pub fn transfer_unavailable<S: Into<String>>(msg: S) -> Self {
        UpdateError::TransferUnavailable(msg.into())
    }

    pub fn invalid_artifact<S: Into<String>>(msg: S) -> Self {
        UpdateError::InvalidArtifact(msg.into())
    }

    /// True when the caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpdateError::TransferUnavailable(_)
                | UpdateError::NetworkUnavailable(_)
                | UpdateError::Timeout(_)
        )
    }
}
