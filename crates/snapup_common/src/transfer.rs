//! Transfer service abstraction.
//!
//! The OS-level transfer engine is an opaque collaborator: updates are
//! enqueued, correlated by an opaque handle, and observed through a
//! poll-able snapshot plus a completion broadcast. Production code uses
//! `HttpTransferEngine` in snapupd; tests use `FakeTransferService`
//! with scripted snapshots.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{Result, UpdateError};

/// Opaque identifier correlating all observations of one transfer.
///
/// Exactly one handle is relevant per acquisition attempt; statuses for
/// any other handle are ignored by identity comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadHandle(pub u64);

impl fmt::Display for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Observed state of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Progress(u8),
    Success,
    Failed(String),
    Paused,
}

impl TransferStatus {
    /// Success and Failed are terminal: no further statuses for the
    /// handle are meaningful once one has been observed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Success | TransferStatus::Failed(_))
    }
}

/// One synchronous status-table snapshot for a transfer
#[derive(Debug, Clone)]
pub struct TransferSnapshot {
    pub status: TransferStatus,
    pub bytes_downloaded: u64,
    pub bytes_total: u64,
    pub local_path: Option<PathBuf>,
}

impl TransferSnapshot {
    pub fn pending() -> Self {
        Self {
            status: TransferStatus::Pending,
            bytes_downloaded: 0,
            bytes_total: 0,
            local_path: None,
        }
    }

    pub fn progress(bytes_downloaded: u64, bytes_total: u64) -> Self {
        let mut snap = Self {
            status: TransferStatus::Pending,
            bytes_downloaded,
            bytes_total,
            local_path: None,
        };
        snap.status = TransferStatus::Progress(snap.percentage());
        snap
    }

    pub fn success(local_path: PathBuf, bytes_total: u64) -> Self {
        Self {
            status: TransferStatus::Success,
            bytes_downloaded: bytes_total,
            bytes_total,
            local_path: Some(local_path),
        }
    }

    pub fn failed<S: Into<String>>(reason: S) -> Self {
        Self {
            status: TransferStatus::Failed(reason.into()),
            bytes_downloaded: 0,
            bytes_total: 0,
            local_path: None,
        }
    }

    /// Completed percentage; 0 while the total size is still unknown.
    pub fn percentage(&self) -> u8 {
        if self.bytes_total > 0 {
            ((self.bytes_downloaded * 100 / self.bytes_total).min(100)) as u8
        } else {
            0
        }
    }
}

/// Fails fast with `InvalidSource` unless the URL scheme is HTTP/HTTPS.
pub fn ensure_http_source(url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(UpdateError::invalid_source(url))
    }
}

/// The opaque transfer queue the updater drives.
///
/// Enqueue/query failures other than a bad source surface as
/// `TransferUnavailable` and are retryable by the caller.
#[async_trait]
pub trait TransferService: Send + Sync {
    /// Enqueue a download; returns the handle correlating all later
    /// observations.
    async fn enqueue(&self, url: &str, destination_name: &str) -> Result<DownloadHandle>;

    /// One synchronous snapshot of the transfer's status row.
    async fn query(&self, handle: DownloadHandle) -> Result<TransferSnapshot>;

    /// Local path of the completed payload; only meaningful after the
    /// transfer reported Success.
    async fn local_path(&self, handle: DownloadHandle) -> Option<PathBuf>;

    /// Completion push channel: one event per transfer reaching a
    /// terminal state. Subscribe before enqueueing to avoid a gap.
    fn completions(&self) -> broadcast::Receiver<DownloadHandle>;
}

// ============================================================================
// Fake Transfer Service (deterministic tests)
// ============================================================================

/// Scripted transfer service for deterministic tests.
///
/// Each enqueued transfer replays a staged sequence of snapshots, one
/// per `query`; the final snapshot repeats forever (so a script of one
/// `pending()` models a transfer that never finishes). Completion
/// broadcasts are fired explicitly by the test.
pub struct FakeTransferService {
    next_handle: AtomicU64,
    scripts: Mutex<HashMap<DownloadHandle, VecDeque<TransferSnapshot>>>,
    staged: Mutex<VecDeque<Vec<TransferSnapshot>>>,
    enqueued: Mutex<Vec<(String, String)>>,
    events: broadcast::Sender<DownloadHandle>,
}

impl FakeTransferService {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            next_handle: AtomicU64::new(1),
            scripts: Mutex::new(HashMap::new()),
            staged: Mutex::new(VecDeque::new()),
            enqueued: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Stage the snapshot script for the next enqueued transfer.
    pub fn stage(&self, snapshots: Vec<TransferSnapshot>) {
        assert!(!snapshots.is_empty(), "script must hold at least one snapshot");
        self.staged.lock().unwrap().push_back(snapshots);
    }

    /// Replace the remaining script of an existing transfer.
    pub fn set_script(&self, handle: DownloadHandle, snapshots: Vec<TransferSnapshot>) {
        assert!(!snapshots.is_empty(), "script must hold at least one snapshot");
        self.scripts
            .lock()
            .unwrap()
            .insert(handle, snapshots.into());
    }

    /// Fire the completion broadcast for a handle.
    pub fn signal_complete(&self, handle: DownloadHandle) {
        let _ = self.events.send(handle);
    }

    /// (url, destination_name) pairs seen by enqueue, in order.
    pub fn enqueued(&self) -> Vec<(String, String)> {
        self.enqueued.lock().unwrap().clone()
    }
}

impl Default for FakeTransferService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferService for FakeTransferService {
    async fn enqueue(&self, url: &str, destination_name: &str) -> Result<DownloadHandle> {
        ensure_http_source(url)?;

        let handle = DownloadHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let script = self
            .staged
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![TransferSnapshot::pending()]);
        self.scripts.lock().unwrap().insert(handle, script.into());
        self.enqueued
            .lock()
            .unwrap()
            .push((url.to_string(), destination_name.to_string()));
        Ok(handle)
    }

    async fn query(&self, handle: DownloadHandle) -> Result<TransferSnapshot> {
        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts
            .get_mut(&handle)
            .ok_or_else(|| UpdateError::transfer_unavailable(format!("unknown handle {handle}")))?;

        // Pop until the last snapshot, which then repeats.
        let snap = if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap()
        };
        Ok(snap)
    }

    async fn local_path(&self, handle: DownloadHandle) -> Option<PathBuf> {
        let scripts = self.scripts.lock().unwrap();
        scripts
            .get(&handle)
            .and_then(|script| script.back())
            .and_then(|snap| snap.local_path.clone())
    }

    fn completions(&self) -> broadcast::Receiver<DownloadHandle> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        assert_eq!(TransferSnapshot::progress(0, 100).percentage(), 0);
        assert_eq!(TransferSnapshot::progress(55, 100).percentage(), 55);
        assert_eq!(TransferSnapshot::progress(1, 3).percentage(), 33);
        assert_eq!(TransferSnapshot::progress(100, 100).percentage(), 100);
        // Unknown total reads as zero, not a division failure
        assert_eq!(TransferSnapshot::progress(1024, 0).percentage(), 0);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TransferStatus::Success.is_terminal());
        assert!(TransferStatus::Failed("x".into()).is_terminal());
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(!TransferStatus::Progress(99).is_terminal());
        assert!(!TransferStatus::Paused.is_terminal());
    }

    #[test]
    fn test_source_scheme_check() {
        assert!(ensure_http_source("https://example.com/a.apk").is_ok());
        assert!(ensure_http_source("http://example.com/a.apk").is_ok());
        assert!(matches!(
            ensure_http_source("ftp://example.com/a.apk"),
            Err(UpdateError::InvalidSource(_))
        ));
        assert!(ensure_http_source("file:///tmp/a.apk").is_err());
    }

    #[tokio::test]
    async fn test_fake_replays_script_and_repeats_tail() {
        let fake = FakeTransferService::new();
        fake.stage(vec![
            TransferSnapshot::pending(),
            TransferSnapshot::progress(50, 100),
            TransferSnapshot::success(PathBuf::from("/tmp/a.apk"), 100),
        ]);

        let handle = fake.enqueue("http://host/a.apk", "a.apk").await.unwrap();
        assert_eq!(fake.query(handle).await.unwrap().status, TransferStatus::Pending);
        assert_eq!(
            fake.query(handle).await.unwrap().status,
            TransferStatus::Progress(50)
        );
        assert_eq!(fake.query(handle).await.unwrap().status, TransferStatus::Success);
        // Tail repeats
        assert_eq!(fake.query(handle).await.unwrap().status, TransferStatus::Success);
        assert_eq!(
            fake.local_path(handle).await,
            Some(PathBuf::from("/tmp/a.apk"))
        );
    }

    #[tokio::test]
    async fn test_fake_rejects_bad_scheme_and_unknown_handle() {
        let fake = FakeTransferService::new();
        assert!(fake.enqueue("ftp://host/a.apk", "a.apk").await.is_err());
        assert!(matches!(
            fake.query(DownloadHandle(999)).await,
            Err(UpdateError::TransferUnavailable(_))
        ));
    }
}
