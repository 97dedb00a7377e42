//! Redundant download monitor.
//!
//! The transfer service exposes two non-atomic ways to observe one
//! transfer: a completion broadcast that can be missed, and a status
//! table that can only be polled. The monitor runs both concurrently
//! and merges them into a single status sequence, so a lost broadcast
//! costs at most one poll interval and a slow poll never delays a
//! delivered broadcast.
//!
//! The consumer must treat terminal statuses as first-wins: both
//! channels race to report the same completion, and duplicates are
//! expected.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::transfer::{DownloadHandle, TransferService, TransferStatus};

/// Cadence and wall-clock budget for one monitor instance.
///
/// The budget bounds the poller by elapsed time, not iteration count:
/// a slower interval still gives up at the same deadline.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub budget: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            budget: Duration::from_secs(600),
        }
    }
}

/// Merged status sequence for one transfer handle.
///
/// Receiving ends when the poller has given up and the stream is
/// drained, or immediately after `shutdown`. The listener task is
/// deliberately kept alive past logical completion; only `shutdown`
/// (invoked on orchestrator disposal) deregisters it.
pub struct MonitorStream {
    rx: mpsc::Receiver<TransferStatus>,
    listener: JoinHandle<()>,
    poller: JoinHandle<()>,
}

impl MonitorStream {
    /// Next merged status. `None` once both producers are gone and the
    /// channel has drained.
    pub async fn recv(&mut self) -> Option<TransferStatus> {
        self.rx.recv().await
    }

    /// Tear down both producer tasks. Explicit and idempotent; called
    /// when the owning orchestrator is disposed.
    pub fn shutdown(&self) {
        self.listener.abort();
        self.poller.abort();
    }
}

/// Spawns the two observation tasks for one handle.
pub struct TransferMonitor;

impl TransferMonitor {
    pub fn spawn(
        service: Arc<dyn TransferService>,
        handle: DownloadHandle,
        config: MonitorConfig,
    ) -> MonitorStream {
        let (tx, rx) = mpsc::channel(64);

        // Subscribe before spawning so a completion delivered between
        // enqueue and task startup is not lost.
        let events = service.completions();

        let listener = tokio::spawn(listen_for_completion(
            Arc::clone(&service),
            handle,
            events,
            tx.clone(),
        ));
        let poller = tokio::spawn(poll_status(service, handle, config, tx));

        MonitorStream { rx, listener, poller }
    }
}

/// Event channel: wait for the service's completion signal, filtered to
/// this handle, and emit one queried status per signal.
///
/// Errors on this path are not retried here; the poller provides the
/// retry coverage. The loop survives logical completion on purpose: it
/// only ends when the output channel closes or the task is aborted.
async fn listen_for_completion(
    service: Arc<dyn TransferService>,
    handle: DownloadHandle,
    mut events: broadcast::Receiver<DownloadHandle>,
    tx: mpsc::Sender<TransferStatus>,
) {
    loop {
        match events.recv().await {
            Ok(completed) if completed == handle => {
                debug!("📡 Completion signal for transfer {handle}");
                match service.query(handle).await {
                    Ok(snap) => {
                        if tx.send(snap.status).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Query after completion signal failed for {handle}: {e}");
                    }
                }
            }
            // Signals for other handles are someone else's transfer.
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("Completion listener for {handle} lagged, {missed} signals dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Poll channel: query the status table on a fixed cadence until a
/// terminal status is observed or the wall-clock budget runs out, in
/// which case a synthetic timeout failure is emitted.
async fn poll_status(
    service: Arc<dyn TransferService>,
    handle: DownloadHandle,
    config: MonitorConfig,
    tx: mpsc::Sender<TransferStatus>,
) {
    let deadline = Instant::now() + config.budget;
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if Instant::now() >= deadline {
            warn!("⏰ Transfer {handle} exhausted its {:?} budget", config.budget);
            let _ = tx.send(TransferStatus::Failed("timeout".to_string())).await;
            break;
        }

        match service.query(handle).await {
            Ok(snap) => {
                let terminal = snap.status.is_terminal();
                if tx.send(snap.status).await.is_err() {
                    break;
                }
                if terminal {
                    debug!("Poller for {handle} observed a terminal status, stopping");
                    break;
                }
            }
            Err(e) => {
                // Transient miss: the table may briefly not know the
                // handle. The budget, not the error, ends the loop.
                debug!("Poll of {handle} failed, continuing: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{FakeTransferService, TransferSnapshot};
    use std::path::PathBuf;

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_millis(10),
            budget: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_poller_delivers_progress_then_success() {
        let service = Arc::new(FakeTransferService::new());
        service.stage(vec![
            TransferSnapshot::progress(10, 100),
            TransferSnapshot::progress(55, 100),
            TransferSnapshot::success(PathBuf::from("/tmp/pkg.apk"), 100),
        ]);
        let handle = service.enqueue("http://host/pkg.apk", "pkg.apk").await.unwrap();

        let mut stream = TransferMonitor::spawn(service.clone(), handle, fast_config());

        let mut seen = Vec::new();
        while let Some(status) = stream.recv().await {
            let terminal = status.is_terminal();
            seen.push(status);
            if terminal {
                break;
            }
        }

        assert_eq!(
            seen,
            vec![
                TransferStatus::Progress(10),
                TransferStatus::Progress(55),
                TransferStatus::Success,
            ]
        );
        stream.shutdown();
    }

    #[tokio::test]
    async fn test_budget_exhaustion_emits_synthetic_timeout() {
        let service = Arc::new(FakeTransferService::new());
        // A transfer that never leaves Pending.
        service.stage(vec![TransferSnapshot::pending()]);
        let handle = service.enqueue("http://host/pkg.apk", "pkg.apk").await.unwrap();

        let mut stream = TransferMonitor::spawn(service.clone(), handle, fast_config());

        let mut last = None;
        while let Some(status) = stream.recv().await {
            let terminal = status.is_terminal();
            last = Some(status);
            if terminal {
                break;
            }
        }

        assert_eq!(last, Some(TransferStatus::Failed("timeout".to_string())));
        stream.shutdown();
    }

    #[tokio::test]
    async fn test_completion_signal_triggers_query() {
        let service = Arc::new(FakeTransferService::new());
        // One immediate poll sees Pending; after that the poller sleeps
        // for an hour, so only the listener can deliver the Success.
        service.stage(vec![
            TransferSnapshot::pending(),
            TransferSnapshot::success(PathBuf::from("/tmp/pkg.apk"), 2048),
        ]);
        let handle = service.enqueue("http://host/pkg.apk", "pkg.apk").await.unwrap();

        let config = MonitorConfig {
            poll_interval: Duration::from_secs(3600),
            budget: Duration::from_secs(7200),
        };
        let mut stream = TransferMonitor::spawn(service.clone(), handle, config);

        assert_eq!(stream.recv().await, Some(TransferStatus::Pending));

        service.signal_complete(handle);

        let status = tokio::time::timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("listener should deliver while the poller sleeps");
        assert_eq!(status, Some(TransferStatus::Success));
        stream.shutdown();
    }

    #[tokio::test]
    async fn test_foreign_handle_signals_are_ignored() {
        let service = Arc::new(FakeTransferService::new());
        service.stage(vec![TransferSnapshot::pending()]);
        let handle = service.enqueue("http://host/pkg.apk", "pkg.apk").await.unwrap();

        let config = MonitorConfig {
            poll_interval: Duration::from_secs(3600),
            budget: Duration::from_secs(7200),
        };
        let mut stream = TransferMonitor::spawn(service.clone(), handle, config);

        // Drain the immediate first poll.
        assert_eq!(stream.recv().await, Some(TransferStatus::Pending));

        // A completion for some other transfer must produce nothing.
        service.signal_complete(DownloadHandle(4242));

        let nothing = tokio::time::timeout(Duration::from_millis(100), stream.recv()).await;
        assert!(nothing.is_err(), "foreign completion must not emit a status");
        stream.shutdown();
    }

    #[tokio::test]
    async fn test_both_channels_emit_duplicate_terminal() {
        let service = Arc::new(FakeTransferService::new());
        service.stage(vec![TransferSnapshot::success(
            PathBuf::from("/tmp/pkg.apk"),
            2048,
        )]);
        let handle = service.enqueue("http://host/pkg.apk", "pkg.apk").await.unwrap();

        let mut stream = TransferMonitor::spawn(service.clone(), handle, fast_config());
        service.signal_complete(handle);

        // Both the poller and the listener report Success; the merge
        // delivers both and leaves de-duplication to the consumer.
        let mut successes = 0;
        while successes < 2 {
            match tokio::time::timeout(Duration::from_secs(1), stream.recv()).await {
                Ok(Some(TransferStatus::Success)) => successes += 1,
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert_eq!(successes, 2);
        stream.shutdown();
    }
}
