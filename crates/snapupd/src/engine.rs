//! HTTP transfer engine.
//!
//! Production implementation of the transfer service: downloads run as
//! background tasks streaming into the download directory, observable
//! through a status table keyed by handle and a completion broadcast.
//! Payloads land under a `.part` name and are renamed into place only
//! when complete, so a half-written file can never look like a cached
//! artifact.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use snapup_common::{
    ensure_http_source, DownloadHandle, Result, TransferService, TransferSnapshot, TransferStatus,
    UpdateError,
};

const USER_AGENT: &str = concat!("snapupd/", env!("CARGO_PKG_VERSION"));

/// One row of the status table
#[derive(Debug, Clone)]
struct TransferRow {
    status: TransferStatus,
    bytes_downloaded: u64,
    bytes_total: u64,
    local_path: Option<PathBuf>,
}

impl TransferRow {
    fn pending() -> Self {
        Self {
            status: TransferStatus::Pending,
            bytes_downloaded: 0,
            bytes_total: 0,
            local_path: None,
        }
    }
}

pub struct HttpTransferEngine {
    client: reqwest::Client,
    download_dir: PathBuf,
    next_handle: AtomicU64,
    table: Arc<RwLock<HashMap<DownloadHandle, TransferRow>>>,
    completions: broadcast::Sender<DownloadHandle>,
}

impl HttpTransferEngine {
    pub fn new(download_dir: PathBuf) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| UpdateError::transfer_unavailable(e.to_string()))?;
        let (completions, _) = broadcast::channel(32);
        Ok(Self {
            client,
            download_dir,
            next_handle: AtomicU64::new(1),
            table: Arc::new(RwLock::new(HashMap::new())),
            completions,
        })
    }

    /// Streams one transfer to disk, keeping its table row current.
    async fn run_transfer(
        client: reqwest::Client,
        url: String,
        dest: PathBuf,
        handle: DownloadHandle,
        table: Arc<RwLock<HashMap<DownloadHandle, TransferRow>>>,
        completions: broadcast::Sender<DownloadHandle>,
    ) {
        let outcome = Self::stream_to_disk(&client, &url, &dest, handle, &table).await;

        {
            let mut table = table.write().await;
            if let Some(row) = table.get_mut(&handle) {
                match outcome {
                    Ok(bytes) => {
                        row.status = TransferStatus::Success;
                        row.bytes_downloaded = bytes;
                        if row.bytes_total == 0 {
                            row.bytes_total = bytes;
                        }
                        row.local_path = Some(dest.clone());
                        info!("🎉 Transfer {handle} completed ({bytes} bytes)");
                    }
                    Err(ref reason) => {
                        row.status = TransferStatus::Failed(reason.clone());
                        warn!("❌ Transfer {handle} failed: {reason}");
                    }
                }
            }
        }

        // Terminal either way; tell anyone listening.
        let _ = completions.send(handle);
    }

    async fn stream_to_disk(
        client: &reqwest::Client,
        url: &str,
        dest: &PathBuf,
        handle: DownloadHandle,
        table: &Arc<RwLock<HashMap<DownloadHandle, TransferRow>>>,
    ) -> std::result::Result<u64, String> {
        let mut resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if !resp.status().is_success() {
            return Err(format!("server returned {}", resp.status()));
        }

        let total = resp.content_length().unwrap_or(0);
        {
            let mut table = table.write().await;
            if let Some(row) = table.get_mut(&handle) {
                row.bytes_total = total;
                row.status = TransferStatus::Progress(0);
            }
        }

        let part = dest.with_extension(match dest.extension() {
            Some(ext) => format!("{}.part", ext.to_string_lossy()),
            None => "part".to_string(),
        });
        let mut file = tokio::fs::File::create(&part)
            .await
            .map_err(|e| format!("cannot create {}: {e}", part.display()))?;

        let mut downloaded: u64 = 0;
        while let Some(chunk) = resp.chunk().await.map_err(|e| format!("read failed: {e}"))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("write failed: {e}"))?;
            downloaded += chunk.len() as u64;

            let mut table = table.write().await;
            if let Some(row) = table.get_mut(&handle) {
                row.bytes_downloaded = downloaded;
                let pct = if row.bytes_total > 0 {
                    ((downloaded * 100 / row.bytes_total).min(100)) as u8
                } else {
                    0
                };
                row.status = TransferStatus::Progress(pct);
            }
        }

        file.flush().await.map_err(|e| format!("flush failed: {e}"))?;
        drop(file);

        // Only a complete payload gets the real name.
        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| format!("rename failed: {e}"))?;

        Ok(downloaded)
    }
}

#[async_trait]
impl TransferService for HttpTransferEngine {
    async fn enqueue(&self, url: &str, destination_name: &str) -> Result<DownloadHandle> {
        ensure_http_source(url)?;

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| UpdateError::transfer_unavailable(e.to_string()))?;

        let handle = DownloadHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let dest = self.download_dir.join(destination_name);

        self.table.write().await.insert(handle, TransferRow::pending());
        info!("🚀 Transfer {handle} enqueued: {url} -> {}", dest.display());

        tokio::spawn(Self::run_transfer(
            self.client.clone(),
            url.to_string(),
            dest,
            handle,
            Arc::clone(&self.table),
            self.completions.clone(),
        ));

        Ok(handle)
    }

    async fn query(&self, handle: DownloadHandle) -> Result<TransferSnapshot> {
        let table = self.table.read().await;
        let row = table
            .get(&handle)
            .ok_or_else(|| UpdateError::transfer_unavailable(format!("unknown handle {handle}")))?;
        debug!("Query {handle}: {:?}", row.status);
        Ok(TransferSnapshot {
            status: row.status.clone(),
            bytes_downloaded: row.bytes_downloaded,
            bytes_total: row.bytes_total,
            local_path: row.local_path.clone(),
        })
    }

    async fn local_path(&self, handle: DownloadHandle) -> Option<PathBuf> {
        let table = self.table.read().await;
        table.get(&handle).and_then(|row| {
            if row.status == TransferStatus::Success {
                row.local_path.clone()
            } else {
                None
            }
        })
    }

    fn completions(&self) -> broadcast::Receiver<DownloadHandle> {
        self.completions.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_rejects_bad_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let engine = HttpTransferEngine::new(dir.path().to_path_buf()).unwrap();

        let err = engine
            .enqueue("ftp://host/pkg.apk", "pkg.apk")
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::InvalidSource(_)));
    }

    #[tokio::test]
    async fn test_query_unknown_handle_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let engine = HttpTransferEngine::new(dir.path().to_path_buf()).unwrap();

        let err = engine.query(DownloadHandle(77)).await.unwrap_err();
        assert!(matches!(err, UpdateError::TransferUnavailable(_)));
    }

    #[tokio::test]
    async fn test_failed_transfer_reaches_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let engine = HttpTransferEngine::new(dir.path().to_path_buf()).unwrap();
        let mut completions = engine.completions();

        // Nothing listens on this port; the transfer fails fast.
        let handle = engine
            .enqueue("http://127.0.0.1:1/pkg.apk", "pkg.apk")
            .await
            .unwrap();

        let done = tokio::time::timeout(Duration::from_secs(60), completions.recv())
            .await
            .expect("completion broadcast")
            .unwrap();
        assert_eq!(done, handle);

        let snap = engine.query(handle).await.unwrap();
        assert!(matches!(snap.status, TransferStatus::Failed(_)));
        assert!(engine.local_path(handle).await.is_none());
    }
}
