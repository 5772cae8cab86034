use std::collections::HashMap;
use std::sync::Arc;

use ftransport_domain::{
    CurrentFile, FileDetail, ProgressSnapshot, TransferStatus,
};
use ftransport_storage::{FileRow, FtransportStorage, TransferPatch, TransferRow};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tracing::debug;

/// Per-transfer subscriber map. At most one live channel per transfer id;
/// subscribing again supersedes the previous channel. Sends are best-effort
/// and a closed receiver just evicts the entry.
#[derive(Default)]
pub struct ProgressBroker {
    subscribers: RwLock<HashMap<String, UnboundedSender<ProgressSnapshot>>>,
}

impl ProgressBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, transfer_id: &str) -> UnboundedReceiver<ProgressSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.write().await;
        if subscribers.insert(transfer_id.to_string(), tx).is_some() {
            debug!(transfer_id = %transfer_id, "superseding existing progress subscriber");
        }
        rx
    }

    pub async fn send(&self, transfer_id: &str, snapshot: ProgressSnapshot) {
        let stale = {
            let subscribers = self.subscribers.read().await;
            match subscribers.get(transfer_id) {
                Some(tx) => tx.send(snapshot).is_err(),
                None => false,
            }
        };
        if stale {
            self.subscribers.write().await.remove(transfer_id);
        }
    }
}

/// Persists transfer state changes and broadcasts the resulting snapshot.
#[derive(Clone)]
pub struct ProgressSink {
    storage: FtransportStorage,
    broker: Arc<ProgressBroker>,
}

impl ProgressSink {
    pub fn new(storage: FtransportStorage, broker: Arc<ProgressBroker>) -> Self {
        Self { storage, broker }
    }

    pub fn broker(&self) -> &Arc<ProgressBroker> {
        &self.broker
    }

    /// Apply `patch` under `status`, then broadcast the persisted state.
    /// Timestamp derivation (`started_at`, terminal guard) lives in the
    /// storage layer.
    pub async fn report(
        &self,
        transfer_id: &str,
        status: TransferStatus,
        stage: Option<&str>,
        patch: TransferPatch,
    ) -> anyhow::Result<()> {
        self.storage
            .apply_transfer_patch(transfer_id, status.as_str(), &patch)
            .await?;
        self.broadcast(transfer_id, stage).await
    }

    /// Broadcast the current persisted snapshot without mutating it.
    pub async fn broadcast(&self, transfer_id: &str, stage: Option<&str>) -> anyhow::Result<()> {
        let Some(row) = self.storage.get_transfer(transfer_id).await? else {
            return Ok(());
        };
        let files = self.storage.transfer_files(transfer_id).await?;
        let snapshot = snapshot_of(&row, &files, stage);
        self.broker.send(transfer_id, snapshot).await;
        Ok(())
    }
}

pub fn snapshot_of(row: &TransferRow, files: &[FileRow], stage: Option<&str>) -> ProgressSnapshot {
    let status = TransferStatus::parse(&row.status).unwrap_or(TransferStatus::Pending);
    ProgressSnapshot {
        transfer_id: row.transfer_id.clone(),
        status,
        stage: stage.unwrap_or(status.as_str()).to_string(),
        overall_progress: row.overall_progress,
        files_completed: row.files_completed,
        total_files: row.total_files,
        current_file: row.current_file_name.as_ref().map(|name| CurrentFile {
            name: name.clone(),
            progress: row.current_file_progress,
        }),
        file_details: files
            .iter()
            .map(|f| FileDetail {
                name: f.file_name.clone(),
                status: f.status.clone(),
                size: f.file_size,
                bytes_transferred: f.bytes_transferred,
            })
            .collect(),
        error_message: row.error_message.clone(),
    }
}
