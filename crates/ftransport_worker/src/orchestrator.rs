use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use ftransport_domain::{
    classifier::detect_drive_type, ClassifyError, DriveType, FileDescriptor, FileStatus,
    TransferMode, TransferStatus,
};
use ftransport_providers::{DriveAdapter, ProgressFn, ProviderError, TargetAdapter, TargetError};
use ftransport_storage::{FtransportStorage, TransferPatch};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::progress::ProgressSink;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Whole-transfer deadline; exceeding it abandons the run and marks the
    /// transfer failed.
    pub timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1800),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error("scan failed: {0}")]
    Scan(ProviderError),
    #[error("failed to create staging folder: {0}")]
    StagingFolder(ProviderError),
    #[error("failed to list staging folder: {0}")]
    StagingList(ProviderError),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error("transfer cancelled")]
    Cancelled,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// One adapter per supported provider. The Google adapter doubles as the
/// staging backend.
#[derive(Clone)]
pub struct AdapterSet {
    pub google: Arc<dyn DriveAdapter>,
    pub dropbox: Arc<dyn DriveAdapter>,
    pub onedrive: Arc<dyn DriveAdapter>,
}

impl AdapterSet {
    pub fn for_drive(&self, drive_type: DriveType) -> Arc<dyn DriveAdapter> {
        match drive_type {
            DriveType::GoogleDrive => Arc::clone(&self.google),
            DriveType::Dropbox => Arc::clone(&self.dropbox),
            DriveType::Onedrive => Arc::clone(&self.onedrive),
        }
    }
}

/// Cancellation tokens for in-flight transfers, keyed by transfer id.
#[derive(Default)]
struct CancelRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancelRegistry {
    fn register(&self, transfer_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens
            .lock()
            .expect("cancellation registry lock poisoned")
            .insert(transfer_id.to_string(), token.clone());
        token
    }

    fn cancel(&self, transfer_id: &str) -> bool {
        match self
            .tokens
            .lock()
            .expect("cancellation registry lock poisoned")
            .get(transfer_id)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn remove(&self, transfer_id: &str) {
        self.tokens
            .lock()
            .expect("cancellation registry lock poisoned")
            .remove(transfer_id);
    }
}

/// Drives one transfer from PENDING through scan, staging/upload, and a
/// terminal state. One spawned task per transfer; the spawning request
/// never awaits it.
pub struct TransferWorker {
    storage: FtransportStorage,
    sink: ProgressSink,
    adapters: AdapterSet,
    target: Arc<dyn TargetAdapter>,
    cancels: CancelRegistry,
    config: WorkerConfig,
}

impl TransferWorker {
    pub fn new(
        storage: FtransportStorage,
        sink: ProgressSink,
        adapters: AdapterSet,
        target: Arc<dyn TargetAdapter>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            storage,
            sink,
            adapters,
            target,
            cancels: CancelRegistry::default(),
            config,
        }
    }

    pub fn sink(&self) -> &ProgressSink {
        &self.sink
    }

    /// Launch the orchestration task for a freshly created transfer. The
    /// cancellation token is registered before the task starts so a cancel
    /// request can never race the spawn.
    pub fn spawn(self: &Arc<Self>, transfer_id: &str, source_url: &str, mode: TransferMode) {
        let token = self.cancels.register(transfer_id);
        let worker = Arc::clone(self);
        let transfer_id = transfer_id.to_string();
        let source_url = source_url.to_string();
        tokio::spawn(async move {
            worker
                .drive_transfer(&transfer_id, &source_url, mode, token)
                .await;
        });
    }

    /// Request cooperative cancellation. Returns whether a live run was
    /// signalled; the transfer reaches CANCELLED at its next checkpoint.
    pub fn cancel(&self, transfer_id: &str) -> bool {
        self.cancels.cancel(transfer_id)
    }

    async fn drive_transfer(
        &self,
        transfer_id: &str,
        source_url: &str,
        mode: TransferMode,
        token: CancellationToken,
    ) {
        let outcome = tokio::time::timeout(
            self.config.timeout,
            self.run(transfer_id, source_url, mode, &token),
        )
        .await;

        match outcome {
            Err(_) => {
                let message = format!(
                    "transfer timed out after {} seconds",
                    self.config.timeout.as_secs()
                );
                error!(transfer_id = %transfer_id, "{message}");
                self.finish(transfer_id, TransferStatus::Failed, Some(&message), None)
                    .await;
            }
            Ok(Ok(())) => {}
            Ok(Err(TransferError::Cancelled)) => {
                info!(transfer_id = %transfer_id, "transfer cancelled at checkpoint");
                self.finish(transfer_id, TransferStatus::Cancelled, None, None)
                    .await;
            }
            Ok(Err(err)) => {
                error!(transfer_id = %transfer_id, error = %err, "transfer workflow failed");
                self.finish(
                    transfer_id,
                    TransferStatus::Failed,
                    Some(&err.to_string()),
                    None,
                )
                .await;
            }
        }

        self.cancels.remove(transfer_id);
    }

    async fn run(
        &self,
        transfer_id: &str,
        source_url: &str,
        mode: TransferMode,
        token: &CancellationToken,
    ) -> Result<(), TransferError> {
        info!(transfer_id = %transfer_id, url = %source_url, mode = mode.as_str(),
            "starting transfer workflow");

        let drive_type = detect_drive_type(source_url)?;
        let source = self.adapters.for_drive(drive_type);

        self.sink
            .report(
                transfer_id,
                TransferStatus::Scanning,
                Some("scanning"),
                TransferPatch::default(),
            )
            .await?;

        let files = source
            .list_files(source_url)
            .await
            .map_err(TransferError::Scan)?;
        info!(transfer_id = %transfer_id, count = files.len(), "scan discovered files");

        self.storage.insert_file_records(transfer_id, &files).await?;
        self.sink
            .report(
                transfer_id,
                TransferStatus::Scanning,
                Some("scanning"),
                TransferPatch {
                    total_files: Some(files.len() as i64),
                    ..Default::default()
                },
            )
            .await?;

        if files.is_empty() {
            self.finish(
                transfer_id,
                TransferStatus::Completed,
                Some("No files found in source folder"),
                None,
            )
            .await;
            return Ok(());
        }

        self.checkpoint(token)?;

        let notebook_id = match mode {
            TransferMode::ViaStaging => {
                self.run_staged(transfer_id, &files, drive_type, &source, token)
                    .await?
            }
            TransferMode::DirectToTarget => {
                self.run_direct(transfer_id, &files, &source, token).await?
            }
        };

        info!(transfer_id = %transfer_id, notebook_id = %notebook_id, "transfer workflow completed");
        self.finish(transfer_id, TransferStatus::Completed, None, Some(&notebook_id))
            .await;
        Ok(())
    }

    /// Staged mode: move every file into a staging folder on Google Drive,
    /// then forward the staged entries to the target service.
    async fn run_staged(
        &self,
        transfer_id: &str,
        files: &[FileDescriptor],
        drive_type: DriveType,
        source: &Arc<dyn DriveAdapter>,
        token: &CancellationToken,
    ) -> Result<String, TransferError> {
        let staging = &self.adapters.google;
        let folder_name = format!(
            "ftransport_{}_{}",
            transfer_id,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let staging_folder = staging
            .create_folder(&folder_name, None)
            .await
            .map_err(TransferError::StagingFolder)?;
        info!(transfer_id = %transfer_id, folder_id = %staging_folder, "created staging folder");

        self.sink
            .report(
                transfer_id,
                TransferStatus::Transferring,
                Some("transferring"),
                TransferPatch {
                    staging_folder_id: Some(staging_folder.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let total = files.len() as i64;
        for (index, file) in files.iter().enumerate() {
            self.checkpoint(token)?;

            match self
                .stage_single_file(transfer_id, file, &staging_folder, drive_type, source)
                .await
            {
                Ok(destination) => {
                    debug!(transfer_id = %transfer_id, file = %file.name, destination = %destination,
                        "staged file");
                }
                Err(err) => {
                    warn!(transfer_id = %transfer_id, file = %file.name, error = %err,
                        "file transfer failed, continuing with remaining files");
                    if let Err(err) = self
                        .storage
                        .mark_file_failed(transfer_id, &file.name, &err.to_string())
                        .await
                    {
                        error!(transfer_id = %transfer_id, error = %err, "failed to record file failure");
                    }
                }
            }

            let completed = self
                .storage
                .count_files_with_status(transfer_id, FileStatus::Completed.as_str())
                .await?;
            let processed = index as i64 + 1;
            self.sink
                .report(
                    transfer_id,
                    TransferStatus::Transferring,
                    Some("transferring"),
                    TransferPatch {
                        files_completed: Some(completed),
                        overall_progress: Some(processed as f64 / total as f64 * 100.0),
                        ..Default::default()
                    },
                )
                .await?;
        }

        self.checkpoint(token)?;
        self.sink
            .report(
                transfer_id,
                TransferStatus::Uploading,
                Some("uploading"),
                TransferPatch::default(),
            )
            .await?;

        let notebook_id = self
            .target
            .create_notebook(&format!("FTransport_{transfer_id}"))
            .await?;
        self.sink
            .report(
                transfer_id,
                TransferStatus::Uploading,
                Some("uploading"),
                TransferPatch {
                    notebook_id: Some(notebook_id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let staged = staging
            .list_files_in_folder(&staging_folder)
            .await
            .map_err(TransferError::StagingList)?;
        let mut uploaded = 0usize;
        for entry in &staged {
            self.checkpoint(token)?;
            // A lenient target degrades its own failures into Ok; an Err
            // here means strict mode and fails the whole transfer.
            match self.target.upload_file(&notebook_id, entry).await {
                Ok(true) => uploaded += 1,
                Ok(false) => {
                    warn!(transfer_id = %transfer_id, file = %entry.name, "notebook rejected staged file")
                }
                Err(err) => return Err(TransferError::Target(err)),
            }
        }
        info!(transfer_id = %transfer_id, uploaded, total = staged.len(), notebook_id = %notebook_id,
            "forwarded staging folder to notebook");

        Ok(notebook_id)
    }

    /// Direct mode: no staging folder; each file's bytes go straight from
    /// the source adapter into the notebook as a content source.
    async fn run_direct(
        &self,
        transfer_id: &str,
        files: &[FileDescriptor],
        source: &Arc<dyn DriveAdapter>,
        token: &CancellationToken,
    ) -> Result<String, TransferError> {
        self.sink
            .report(
                transfer_id,
                TransferStatus::Uploading,
                Some("uploading"),
                TransferPatch::default(),
            )
            .await?;

        let notebook_id = self
            .target
            .create_notebook(&format!("FTransport_{transfer_id}"))
            .await?;
        self.sink
            .report(
                transfer_id,
                TransferStatus::Uploading,
                Some("uploading"),
                TransferPatch {
                    notebook_id: Some(notebook_id.clone()),
                    ..Default::default()
                },
            )
            .await?;

        let total = files.len() as i64;
        for (index, file) in files.iter().enumerate() {
            self.checkpoint(token)?;

            match self
                .direct_single_file(transfer_id, file, &notebook_id, source)
                .await
            {
                Ok(()) => {}
                Err(err) => {
                    if let Err(record_err) = self
                        .storage
                        .mark_file_failed(transfer_id, &file.name, &err.to_string())
                        .await
                    {
                        error!(transfer_id = %transfer_id, error = %record_err, "failed to record file failure");
                    }
                    // Target rejections only surface as Err in strict mode
                    // and fail the transfer; provider errors stay isolated
                    // to the file.
                    match err.downcast::<TargetError>() {
                        Ok(target_err) => return Err(TransferError::Target(target_err)),
                        Err(err) => {
                            warn!(transfer_id = %transfer_id, file = %file.name, error = %err,
                                "direct upload failed, continuing with remaining files")
                        }
                    }
                }
            }

            let completed = self
                .storage
                .count_files_with_status(transfer_id, FileStatus::Completed.as_str())
                .await?;
            let processed = index as i64 + 1;
            self.sink
                .report(
                    transfer_id,
                    TransferStatus::Uploading,
                    Some("uploading"),
                    TransferPatch {
                        files_completed: Some(completed),
                        overall_progress: Some(processed as f64 / total as f64 * 100.0),
                        ..Default::default()
                    },
                )
                .await?;
        }

        Ok(notebook_id)
    }

    async fn stage_single_file(
        &self,
        transfer_id: &str,
        file: &FileDescriptor,
        staging_folder: &str,
        drive_type: DriveType,
        source: &Arc<dyn DriveAdapter>,
    ) -> anyhow::Result<String> {
        self.sink
            .report(
                transfer_id,
                TransferStatus::Transferring,
                Some("transferring"),
                TransferPatch {
                    current_file_name: Some(file.name.clone()),
                    current_file_progress: Some(0.0),
                    ..Default::default()
                },
            )
            .await?;
        self.storage
            .mark_file_in_progress(transfer_id, &file.name)
            .await?;

        let (on_progress, pump) =
            self.file_progress_pump(transfer_id, &file.name, TransferStatus::Transferring);

        // Same-provider server-side copy avoids the local round trip.
        let result = if drive_type == DriveType::GoogleDrive && !file.id.is_empty() {
            source
                .copy_file_direct(&file.id, staging_folder, None, Some(on_progress.clone()))
                .await
        } else {
            match source
                .download_file(&file.id, Some(on_progress.clone()))
                .await
            {
                Ok(content) => {
                    self.adapters
                        .google
                        .upload_file(
                            &file.name,
                            &content,
                            staging_folder,
                            Some(on_progress.clone()),
                        )
                        .await
                }
                Err(err) => Err(err),
            }
        };

        drop(on_progress);
        let _ = pump.await;

        let destination = result?;
        self.storage
            .mark_file_completed(
                transfer_id,
                &file.name,
                &destination,
                file.size.unwrap_or(0) as i64,
            )
            .await?;
        Ok(destination)
    }

    async fn direct_single_file(
        &self,
        transfer_id: &str,
        file: &FileDescriptor,
        notebook_id: &str,
        source: &Arc<dyn DriveAdapter>,
    ) -> anyhow::Result<()> {
        self.sink
            .report(
                transfer_id,
                TransferStatus::Uploading,
                Some("uploading"),
                TransferPatch {
                    current_file_name: Some(file.name.clone()),
                    current_file_progress: Some(0.0),
                    ..Default::default()
                },
            )
            .await?;
        self.storage
            .mark_file_in_progress(transfer_id, &file.name)
            .await?;

        let (on_progress, pump) =
            self.file_progress_pump(transfer_id, &file.name, TransferStatus::Uploading);
        let result = source
            .download_file(&file.id, Some(on_progress.clone()))
            .await;
        drop(on_progress);
        let _ = pump.await;

        let content = result?;
        self.target
            .upload_source(notebook_id, &file.name, &content)
            .await?;
        self.storage
            .mark_file_completed(transfer_id, &file.name, notebook_id, content.len() as i64)
            .await?;
        Ok(())
    }

    /// Byte-progress callbacks arrive synchronously from inside adapter
    /// calls; they are drained by a pump task so the adapter never blocks
    /// on a record-store write. The pump ends once the callback is dropped
    /// and is awaited before the next file starts, keeping
    /// `current_file_progress` scoped to one file at a time.
    fn file_progress_pump(
        &self,
        transfer_id: &str,
        file_name: &str,
        status: TransferStatus,
    ) -> (ProgressFn, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<(u64, u64)>();
        let storage = self.storage.clone();
        let sink = self.sink.clone();
        let transfer_id = transfer_id.to_string();
        let file_name = file_name.to_string();

        let pump = tokio::spawn(async move {
            while let Some((transferred, total)) = rx.recv().await {
                if let Err(err) = storage
                    .record_file_bytes(&transfer_id, &file_name, transferred as i64)
                    .await
                {
                    warn!(transfer_id = %transfer_id, error = %err, "failed to record file bytes");
                    continue;
                }
                let fraction = if total > 0 {
                    transferred as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                let patch = TransferPatch {
                    current_file_progress: Some(fraction),
                    ..Default::default()
                };
                if let Err(err) = sink.report(&transfer_id, status, None, patch).await {
                    warn!(transfer_id = %transfer_id, error = %err, "failed to report file progress");
                }
            }
        });

        let on_progress: ProgressFn = Arc::new(move |transferred, total| {
            let _ = tx.send((transferred, total));
        });
        (on_progress, pump)
    }

    async fn finish(
        &self,
        transfer_id: &str,
        status: TransferStatus,
        error_message: Option<&str>,
        notebook_id: Option<&str>,
    ) {
        match self
            .storage
            .finalize_transfer(transfer_id, status.as_str(), error_message, notebook_id)
            .await
        {
            Ok(true) => {
                // File rows left mid-flight by a timeout, cancellation, or
                // abort must settle with the transfer.
                let note =
                    error_message.unwrap_or("transfer ended before this file was processed");
                match self.storage.fail_unfinished_files(transfer_id, note).await {
                    Ok(0) => {}
                    Ok(swept) => {
                        debug!(transfer_id = %transfer_id, swept, "failed unfinished file records")
                    }
                    Err(err) => {
                        warn!(transfer_id = %transfer_id, error = %err, "failed to sweep unfinished file records")
                    }
                }
                if let Err(err) = self.sink.broadcast(transfer_id, None).await {
                    warn!(transfer_id = %transfer_id, error = %err, "failed to broadcast terminal state");
                }
            }
            Ok(false) => {
                debug!(transfer_id = %transfer_id, "terminal state already settled, skipping write")
            }
            Err(err) => {
                error!(transfer_id = %transfer_id, error = %err, "failed to finalize transfer")
            }
        }
    }

    fn checkpoint(&self, token: &CancellationToken) -> Result<(), TransferError> {
        if token.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }
}
