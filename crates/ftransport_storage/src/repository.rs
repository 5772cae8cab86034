use anyhow::{Context, Result};
use chrono::Utc;
use ftransport_domain::FileDescriptor;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("sql/schema.sql");
const TERMINAL_GUARD: &str = "('completed', 'failed', 'cancelled')";

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub sqlite_path: String,
}

#[derive(Debug, Clone)]
pub struct FtransportStorage {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransferRow {
    pub transfer_id: String,
    pub source_url: String,
    pub drive_type: String,
    pub transfer_mode: String,
    pub status: String,
    pub total_files: i64,
    pub files_completed: i64,
    pub current_file_name: Option<String>,
    pub current_file_progress: f64,
    pub overall_progress: f64,
    pub staging_folder_id: Option<String>,
    pub notebook_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileRow {
    pub file_id: i64,
    pub transfer_id: String,
    pub provider_file_id: Option<String>,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub file_type: Option<String>,
    pub source_path: Option<String>,
    pub destination_path: Option<String>,
    pub status: String,
    pub bytes_transferred: i64,
    pub error_message: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Selective field update for one transfer. `None` fields keep their
/// persisted value; this replaces the original's reflective attribute
/// patching with an enumerated struct.
#[derive(Debug, Clone, Default)]
pub struct TransferPatch {
    pub total_files: Option<i64>,
    pub files_completed: Option<i64>,
    pub current_file_name: Option<String>,
    pub current_file_progress: Option<f64>,
    pub overall_progress: Option<f64>,
    pub staging_folder_id: Option<String>,
    pub notebook_id: Option<String>,
    pub error_message: Option<String>,
}

impl FtransportStorage {
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let uri = normalize_sqlite_uri(&config.sqlite_path);
        let options = SqliteConnectOptions::from_str(&uri)
            .with_context(|| format!("invalid sqlite URI: {}", uri))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect sqlite pool")?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA_SQL.split(';') {
            let sql = statement.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("migration failed for statement: {sql}"))?;
        }
        info!("ftransport sqlite schema ready");
        Ok(())
    }

    pub async fn create_transfer(
        &self,
        source_url: &str,
        drive_type: &str,
        transfer_mode: &str,
    ) -> Result<TransferRow> {
        let transfer_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO transfers(transfer_id, source_url, drive_type, transfer_mode, status, created_at) VALUES (?, ?, ?, ?, 'pending', ?)",
        )
        .bind(&transfer_id)
        .bind(source_url)
        .bind(drive_type)
        .bind(transfer_mode)
        .bind(&now)
        .execute(&self.pool)
        .await
        .context("insert transfer")?;

        self.get_transfer(&transfer_id)
            .await?
            .context("transfer missing after insert")
    }

    pub async fn get_transfer(&self, transfer_id: &str) -> Result<Option<TransferRow>> {
        sqlx::query_as::<_, TransferRow>("SELECT * FROM transfers WHERE transfer_id = ?")
            .bind(transfer_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("query transfer {transfer_id}"))
    }

    pub async fn list_transfers(&self, skip: i64, limit: i64) -> Result<Vec<TransferRow>> {
        sqlx::query_as::<_, TransferRow>(
            "SELECT * FROM transfers ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await
        .context("list transfers")
    }

    /// Apply a status plus selective field updates to a non-terminal
    /// transfer. `started_at` is stamped on the first transition away from
    /// pending; writes against a terminal row are silently dropped so a
    /// timed-out or cancelled run cannot mutate settled state.
    pub async fn apply_transfer_patch(
        &self,
        transfer_id: &str,
        status: &str,
        patch: &TransferPatch,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "UPDATE transfers SET \
                status = ?, \
                total_files = COALESCE(?, total_files), \
                files_completed = MIN(COALESCE(?, files_completed), MAX(total_files, COALESCE(?, 0))), \
                current_file_name = COALESCE(?, current_file_name), \
                current_file_progress = COALESCE(?, current_file_progress), \
                overall_progress = MAX(overall_progress, COALESCE(?, overall_progress)), \
                staging_folder_id = COALESCE(?, staging_folder_id), \
                notebook_id = COALESCE(?, notebook_id), \
                error_message = COALESCE(?, error_message), \
                started_at = CASE WHEN ? = 'pending' THEN started_at ELSE COALESCE(started_at, ?) END \
             WHERE transfer_id = ? AND status NOT IN {TERMINAL_GUARD}"
        );

        sqlx::query(&sql)
            .bind(status)
            .bind(patch.total_files)
            .bind(patch.files_completed)
            .bind(patch.total_files)
            .bind(&patch.current_file_name)
            .bind(patch.current_file_progress)
            .bind(patch.overall_progress)
            .bind(&patch.staging_folder_id)
            .bind(&patch.notebook_id)
            .bind(&patch.error_message)
            .bind(status)
            .bind(&now)
            .bind(transfer_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("patch transfer {transfer_id}"))?;
        Ok(())
    }

    /// Move a transfer into a terminal state exactly once. Returns whether
    /// this call won the terminal write; losers (timeout racing a finished
    /// run, duplicate cancellation) see `false` and must not report.
    pub async fn finalize_transfer(
        &self,
        transfer_id: &str,
        status: &str,
        error_message: Option<&str>,
        notebook_id: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "UPDATE transfers SET \
                status = ?, \
                error_message = COALESCE(?, error_message), \
                notebook_id = COALESCE(?, notebook_id), \
                started_at = COALESCE(started_at, ?), \
                completed_at = ? \
             WHERE transfer_id = ? AND status NOT IN {TERMINAL_GUARD}"
        );

        let result = sqlx::query(&sql)
            .bind(status)
            .bind(error_message)
            .bind(notebook_id)
            .bind(&now)
            .bind(&now)
            .bind(transfer_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("finalize transfer {transfer_id}"))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn insert_file_records(
        &self,
        transfer_id: &str,
        files: &[FileDescriptor],
    ) -> Result<()> {
        for file in files {
            sqlx::query(
                "INSERT INTO transfer_files(transfer_id, provider_file_id, file_name, file_size, file_type, source_path, status) VALUES (?, ?, ?, ?, ?, ?, 'pending')",
            )
            .bind(transfer_id)
            .bind(&file.id)
            .bind(&file.name)
            .bind(file.size.map(|s| s as i64))
            .bind(&file.mime_type)
            .bind(&file.path)
            .execute(&self.pool)
            .await
            .with_context(|| format!("insert file record {} for {transfer_id}", file.name))?;
        }
        Ok(())
    }

    pub async fn transfer_files(&self, transfer_id: &str) -> Result<Vec<FileRow>> {
        sqlx::query_as::<_, FileRow>(
            "SELECT * FROM transfer_files WHERE transfer_id = ? ORDER BY file_id ASC",
        )
        .bind(transfer_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("query files for transfer {transfer_id}"))
    }

    pub async fn mark_file_in_progress(&self, transfer_id: &str, file_name: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE transfer_files SET status = 'in_progress', started_at = ? WHERE transfer_id = ? AND file_name = ? AND status = 'pending'",
        )
        .bind(&now)
        .bind(transfer_id)
        .bind(file_name)
        .execute(&self.pool)
        .await
        .with_context(|| format!("mark file {file_name} in progress"))?;
        Ok(())
    }

    /// Record byte progress for an in-flight file. Progress is clamped to
    /// the known size and never moves backwards.
    pub async fn record_file_bytes(
        &self,
        transfer_id: &str,
        file_name: &str,
        bytes_transferred: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE transfer_files SET bytes_transferred = MAX(bytes_transferred, MIN(?, COALESCE(file_size, ?))) WHERE transfer_id = ? AND file_name = ? AND status = 'in_progress'",
        )
        .bind(bytes_transferred)
        .bind(bytes_transferred)
        .bind(transfer_id)
        .bind(file_name)
        .execute(&self.pool)
        .await
        .with_context(|| format!("record bytes for file {file_name}"))?;
        Ok(())
    }

    pub async fn mark_file_completed(
        &self,
        transfer_id: &str,
        file_name: &str,
        destination_path: &str,
        bytes_transferred: i64,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE transfer_files SET status = 'completed', destination_path = ?, bytes_transferred = ?, completed_at = ? WHERE transfer_id = ? AND file_name = ? AND status IN ('pending', 'in_progress')",
        )
        .bind(destination_path)
        .bind(bytes_transferred)
        .bind(&now)
        .bind(transfer_id)
        .bind(file_name)
        .execute(&self.pool)
        .await
        .with_context(|| format!("mark file {file_name} completed"))?;
        Ok(())
    }

    pub async fn mark_file_failed(
        &self,
        transfer_id: &str,
        file_name: &str,
        error_message: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE transfer_files SET status = 'failed', error_message = ?, completed_at = ? WHERE transfer_id = ? AND file_name = ? AND status IN ('pending', 'in_progress')",
        )
        .bind(error_message)
        .bind(&now)
        .bind(transfer_id)
        .bind(file_name)
        .execute(&self.pool)
        .await
        .with_context(|| format!("mark file {file_name} failed"))?;
        Ok(())
    }

    pub async fn count_files_with_status(
        &self,
        transfer_id: &str,
        status: &str,
    ) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM transfer_files WHERE transfer_id = ? AND status = ?",
        )
        .bind(transfer_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("count {status} files for {transfer_id}"))
    }

    /// Fail every file row still pending or in progress. Called when the
    /// transfer settles so no record stays mid-flight forever. Returns the
    /// number of rows swept.
    pub async fn fail_unfinished_files(
        &self,
        transfer_id: &str,
        error_message: &str,
    ) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE transfer_files SET status = 'failed', error_message = ?, completed_at = ? WHERE transfer_id = ? AND status IN ('pending', 'in_progress')",
        )
        .bind(error_message)
        .bind(&now)
        .bind(transfer_id)
        .execute(&self.pool)
        .await
        .with_context(|| format!("fail unfinished files for {transfer_id}"))?;
        Ok(result.rows_affected())
    }

    /// Delete every terminal transfer and its file records. Returns the
    /// number of transfers removed.
    pub async fn clear_terminal_transfers(&self) -> Result<u64> {
        let files_sql = format!(
            "DELETE FROM transfer_files WHERE transfer_id IN (SELECT transfer_id FROM transfers WHERE status IN {TERMINAL_GUARD})"
        );
        sqlx::query(&files_sql)
            .execute(&self.pool)
            .await
            .context("clear terminal file records")?;

        let transfers_sql = format!("DELETE FROM transfers WHERE status IN {TERMINAL_GUARD}");
        let result = sqlx::query(&transfers_sql)
            .execute(&self.pool)
            .await
            .context("clear terminal transfers")?;
        Ok(result.rows_affected())
    }
}

fn normalize_sqlite_uri(raw: &str) -> String {
    if raw.starts_with("sqlite:") {
        raw.to_string()
    } else {
        format!("sqlite://{raw}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_storage() -> FtransportStorage {
        let uri = format!("sqlite:file:{}?mode=memory&cache=shared", Uuid::now_v7());
        FtransportStorage::connect(&StorageConfig { sqlite_path: uri })
            .await
            .expect("connect test storage")
    }

    fn descriptor(name: &str, size: Option<u64>) -> FileDescriptor {
        FileDescriptor {
            id: format!("id-{name}"),
            name: name.to_string(),
            path: name.to_string(),
            size,
            mime_type: Some("text/plain".to_string()),
            modified_time: None,
            parent_id: None,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_transfer() {
        let storage = test_storage().await;
        let row = storage
            .create_transfer(
                "https://drive.google.com/drive/folders/XYZ",
                "google_drive",
                "via_staging",
            )
            .await
            .unwrap();

        assert_eq!(row.status, "pending");
        assert_eq!(row.total_files, 0);
        assert!(row.started_at.is_none());
        assert!(row.completed_at.is_none());

        let fetched = storage.get_transfer(&row.transfer_id).await.unwrap();
        assert_eq!(fetched.unwrap().source_url, row.source_url);
    }

    #[tokio::test]
    async fn patch_stamps_started_at_once_and_is_idempotent() {
        let storage = test_storage().await;
        let row = storage
            .create_transfer("https://drive.google.com/x", "google_drive", "direct_to_target")
            .await
            .unwrap();

        let patch = TransferPatch {
            total_files: Some(3),
            ..Default::default()
        };
        storage
            .apply_transfer_patch(&row.transfer_id, "scanning", &patch)
            .await
            .unwrap();
        let first = storage.get_transfer(&row.transfer_id).await.unwrap().unwrap();
        assert_eq!(first.status, "scanning");
        assert_eq!(first.total_files, 3);
        let started = first.started_at.clone().expect("started_at stamped");

        // Same report again: persisted state is unchanged.
        storage
            .apply_transfer_patch(&row.transfer_id, "scanning", &patch)
            .await
            .unwrap();
        let second = storage.get_transfer(&row.transfer_id).await.unwrap().unwrap();
        assert_eq!(second.total_files, 3);
        assert_eq!(second.started_at.as_deref(), Some(started.as_str()));
    }

    #[tokio::test]
    async fn overall_progress_never_regresses() {
        let storage = test_storage().await;
        let row = storage
            .create_transfer("https://drive.google.com/x", "google_drive", "via_staging")
            .await
            .unwrap();

        let forward = TransferPatch {
            overall_progress: Some(60.0),
            ..Default::default()
        };
        storage
            .apply_transfer_patch(&row.transfer_id, "transferring", &forward)
            .await
            .unwrap();

        let backward = TransferPatch {
            overall_progress: Some(20.0),
            ..Default::default()
        };
        storage
            .apply_transfer_patch(&row.transfer_id, "transferring", &backward)
            .await
            .unwrap();

        let current = storage.get_transfer(&row.transfer_id).await.unwrap().unwrap();
        assert_eq!(current.overall_progress, 60.0);
    }

    #[tokio::test]
    async fn finalize_wins_exactly_once() {
        let storage = test_storage().await;
        let row = storage
            .create_transfer("https://drive.google.com/x", "google_drive", "direct_to_target")
            .await
            .unwrap();

        let won = storage
            .finalize_transfer(&row.transfer_id, "failed", Some("deadline exceeded"), None)
            .await
            .unwrap();
        assert!(won);

        let lost = storage
            .finalize_transfer(&row.transfer_id, "completed", None, Some("nb-1"))
            .await
            .unwrap();
        assert!(!lost);

        // A late patch from an abandoned run is a no-op too.
        let patch = TransferPatch {
            overall_progress: Some(100.0),
            ..Default::default()
        };
        storage
            .apply_transfer_patch(&row.transfer_id, "uploading", &patch)
            .await
            .unwrap();

        let current = storage.get_transfer(&row.transfer_id).await.unwrap().unwrap();
        assert_eq!(current.status, "failed");
        assert_eq!(current.error_message.as_deref(), Some("deadline exceeded"));
        assert!(current.notebook_id.is_none());
        assert_eq!(current.overall_progress, 0.0);
        assert!(current.completed_at.is_some());
    }

    #[tokio::test]
    async fn file_status_transitions_are_monotonic() {
        let storage = test_storage().await;
        let row = storage
            .create_transfer("https://drive.google.com/x", "google_drive", "via_staging")
            .await
            .unwrap();
        storage
            .insert_file_records(&row.transfer_id, &[descriptor("a.txt", Some(100))])
            .await
            .unwrap();

        storage
            .mark_file_in_progress(&row.transfer_id, "a.txt")
            .await
            .unwrap();
        storage
            .mark_file_failed(&row.transfer_id, "a.txt", "boom")
            .await
            .unwrap();

        // Terminal file states do not revert.
        storage
            .mark_file_in_progress(&row.transfer_id, "a.txt")
            .await
            .unwrap();
        storage
            .mark_file_completed(&row.transfer_id, "a.txt", "dest", 100)
            .await
            .unwrap();

        let files = storage.transfer_files(&row.transfer_id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].status, "failed");
        assert_eq!(files[0].error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn file_bytes_are_clamped_and_non_decreasing() {
        let storage = test_storage().await;
        let row = storage
            .create_transfer("https://drive.google.com/x", "google_drive", "via_staging")
            .await
            .unwrap();
        storage
            .insert_file_records(&row.transfer_id, &[descriptor("a.txt", Some(100))])
            .await
            .unwrap();
        storage
            .mark_file_in_progress(&row.transfer_id, "a.txt")
            .await
            .unwrap();

        storage
            .record_file_bytes(&row.transfer_id, "a.txt", 60)
            .await
            .unwrap();
        storage
            .record_file_bytes(&row.transfer_id, "a.txt", 40)
            .await
            .unwrap();
        storage
            .record_file_bytes(&row.transfer_id, "a.txt", 250)
            .await
            .unwrap();

        let files = storage.transfer_files(&row.transfer_id).await.unwrap();
        assert_eq!(files[0].bytes_transferred, 100);
    }

    #[tokio::test]
    async fn sweep_fails_only_unfinished_files() {
        let storage = test_storage().await;
        let row = storage
            .create_transfer("https://drive.google.com/x", "google_drive", "via_staging")
            .await
            .unwrap();
        storage
            .insert_file_records(
                &row.transfer_id,
                &[
                    descriptor("done.txt", Some(10)),
                    descriptor("mid.txt", Some(10)),
                    descriptor("queued.txt", Some(10)),
                ],
            )
            .await
            .unwrap();
        storage
            .mark_file_completed(&row.transfer_id, "done.txt", "dest", 10)
            .await
            .unwrap();
        storage
            .mark_file_in_progress(&row.transfer_id, "mid.txt")
            .await
            .unwrap();

        let swept = storage
            .fail_unfinished_files(&row.transfer_id, "stopped early")
            .await
            .unwrap();
        assert_eq!(swept, 2);

        assert_eq!(
            storage
                .count_files_with_status(&row.transfer_id, "completed")
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            storage
                .count_files_with_status(&row.transfer_id, "failed")
                .await
                .unwrap(),
            2
        );
        let files = storage.transfer_files(&row.transfer_id).await.unwrap();
        for file in files.iter().filter(|f| f.status == "failed") {
            assert_eq!(file.error_message.as_deref(), Some("stopped early"));
            assert!(file.completed_at.is_some());
        }
    }

    #[tokio::test]
    async fn clear_removes_only_terminal_transfers() {
        let storage = test_storage().await;
        let done = storage
            .create_transfer("https://drive.google.com/a", "google_drive", "direct_to_target")
            .await
            .unwrap();
        let live = storage
            .create_transfer("https://drive.google.com/b", "google_drive", "direct_to_target")
            .await
            .unwrap();
        storage
            .insert_file_records(&done.transfer_id, &[descriptor("a.txt", None)])
            .await
            .unwrap();
        storage
            .finalize_transfer(&done.transfer_id, "completed", None, None)
            .await
            .unwrap();

        let removed = storage.clear_terminal_transfers().await.unwrap();
        assert_eq!(removed, 1);
        assert!(storage.get_transfer(&done.transfer_id).await.unwrap().is_none());
        assert!(storage.get_transfer(&live.transfer_id).await.unwrap().is_some());
        assert!(storage
            .transfer_files(&done.transfer_id)
            .await
            .unwrap()
            .is_empty());
    }
}
