use std::sync::Arc;

use async_trait::async_trait;
use ftransport_domain::{DriveType, FileDescriptor};

use crate::error::ProviderError;

/// Byte-progress callback: `(transferred, total)`. Invoked zero or more
/// times during a call; `transferred` is non-decreasing.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Capability interface over one cloud-storage backend. All operations are
/// uniform across providers; unimplemented backends return
/// [`ProviderError::Unsupported`] from the operations they lack.
#[async_trait]
pub trait DriveAdapter: Send + Sync {
    fn drive_type(&self) -> DriveType;

    /// Enumerate every file reachable from the shared folder URL,
    /// recursing into subfolders. Pagination is internal; the result is one
    /// flattened sequence.
    async fn list_files(&self, source_url: &str) -> Result<Vec<FileDescriptor>, ProviderError>;

    async fn download_file(
        &self,
        file_id: &str,
        on_progress: Option<ProgressFn>,
    ) -> Result<Vec<u8>, ProviderError>;

    async fn upload_file(
        &self,
        name: &str,
        content: &[u8],
        parent_id: &str,
        on_progress: Option<ProgressFn>,
    ) -> Result<String, ProviderError>;

    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, ProviderError>;

    /// Same-provider server-side copy, skipping the local round trip. Only
    /// meaningful when source and destination are the same backend.
    async fn copy_file_direct(
        &self,
        source_id: &str,
        dest_folder_id: &str,
        new_name: Option<&str>,
        on_progress: Option<ProgressFn>,
    ) -> Result<String, ProviderError>;

    /// Flat, non-recursive listing of one folder's files.
    async fn list_files_in_folder(
        &self,
        folder_id: &str,
    ) -> Result<Vec<FileDescriptor>, ProviderError>;
}
