//! Dropbox adapter placeholder. Satisfies the [`DriveAdapter`] contract so
//! the orchestrator can route Dropbox transfers; the backing API calls are
//! not wired up yet.

use async_trait::async_trait;
use ftransport_domain::{DriveType, FileDescriptor};
use tracing::debug;

use crate::adapter::{DriveAdapter, ProgressFn};
use crate::error::ProviderError;

#[derive(Debug, Default)]
pub struct DropboxAdapter;

impl DropboxAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DriveAdapter for DropboxAdapter {
    fn drive_type(&self) -> DriveType {
        DriveType::Dropbox
    }

    async fn list_files(&self, source_url: &str) -> Result<Vec<FileDescriptor>, ProviderError> {
        debug!(url = %source_url, "dropbox scan requested");
        Ok(Vec::new())
    }

    async fn download_file(
        &self,
        file_id: &str,
        on_progress: Option<ProgressFn>,
    ) -> Result<Vec<u8>, ProviderError> {
        debug!(file_id = %file_id, "dropbox download requested");
        if let Some(cb) = &on_progress {
            cb(100, 100);
        }
        Ok(b"placeholder_file_content".to_vec())
    }

    async fn upload_file(
        &self,
        _name: &str,
        _content: &[u8],
        _parent_id: &str,
        _on_progress: Option<ProgressFn>,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unsupported("dropbox upload"))
    }

    async fn create_folder(
        &self,
        _name: &str,
        _parent_id: Option<&str>,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unsupported("dropbox create folder"))
    }

    async fn copy_file_direct(
        &self,
        _source_id: &str,
        _dest_folder_id: &str,
        _new_name: Option<&str>,
        _on_progress: Option<ProgressFn>,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unsupported("dropbox direct copy"))
    }

    async fn list_files_in_folder(
        &self,
        _folder_id: &str,
    ) -> Result<Vec<FileDescriptor>, ProviderError> {
        Ok(Vec::new())
    }
}
