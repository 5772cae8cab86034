//! OneDrive adapter placeholder, same shape as the Dropbox one.

use async_trait::async_trait;
use ftransport_domain::{DriveType, FileDescriptor};
use tracing::debug;

use crate::adapter::{DriveAdapter, ProgressFn};
use crate::error::ProviderError;

#[derive(Debug, Default)]
pub struct OnedriveAdapter;

impl OnedriveAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DriveAdapter for OnedriveAdapter {
    fn drive_type(&self) -> DriveType {
        DriveType::Onedrive
    }

    async fn list_files(&self, source_url: &str) -> Result<Vec<FileDescriptor>, ProviderError> {
        debug!(url = %source_url, "onedrive scan requested");
        Ok(Vec::new())
    }

    async fn download_file(
        &self,
        file_id: &str,
        on_progress: Option<ProgressFn>,
    ) -> Result<Vec<u8>, ProviderError> {
        debug!(file_id = %file_id, "onedrive download requested");
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
        Err(ProviderError::Unsupported("onedrive upload"))
    }

    async fn create_folder(
        &self,
        _name: &str,
        _parent_id: Option<&str>,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unsupported("onedrive create folder"))
    }

    async fn copy_file_direct(
        &self,
        _source_id: &str,
        _dest_folder_id: &str,
        _new_name: Option<&str>,
        _on_progress: Option<ProgressFn>,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unsupported("onedrive direct copy"))
    }

    async fn list_files_in_folder(
        &self,
        _folder_id: &str,
    ) -> Result<Vec<FileDescriptor>, ProviderError> {
        Ok(Vec::new())
    }
}
