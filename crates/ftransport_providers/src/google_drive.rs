//! Google Drive adapter over the Drive v3 REST API.

use async_trait::async_trait;
use ftransport_domain::{DriveType, FileDescriptor};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::adapter::{DriveAdapter, ProgressFn};
use crate::error::ProviderError;

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    modified_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

#[derive(Debug, Clone, Default)]
pub struct GoogleDriveConfig {
    /// OAuth2 bearer token for the Drive API. The adapter reports itself
    /// uninitialized when absent.
    pub access_token: Option<String>,
    /// Parent folder for staging folders created without an explicit parent.
    pub landing_zone: Option<String>,
}

pub struct GoogleDriveAdapter {
    config: GoogleDriveConfig,
    client: reqwest::Client,
}

impl GoogleDriveAdapter {
    pub fn new(config: GoogleDriveConfig) -> Self {
        if config.access_token.is_some() {
            info!("google drive adapter initialized");
        }
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn bearer(&self) -> Result<String, ProviderError> {
        let token = self
            .config
            .access_token
            .as_deref()
            .ok_or(ProviderError::NotInitialized("google drive"))?;
        Ok(format!("Bearer {token}"))
    }

    /// One page-token loop over the children of `folder_id`.
    async fn list_folder(&self, folder_id: &str) -> Result<Vec<DriveFile>, ProviderError> {
        let bearer = self.bearer()?;
        let query = format!("'{folder_id}' in parents and trashed=false");
        let mut all = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", query.clone()),
                ("pageSize", PAGE_SIZE.to_string()),
                (
                    "fields",
                    "nextPageToken, files(id, name, size, mimeType, modifiedTime)".to_string(),
                ),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self
                .client
                .get(format!("{DRIVE_API_BASE}/files"))
                .query(&params)
                .header(AUTHORIZATION, &bearer)
                .send()
                .await
                .map_err(|e| ProviderError::Api(e.to_string()))?;

            let page: DriveFileList = match response.status() {
                StatusCode::NOT_FOUND => {
                    return Err(ProviderError::NotFound(folder_id.to_string()))
                }
                StatusCode::FORBIDDEN => {
                    return Err(ProviderError::PermissionDenied(folder_id.to_string()))
                }
                status if !status.is_success() => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProviderError::Api(format!(
                        "drive list failed with {status}: {body}"
                    )));
                }
                _ => response
                    .json()
                    .await
                    .map_err(|e| ProviderError::Api(e.to_string()))?,
            };

            all.extend(page.files);
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(all)
    }

    fn descriptor(file: DriveFile, path: String, parent_id: &str) -> FileDescriptor {
        let size = file.size.as_deref().and_then(|s| s.parse::<u64>().ok());
        FileDescriptor {
            id: file.id,
            name: file.name,
            path,
            size,
            mime_type: Some(file.mime_type),
            modified_time: file.modified_time,
            parent_id: Some(parent_id.to_string()),
        }
    }
}

/// Pull the folder id out of the public Google Drive URL shapes:
/// `/folders/<id>`, legacy `folderview?id=<id>`, a bare `id=` query
/// parameter, or the last path segment as a fallback.
pub fn extract_folder_id(url: &str) -> String {
    if let Some(rest) = url.split("/folders/").nth(1) {
        return id_prefix(rest);
    }
    if let Some(rest) = url.split("id=").nth(1) {
        return id_prefix(rest);
    }
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    trimmed
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

fn id_prefix(raw: &str) -> String {
    raw.chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

#[async_trait]
impl DriveAdapter for GoogleDriveAdapter {
    fn drive_type(&self) -> DriveType {
        DriveType::GoogleDrive
    }

    async fn list_files(&self, source_url: &str) -> Result<Vec<FileDescriptor>, ProviderError> {
        let root = extract_folder_id(source_url);
        debug!(folder_id = %root, "scanning google drive folder");

        // Depth-first walk over subfolders, flattening into one sequence.
        let mut files = Vec::new();
        let mut pending = vec![(root, String::new())];
        while let Some((folder_id, prefix)) = pending.pop() {
            for item in self.list_folder(&folder_id).await? {
                let path = if prefix.is_empty() {
                    item.name.clone()
                } else {
                    format!("{prefix}/{}", item.name)
                };
                if item.mime_type == FOLDER_MIME {
                    pending.push((item.id, path));
                } else {
                    files.push(Self::descriptor(item, path, &folder_id));
                }
            }
        }

        info!(count = files.len(), "discovered files in google drive folder");
        Ok(files)
    }

    async fn download_file(
        &self,
        file_id: &str,
        on_progress: Option<ProgressFn>,
    ) -> Result<Vec<u8>, ProviderError> {
        let bearer = self.bearer()?;

        let metadata: DriveFile = self
            .client
            .get(format!("{DRIVE_API_BASE}/files/{file_id}"))
            .query(&[("fields", "id, name, size, mimeType")])
            .header(AUTHORIZATION, &bearer)
            .send()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::Api(format!("failed to download file: {e}")))?
            .json()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?;
        let total = metadata
            .size
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let mut response = self
            .client
            .get(format!("{DRIVE_API_BASE}/files/{file_id}"))
            .query(&[("alt", "media")])
            .header(AUTHORIZATION, &bearer)
            .send()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::Api(format!("failed to download file: {e}")))?;

        let mut content = Vec::with_capacity(total as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?
        {
            content.extend_from_slice(&chunk);
            if let Some(cb) = &on_progress {
                if total > 0 {
                    cb(content.len() as u64, total);
                }
            }
        }

        Ok(content)
    }

    async fn upload_file(
        &self,
        name: &str,
        content: &[u8],
        parent_id: &str,
        on_progress: Option<ProgressFn>,
    ) -> Result<String, ProviderError> {
        let bearer = self.bearer()?;
        let total = content.len() as u64;
        if let Some(cb) = &on_progress {
            cb(0, total);
        }

        let metadata = serde_json::json!({ "name": name, "parents": [parent_id] });
        let form = reqwest::multipart::Form::new()
            .part(
                "metadata",
                reqwest::multipart::Part::text(metadata.to_string())
                    .mime_str("application/json")
                    .map_err(|e| ProviderError::Api(e.to_string()))?,
            )
            .part(
                "media",
                reqwest::multipart::Part::bytes(content.to_vec())
                    .mime_str("application/octet-stream")
                    .map_err(|e| ProviderError::Api(e.to_string()))?,
            );

        let created: CreatedFile = self
            .client
            .post(format!("{UPLOAD_API_BASE}/files"))
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(AUTHORIZATION, &bearer)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::Api(format!("failed to upload file: {e}")))?
            .json()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?;

        if let Some(cb) = &on_progress {
            cb(total, total);
        }
        debug!(file = %name, id = %created.id, "uploaded file to google drive");
        Ok(created.id)
    }

    async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, ProviderError> {
        let bearer = self.bearer()?;
        let parent = parent_id.or(self.config.landing_zone.as_deref());

        let mut metadata = serde_json::json!({ "name": name, "mimeType": FOLDER_MIME });
        if let Some(parent) = parent {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let created: CreatedFile = self
            .client
            .post(format!("{DRIVE_API_BASE}/files"))
            .query(&[("fields", "id")])
            .header(AUTHORIZATION, &bearer)
            .json(&metadata)
            .send()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::Api(format!("failed to create folder: {e}")))?
            .json()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?;

        info!(folder = %name, id = %created.id, "created google drive folder");
        Ok(created.id)
    }

    async fn copy_file_direct(
        &self,
        source_id: &str,
        dest_folder_id: &str,
        new_name: Option<&str>,
        on_progress: Option<ProgressFn>,
    ) -> Result<String, ProviderError> {
        let bearer = self.bearer()?;

        let mut body = serde_json::json!({ "parents": [dest_folder_id] });
        if let Some(name) = new_name {
            body["name"] = serde_json::json!(name);
        }

        let copied: CreatedFile = self
            .client
            .post(format!("{DRIVE_API_BASE}/files/{source_id}/copy"))
            .query(&[("fields", "id")])
            .header(AUTHORIZATION, &bearer)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?
            .error_for_status()
            .map_err(|e| ProviderError::Api(format!("failed to copy file: {e}")))?
            .json()
            .await
            .map_err(|e| ProviderError::Api(e.to_string()))?;

        // Server-side copy has no byte stream to observe.
        if let Some(cb) = &on_progress {
            cb(100, 100);
        }
        Ok(copied.id)
    }

    async fn list_files_in_folder(
        &self,
        folder_id: &str,
    ) -> Result<Vec<FileDescriptor>, ProviderError> {
        let files = self.list_folder(folder_id).await?;
        Ok(files
            .into_iter()
            .filter(|f| f.mime_type != FOLDER_MIME)
            .map(|f| {
                let path = f.name.clone();
                Self::descriptor(f, path, folder_id)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::extract_folder_id;

    #[test]
    fn extracts_folder_id_from_share_urls() {
        assert_eq!(
            extract_folder_id("https://drive.google.com/drive/folders/XYZ123"),
            "XYZ123"
        );
        assert_eq!(
            extract_folder_id("https://drive.google.com/drive/folders/abc-DEF_9?usp=sharing"),
            "abc-DEF_9"
        );
        assert_eq!(
            extract_folder_id("https://drive.google.com/folderview?id=LEGACY42"),
            "LEGACY42"
        );
        assert_eq!(
            extract_folder_id("https://drive.google.com/open?id=QUERY77&foo=bar"),
            "QUERY77"
        );
        assert_eq!(
            extract_folder_id("https://drive.google.com/some/TRAIL"),
            "TRAIL"
        );
    }
}
