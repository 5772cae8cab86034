//! Target knowledge-base adapter for NotebookLM Enterprise.
//!
//! By default the client runs in lenient mode: a failed create or upload is
//! degraded into a synthesized success (placeholder notebook id, accepted
//! upload) so the migration can finish in a visible-but-degraded state. The
//! degradation is logged at `warn` with `degraded = true`. Strict mode turns
//! these into hard [`TargetError`]s.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ftransport_domain::FileDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::TargetError;

const DEFAULT_BASE_URL: &str = "https://aiplatform.googleapis.com/v1";
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct NotebookLmConfig {
    pub project_id: String,
    pub location: Option<String>,
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    /// When true, target failures propagate instead of degrading into a
    /// placeholder success.
    pub strict: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookStatus {
    pub status: String,
    pub sources_count: i64,
}

/// Capability interface over the destination knowledge-base service.
#[async_trait]
pub trait TargetAdapter: Send + Sync {
    async fn create_notebook(&self, name: &str) -> Result<String, TargetError>;

    /// Content-based source upload, used by direct transfers.
    async fn upload_source(
        &self,
        notebook_id: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<bool, TargetError>;

    /// Reference-based upload for provider-native files already staged.
    async fn upload_file(
        &self,
        notebook_id: &str,
        file: &FileDescriptor,
    ) -> Result<bool, TargetError>;

    async fn get_status(&self, notebook_id: &str) -> Result<NotebookStatus, TargetError>;

    fn is_initialized(&self) -> bool;

    async fn test_connectivity(&self) -> bool;
}

pub struct NotebookLmClient {
    config: NotebookLmConfig,
    client: reqwest::Client,
}

impl NotebookLmClient {
    pub fn new(config: NotebookLmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn notebooks_url(&self) -> String {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let location = self.config.location.as_deref().unwrap_or("us-central1");
        format!(
            "{base}/projects/{}/locations/{location}/notebooks",
            self.config.project_id
        )
    }

    fn bearer(&self) -> Result<String, TargetError> {
        let token = self
            .config
            .access_token
            .as_deref()
            .ok_or(TargetError::NotInitialized)?;
        Ok(format!("Bearer {token}"))
    }

    async fn post_json(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, TargetError> {
        let bearer = self.bearer()?;
        let response = self
            .client
            .post(url)
            .header("Authorization", bearer)
            .json(&body)
            .send()
            .await
            .map_err(|e| TargetError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TargetError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| TargetError::Request(e.to_string()))
    }

    async fn try_create_notebook(&self, name: &str) -> Result<String, TargetError> {
        let payload = json!({
            "display_name": name,
            "description": "Notebook created by FTransport for data migration",
        });
        let created = self.post_json(&self.notebooks_url(), payload).await?;
        let id = created
            .get("name")
            .and_then(|n| n.as_str())
            .and_then(|n| n.rsplit('/').next())
            .unwrap_or_default()
            .to_string();
        if id.is_empty() {
            return Err(TargetError::Request(
                "notebook response carried no name".to_string(),
            ));
        }
        Ok(id)
    }

    fn placeholder_notebook_id(name: &str) -> String {
        format!("mock_notebook_{}", name.replace(' ', "_").to_lowercase())
    }
}

#[async_trait]
impl TargetAdapter for NotebookLmClient {
    async fn create_notebook(&self, name: &str) -> Result<String, TargetError> {
        match self.try_create_notebook(name).await {
            Ok(id) => {
                debug!(notebook = %name, id = %id, "created notebook");
                Ok(id)
            }
            Err(err) if !self.config.strict => {
                let id = Self::placeholder_notebook_id(name);
                warn!(notebook = %name, error = %err, degraded = true, placeholder = %id,
                    "notebook creation failed, continuing with placeholder id");
                Ok(id)
            }
            Err(err) => Err(err),
        }
    }

    async fn upload_source(
        &self,
        notebook_id: &str,
        file_name: &str,
        content: &[u8],
    ) -> Result<bool, TargetError> {
        let url = format!("{}/{notebook_id}/sources", self.notebooks_url());
        let payload = json!({
            "source_type": "inline",
            "file_name": file_name,
            "content_base64": BASE64.encode(content),
        });
        match self.post_json(&url, payload).await {
            Ok(_) => {
                debug!(notebook = %notebook_id, file = %file_name, "uploaded source content");
                Ok(true)
            }
            Err(err) if !self.config.strict => {
                warn!(notebook = %notebook_id, file = %file_name, error = %err, degraded = true,
                    "source upload failed, reporting degraded success");
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    async fn upload_file(
        &self,
        notebook_id: &str,
        file: &FileDescriptor,
    ) -> Result<bool, TargetError> {
        let url = format!("{}/{notebook_id}/sources", self.notebooks_url());
        let payload = json!({
            "source_type": "google_drive",
            "google_drive_file_id": file.id,
            "file_name": file.name,
            "mime_type": file.mime_type,
        });
        match self.post_json(&url, payload).await {
            Ok(_) => {
                debug!(notebook = %notebook_id, file = %file.name, "uploaded staged file");
                Ok(true)
            }
            Err(err) if !self.config.strict => {
                warn!(notebook = %notebook_id, file = %file.name, error = %err, degraded = true,
                    "staged upload failed, reporting degraded success");
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    async fn get_status(&self, notebook_id: &str) -> Result<NotebookStatus, TargetError> {
        let bearer = self.bearer()?;
        let url = format!("{}/{notebook_id}", self.notebooks_url());
        let response = self
            .client
            .get(url)
            .header("Authorization", bearer)
            .send()
            .await
            .map_err(|e| TargetError::Request(e.to_string()))?;

        if response.status().is_success() {
            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| TargetError::Request(e.to_string()))?;
            Ok(NotebookStatus {
                status: body
                    .get("status")
                    .and_then(|s| s.as_str())
                    .unwrap_or("active")
                    .to_string(),
                sources_count: body
                    .get("sources_count")
                    .and_then(|c| c.as_i64())
                    .unwrap_or(0),
            })
        } else {
            Ok(NotebookStatus {
                status: "unknown".to_string(),
                sources_count: 0,
            })
        }
    }

    fn is_initialized(&self) -> bool {
        self.config.access_token.is_some() && !self.config.project_id.is_empty()
    }

    async fn test_connectivity(&self) -> bool {
        let Ok(bearer) = self.bearer() else {
            return false;
        };
        self.client
            .get(self.notebooks_url())
            .header("Authorization", bearer)
            .timeout(CONNECTIVITY_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::NotebookLmClient;

    #[test]
    fn placeholder_id_is_stable_and_recognizable() {
        assert_eq!(
            NotebookLmClient::placeholder_notebook_id("FTransport Demo"),
            "mock_notebook_ftransport_demo"
        );
    }
}
