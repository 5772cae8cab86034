use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriveType {
    GoogleDrive,
    Onedrive,
    Dropbox,
}

impl DriveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveType::GoogleDrive => "google_drive",
            DriveType::Onedrive => "onedrive",
            DriveType::Dropbox => "dropbox",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "google_drive" => Some(DriveType::GoogleDrive),
            "onedrive" => Some(DriveType::Onedrive),
            "dropbox" => Some(DriveType::Dropbox),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    #[default]
    DirectToTarget,
    ViaStaging,
}

impl TransferMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMode::DirectToTarget => "direct_to_target",
            TransferMode::ViaStaging => "via_staging",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "direct_to_target" => Some(TransferMode::DirectToTarget),
            "via_staging" => Some(TransferMode::ViaStaging),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Scanning,
    Transferring,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Scanning => "scanning",
            TransferStatus::Transferring => "transferring",
            TransferStatus::Uploading => "uploading",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(TransferStatus::Pending),
            "scanning" => Some(TransferStatus::Scanning),
            "transferring" => Some(TransferStatus::Transferring),
            "uploading" => Some(TransferStatus::Uploading),
            "completed" => Some(TransferStatus::Completed),
            "failed" => Some(TransferStatus::Failed),
            "cancelled" => Some(TransferStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::InProgress => "in_progress",
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
        }
    }
}

/// One file discovered while scanning a source drive. `path` is the
/// `/`-joined position relative to the scanned folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    pub name: String,
    pub path: String,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub modified_time: Option<String>,
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlValidation {
    pub valid: bool,
    pub drive_type: Option<DriveType>,
    pub accessible: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentFile {
    pub name: String,
    pub progress: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDetail {
    pub name: String,
    pub status: String,
    pub size: Option<i64>,
    pub bytes_transferred: i64,
}

/// Shape broadcast to live subscribers and returned by the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub transfer_id: String,
    pub status: TransferStatus,
    pub stage: String,
    pub overall_progress: f64,
    pub files_completed: i64,
    pub total_files: i64,
    pub current_file: Option<CurrentFile>,
    pub file_details: Vec<FileDetail>,
    pub error_message: Option<String>,
}
