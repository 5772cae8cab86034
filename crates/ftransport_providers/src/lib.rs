pub mod adapter;
pub mod dropbox;
pub mod error;
pub mod google_drive;
pub mod notebooklm;
pub mod onedrive;

pub use adapter::{DriveAdapter, ProgressFn};
pub use dropbox::DropboxAdapter;
pub use error::{ProviderError, TargetError};
pub use google_drive::{GoogleDriveAdapter, GoogleDriveConfig};
pub use notebooklm::{NotebookLmClient, NotebookLmConfig, NotebookStatus, TargetAdapter};
pub use onedrive::OnedriveAdapter;
