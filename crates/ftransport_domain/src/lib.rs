pub mod classifier;
pub mod model;

pub use classifier::{detect_drive_type, validate_drive_url, ClassifyError};
pub use model::{
    CurrentFile, DriveType, FileDescriptor, FileDetail, FileStatus, ProgressSnapshot,
    TransferMode, TransferStatus, UrlValidation,
};
