pub mod repository;

pub use repository::{FileRow, FtransportStorage, StorageConfig, TransferPatch, TransferRow};
