pub mod orchestrator;
pub mod progress;

pub use orchestrator::{AdapterSet, TransferError, TransferWorker, WorkerConfig};
pub use progress::{snapshot_of, ProgressBroker, ProgressSink};
