use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("folder not found or not accessible: {0}")]
    NotFound(String),
    #[error("permission denied accessing folder: {0}")]
    PermissionDenied(String),
    #[error("{0} adapter not initialized")]
    NotInitialized(&'static str),
    #[error("{0} operation not supported by this adapter")]
    Unsupported(&'static str),
    #[error("provider API error: {0}")]
    Api(String),
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("notebook service request failed: {0}")]
    Request(String),
    #[error("notebook service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("notebook service credentials not configured")]
    NotInitialized,
}
