use connectors::error::{AdapterError, SinkError};
use engine_config::settings::error::SettingsError;
use engine_core::error::{ProgressError, StateStoreError};
use planner::error::PlanError;
use thiserror::Error;

/// Errors that stop a transfer before or outside chunk processing.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Progress store unavailable: {0}")]
    ProgressStoreUnavailable(String),

    /// The store is held by another process, usually a running transfer.
    #[error("Job is running in another process: {0}")]
    JobRunning(String),

    #[error("Source error: {0}")]
    Source(#[from] AdapterError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Progress error: {0}")]
    Progress(#[from] ProgressError),

    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<StateStoreError> for TransferError {
    fn from(err: StateStoreError) -> Self {
        match err {
            StateStoreError::Locked(_) => TransferError::JobRunning(err.to_string()),
            other => TransferError::ProgressStoreUnavailable(other.to_string()),
        }
    }
}

impl From<PlanError> for TransferError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::InvalidConfig(message) => TransferError::InvalidConfig(message),
        }
    }
}

impl From<SettingsError> for TransferError {
    fn from(err: SettingsError) -> Self {
        TransferError::InvalidConfig(err.to_string())
    }
}
