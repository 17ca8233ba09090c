use engine_config::settings::error::SettingsError;
use engine_core::error::ProgressError;
use engine_runtime::error::TransferError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Settings(#[from] SettingsError),

    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("Job is running in another process: {0}")]
    JobRunning(String),

    #[error("Failed to load progress: {0}")]
    Progress(#[from] ProgressError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Failed to initialise logging: {0}")]
    Logging(String),

    #[error("{failed} of {total} connection checks failed")]
    ConnectionCheck { failed: usize, total: usize },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}
