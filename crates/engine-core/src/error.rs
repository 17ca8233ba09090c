use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    /// The store could not be opened or does not answer.
    #[error("Progress store unavailable: {0}")]
    Unavailable(String),

    /// Another process holds the database lock, usually a running transfer.
    #[error("Progress store {0} is locked by another process")]
    Locked(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Failed to encode progress entry: {0}")]
    Encode(String),

    #[error("Failed to decode progress entry at '{key}': {message}")]
    Decode { key: String, message: String },

    #[error("Corrupt counter '{0}'")]
    CorruptCounter(String),
}

#[derive(Error, Debug)]
pub enum SerializeError {
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value does not fit the column type inferred for its field.
    #[error("Field '{field}' at row {row}: {message}")]
    Incompatible {
        field: String,
        row: usize,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("No job recorded under id '{0}'")]
    UnknownJob(String),

    #[error("Status file {path}: {message}")]
    StatusFile { path: String, message: String },

    #[error(transparent)]
    Store(#[from] StateStoreError),
}
