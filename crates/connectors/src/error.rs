use crate::{
    file::csv::error::FileError,
    sql::base::error::{ConnectorError, DbError},
};
use thiserror::Error;

/// Errors raised by a source reader.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// An unsupported source kind was requested.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Failed to initialize a data connector.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// File-related error.
    #[error("File error: {0}")]
    FileError(#[from] FileError),

    /// Database-related error.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A record could not be decoded into a document.
    #[error("Malformed record at offset {offset}: {message}")]
    MalformedRecord { offset: u64, message: String },

    /// Missing required property error.
    #[error("Missing required property: {0}")]
    MissingProperty(String),

    /// Generic adapter error.
    #[error("Adapter error: {0}")]
    Generic(String),
}

/// Errors raised by a sink writer.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The request did not complete in time.
    #[error("Sink request timed out: {0}")]
    Timeout(String),

    /// The request never reached the service (DNS, connect, TLS).
    #[error("Sink dispatch failed: {0}")]
    Dispatch(String),

    /// The service answered with an error.
    #[error("Sink service error (status {status:?}): {message}")]
    Service { status: Option<u16>, message: String },

    #[error("Invalid blob name: {0}")]
    InvalidName(String),

    #[error("Sink misconfigured: {0}")]
    Config(String),

    #[error("Sink error: {0}")]
    Other(String),
}
