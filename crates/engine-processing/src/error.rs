use connectors::error::{AdapterError, SinkError};
use engine_core::error::SerializeError;
use thiserror::Error;

/// Failure of a single attempt at processing one chunk.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Failed to read chunk {index} from source: {source}")]
    Read {
        index: u64,
        #[source]
        source: AdapterError,
    },

    #[error("Failed to serialize chunk {index}: {source}")]
    Serialize {
        index: u64,
        #[source]
        source: SerializeError,
    },

    #[error("Failed to check blob '{blob}': {source}")]
    Exists {
        blob: String,
        #[source]
        source: SinkError,
    },

    #[error("Failed to write blob '{blob}': {source}")]
    Write {
        blob: String,
        #[source]
        source: SinkError,
    },

    #[error("Background task for chunk {index} failed: {message}")]
    Task { index: u64, message: String },
}
