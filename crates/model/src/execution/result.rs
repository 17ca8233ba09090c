use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Success,
    Failure,
}

/// Outcome of one chunk execution, handed from a worker to the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub chunk_index: u64,
    pub status: WorkerStatus,
    pub record_count: u64,
    pub byte_size: u64,
    pub attempts: u32,
    /// The blob was already present at the sink and was not uploaded again.
    pub skipped_upload: bool,
    pub error: Option<String>,
}

impl WorkerResult {
    pub fn success(chunk_index: u64, record_count: u64, byte_size: u64, attempts: u32) -> Self {
        WorkerResult {
            chunk_index,
            status: WorkerStatus::Success,
            record_count,
            byte_size,
            attempts,
            skipped_upload: false,
            error: None,
        }
    }

    pub fn failure(chunk_index: u64, error: impl Into<String>, attempts: u32) -> Self {
        WorkerResult {
            chunk_index,
            status: WorkerStatus::Failure,
            record_count: 0,
            byte_size: 0,
            attempts,
            skipped_upload: false,
            error: Some(error.into()),
        }
    }

    pub fn with_skipped_upload(mut self, skipped: bool) -> Self {
        self.skipped_upload = skipped;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == WorkerStatus::Success
    }
}
