use crate::core::{
    chunk::ChunkState,
    format::{Compression, OutputFormat},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted state of one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub state: ChunkState,
    pub attempts: u32,
    pub record_count: u64,
    pub byte_size: u64,
    pub blob_name: Option<String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ChunkEntry {
    pub fn pending() -> Self {
        ChunkEntry {
            state: ChunkState::Pending,
            attempts: 0,
            record_count: 0,
            byte_size: 0,
            blob_name: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn in_progress() -> Self {
        ChunkEntry {
            state: ChunkState::InProgress,
            ..Self::pending()
        }
    }

    pub fn completed(
        record_count: u64,
        byte_size: u64,
        blob_name: Option<String>,
        attempts: u32,
    ) -> Self {
        ChunkEntry {
            state: ChunkState::Completed,
            attempts,
            record_count,
            byte_size,
            blob_name,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>, attempts: u32) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }
        ChunkEntry {
            state: ChunkState::Failed,
            attempts,
            last_error: Some(error),
            ..Self::pending()
        }
    }
}

/// Plan header written once per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMeta {
    pub job_id: String,
    pub source: String,
    pub destination: String,
    pub output_format: OutputFormat,
    pub compression: Compression,
    pub chunk_size: u64,
    pub total_records: u64,
    pub total_chunks: u64,
    pub started_at: DateTime<Utc>,
}

/// Named job-wide aggregate counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Counter {
    CompletedCount,
    FailedCount,
    RecordsTransferred,
    BytesTransferred,
}

impl Counter {
    pub const ALL: [Counter; 4] = [
        Counter::CompletedCount,
        Counter::FailedCount,
        Counter::RecordsTransferred,
        Counter::BytesTransferred,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Counter::CompletedCount => "completed_count",
            Counter::FailedCount => "failed_count",
            Counter::RecordsTransferred => "records_transferred",
            Counter::BytesTransferred => "bytes_transferred",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate view of a job, as read back from the progress store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: String,
    pub total_chunks: u64,
    pub total_records: u64,
    pub completed_count: u64,
    pub failed_count: u64,
    pub records_transferred: u64,
    pub bytes_transferred: u64,
    pub started_at: DateTime<Utc>,
}

impl JobProgress {
    pub fn pending_count(&self) -> u64 {
        self.total_chunks
            .saturating_sub(self.completed_count)
            .saturating_sub(self.failed_count)
    }

    pub fn progress_percentage(&self) -> f64 {
        if self.total_chunks == 0 {
            return 100.0;
        }
        self.completed_count as f64 / self.total_chunks as f64 * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count >= self.total_chunks
    }

    /// Records per second since the job started, or `None` before anything
    /// has been transferred.
    pub fn records_per_second(&self, now: DateTime<Utc>) -> Option<f64> {
        let elapsed = (now - self.started_at).num_milliseconds() as f64 / 1000.0;
        if self.records_transferred == 0 || elapsed <= 0.0 {
            return None;
        }
        Some(self.records_transferred as f64 / elapsed)
    }

    /// Estimated seconds left, based on the average rate so far.
    pub fn eta_seconds(&self, now: DateTime<Utc>) -> Option<f64> {
        let rate = self.records_per_second(now)?;
        let remaining = self.total_records.saturating_sub(self.records_transferred);
        Some(remaining as f64 / rate)
    }
}
