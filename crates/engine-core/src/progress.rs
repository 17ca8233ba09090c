use crate::{error::ProgressError, state::ProgressStore};
use model::{
    core::chunk::ChunkState,
    execution::progress::{Counter, JobProgress},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Read-only view over the progress of one job.
#[derive(Clone)]
pub struct ProgressService {
    pub store: Arc<dyn ProgressStore>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
}

impl StateCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.in_progress + self.completed + self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedChunk {
    pub index: u64,
    pub attempts: u32,
    pub error: String,
}

impl ProgressService {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        ProgressService { store }
    }

    pub async fn job_progress(&self) -> Result<JobProgress, ProgressError> {
        let meta = self
            .store
            .load_job()
            .await?
            .ok_or_else(|| ProgressError::UnknownJob(self.store.job_id().to_string()))?;

        let read = |c: Counter| async move { self.store.counter(c).await.map(|v| v.max(0) as u64) };

        Ok(JobProgress {
            job_id: meta.job_id,
            total_chunks: meta.total_chunks,
            total_records: meta.total_records,
            completed_count: read(Counter::CompletedCount).await?,
            failed_count: read(Counter::FailedCount).await?,
            records_transferred: read(Counter::RecordsTransferred).await?,
            bytes_transferred: read(Counter::BytesTransferred).await?,
            started_at: meta.started_at,
        })
    }

    pub async fn failed_chunks(&self) -> Result<Vec<FailedChunk>, ProgressError> {
        let states = self.store.scan_states().await?;
        Ok(states
            .into_iter()
            .filter(|(_, entry)| entry.state == ChunkState::Failed)
            .map(|(index, entry)| FailedChunk {
                index,
                attempts: entry.attempts,
                error: entry.last_error.unwrap_or_default(),
            })
            .collect())
    }

    pub async fn state_counts(&self) -> Result<StateCounts, ProgressError> {
        let mut counts = StateCounts::default();
        for entry in self.store.scan_states().await?.values() {
            match entry.state {
                ChunkState::Pending => counts.pending += 1,
                ChunkState::InProgress => counts.in_progress += 1,
                ChunkState::Completed => counts.completed += 1,
                ChunkState::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::sled_store::SledProgressStore;
    use chrono::Utc;
    use model::{
        core::format::{Compression, OutputFormat},
        execution::progress::{ChunkEntry, JobMeta},
    };
    use tempfile::tempdir;

    fn store(dir: &std::path::Path) -> Arc<dyn ProgressStore> {
        Arc::new(SledProgressStore::open(dir, "job-progress").expect("open sled"))
    }

    #[tokio::test]
    async fn unknown_job_is_reported() {
        let dir = tempdir().unwrap();
        let service = ProgressService::new(store(dir.path()));
        let err = service.job_progress().await.unwrap_err();
        assert!(matches!(err, ProgressError::UnknownJob(id) if id == "job-progress"));
    }

    #[tokio::test]
    async fn aggregates_counters_and_states() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let service = ProgressService::new(store.clone());

        store
            .save_job(&JobMeta {
                job_id: "job-progress".into(),
                source: "csv:in.csv".into(),
                destination: "fs:out".into(),
                output_format: OutputFormat::Columnar,
                compression: Compression::Snappy,
                chunk_size: 10,
                total_records: 35,
                total_chunks: 4,
                started_at: Utc::now(),
            })
            .await
            .unwrap();
        for index in 0..4 {
            store.init_if_absent(index, &ChunkEntry::pending()).await.unwrap();
        }
        store
            .complete_chunk(0, &ChunkEntry::completed(10, 1000, None, 1))
            .await
            .unwrap();
        store
            .complete_chunk(1, &ChunkEntry::completed(10, 900, None, 2))
            .await
            .unwrap();
        store
            .fail_chunk(2, &ChunkEntry::failed("connection reset", 3))
            .await
            .unwrap();
        store.set_state(3, &ChunkEntry::in_progress()).await.unwrap();

        let progress = service.job_progress().await.unwrap();
        assert_eq!(progress.completed_count, 2);
        assert_eq!(progress.failed_count, 1);
        assert_eq!(progress.records_transferred, 20);
        assert_eq!(progress.bytes_transferred, 1900);
        assert_eq!(progress.pending_count(), 1);
        assert_eq!(progress.progress_percentage(), 50.0);

        let counts = service.state_counts().await.unwrap();
        assert_eq!(
            counts,
            StateCounts {
                pending: 0,
                in_progress: 1,
                completed: 2,
                failed: 1
            }
        );

        let failed = service.failed_chunks().await.unwrap();
        assert_eq!(
            failed,
            vec![FailedChunk {
                index: 2,
                attempts: 3,
                error: "connection reset".into()
            }]
        );
    }
}
