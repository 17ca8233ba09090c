use engine_core::{error::StateStoreError, state::ProgressStore};
use model::execution::progress::ChunkEntry;
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicBool, Ordering},
};
use tracing::warn;

/// Funnels every store write of a run.
///
/// The first failed write switches the tracker to degraded mode. Later writes
/// are still attempted, their failures are logged, and chunk processing is
/// never interrupted by the store.
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    degraded: AtomicBool,
    first_error: OnceLock<String>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        ProgressTracker {
            store,
            degraded: AtomicBool::new(false),
            first_error: OnceLock::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn first_error(&self) -> Option<&str> {
        self.first_error.get().map(String::as_str)
    }

    fn record_failure(&self, op: &str, index: u64, err: &StateStoreError) {
        let message = format!("{op} for chunk {index}: {err}");
        if self.first_error.set(message.clone()).is_ok() {
            self.degraded.store(true, Ordering::SeqCst);
            warn!(
                chunk = index,
                error = %err,
                "Progress store write failed, continuing with degraded progress tracking"
            );
        } else {
            warn!(chunk = index, error = %err, "Progress store write failed ({op})");
        }
    }

    /// Best effort; the claim is only for observability.
    pub async fn mark_in_progress(&self, index: u64) {
        if let Err(err) = self.store.set_state(index, &ChunkEntry::in_progress()).await {
            self.record_failure("mark in_progress", index, &err);
        }
    }

    /// Returns whether counters were applied, or `None` when the store
    /// could not be written.
    pub async fn complete(&self, index: u64, entry: &ChunkEntry) -> Option<bool> {
        match self.store.complete_chunk(index, entry).await {
            Ok(applied) => Some(applied),
            Err(err) => {
                self.record_failure("complete", index, &err);
                None
            }
        }
    }

    pub async fn fail(&self, index: u64, entry: &ChunkEntry) -> Option<bool> {
        match self.store.fail_chunk(index, entry).await {
            Ok(applied) => Some(applied),
            Err(err) => {
                self.record_failure("fail", index, &err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engine_core::state::sled_store::SledProgressStore;
    use model::{
        core::chunk::ChunkState,
        execution::progress::{Counter, JobMeta},
    };
    use std::collections::BTreeMap;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    struct DownStore;

    fn down() -> StateStoreError {
        StateStoreError::Unavailable("connection refused".into())
    }

    #[async_trait]
    impl ProgressStore for DownStore {
        fn job_id(&self) -> &str {
            "job-down"
        }
        async fn ping(&self) -> Result<(), StateStoreError> {
            Err(down())
        }
        async fn save_job(&self, _: &JobMeta) -> Result<(), StateStoreError> {
            Err(down())
        }
        async fn load_job(&self) -> Result<Option<JobMeta>, StateStoreError> {
            Err(down())
        }
        async fn init_if_absent(&self, _: u64, _: &ChunkEntry) -> Result<bool, StateStoreError> {
            Err(down())
        }
        async fn get_state(&self, _: u64) -> Result<Option<ChunkEntry>, StateStoreError> {
            Err(down())
        }
        async fn set_state(&self, _: u64, _: &ChunkEntry) -> Result<(), StateStoreError> {
            Err(down())
        }
        async fn atomic_increment(&self, _: Counter, _: i64) -> Result<i64, StateStoreError> {
            Err(down())
        }
        async fn counter(&self, _: Counter) -> Result<i64, StateStoreError> {
            Err(down())
        }
        async fn scan_states(&self) -> Result<BTreeMap<u64, ChunkEntry>, StateStoreError> {
            Err(down())
        }
        async fn complete_chunk(&self, _: u64, _: &ChunkEntry) -> Result<bool, StateStoreError> {
            Err(down())
        }
        async fn fail_chunk(&self, _: u64, _: &ChunkEntry) -> Result<bool, StateStoreError> {
            Err(down())
        }
        async fn reset_chunk(&self, _: u64) -> Result<bool, StateStoreError> {
            Err(down())
        }
    }

    #[tokio::test]
    async fn healthy_store_is_written_through() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ProgressStore> =
            Arc::new(SledProgressStore::open(dir.path(), "job-t").unwrap());
        let tracker = ProgressTracker::new(store.clone());

        tracker.mark_in_progress(0).await;
        assert_eq!(
            store.get_state(0).await.unwrap().unwrap().state,
            ChunkState::InProgress
        );

        let entry = ChunkEntry::completed(5, 50, None, 1);
        assert_eq!(tracker.complete(0, &entry).await, Some(true));
        assert_eq!(tracker.complete(0, &entry).await, Some(false));
        assert!(!tracker.is_degraded());
    }

    #[tokio::test]
    #[traced_test]
    async fn first_failure_switches_to_degraded_mode() {
        let tracker = ProgressTracker::new(Arc::new(DownStore));

        tracker.mark_in_progress(4).await;
        assert!(tracker.is_degraded());
        assert_eq!(tracker.complete(4, &ChunkEntry::completed(1, 1, None, 1)).await, None);
        assert_eq!(tracker.fail(5, &ChunkEntry::failed("x", 1)).await, None);

        let first = tracker.first_error().unwrap();
        assert!(first.starts_with("mark in_progress for chunk 4"), "{first}");
        assert!(logs_contain("degraded progress tracking"));
    }
}
