use crate::error::TransferError;
use engine_core::state::ProgressStore;
use model::core::chunk::ChunkState;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetOutcome {
    /// Chunks moved back to pending.
    pub reset: Vec<u64>,
    /// Requested chunks that were unknown or not failed.
    pub skipped: Vec<u64>,
}

/// Re-arms failed chunks so the next run processes them again.
///
/// With no `indices` every failed chunk of the job is reset.
pub async fn reset_failed(
    store: &dyn ProgressStore,
    indices: Option<&[u64]>,
) -> Result<ResetOutcome, TransferError> {
    let states = store.scan_states().await?;
    let targets: Vec<u64> = match indices {
        Some(indices) => indices.to_vec(),
        None => states
            .iter()
            .filter(|(_, entry)| entry.state == ChunkState::Failed)
            .map(|(index, _)| *index)
            .collect(),
    };

    let mut outcome = ResetOutcome::default();
    for index in targets {
        if store.reset_chunk(index).await? {
            outcome.reset.push(index);
        } else {
            let state = states.get(&index).map(|e| e.state.as_str()).unwrap_or("unknown");
            warn!(chunk = index, state, "Chunk is not failed, not reset");
            outcome.skipped.push(index);
        }
    }

    info!(
        job_id = store.job_id(),
        reset = outcome.reset.len(),
        skipped = outcome.skipped.len(),
        "Reset failed chunks"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::state::sled_store::SledProgressStore;
    use model::execution::progress::{ChunkEntry, Counter};

    async fn store_with_failures(dir: &std::path::Path) -> SledProgressStore {
        let store = SledProgressStore::open(dir, "job-reset").unwrap();
        store
            .complete_chunk(0, &ChunkEntry::completed(10, 10, None, 1))
            .await
            .unwrap();
        store.fail_chunk(1, &ChunkEntry::failed("timeout", 3)).await.unwrap();
        store.fail_chunk(2, &ChunkEntry::failed("timeout", 3)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn resets_every_failed_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_failures(dir.path()).await;

        let outcome = reset_failed(&store, None).await.unwrap();
        assert_eq!(outcome.reset, vec![1, 2]);
        assert!(outcome.skipped.is_empty());
        assert_eq!(store.counter(Counter::FailedCount).await.unwrap(), 0);

        let entry = store.get_state(1).await.unwrap().unwrap();
        assert_eq!(entry.state, ChunkState::Pending);
        assert_eq!(entry.last_error, None);
    }

    #[tokio::test]
    async fn named_chunks_that_are_not_failed_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_failures(dir.path()).await;

        let outcome = reset_failed(&store, Some(&[0, 2, 99])).await.unwrap();
        assert_eq!(outcome.reset, vec![2]);
        assert_eq!(outcome.skipped, vec![0, 99]);
        assert_eq!(store.counter(Counter::FailedCount).await.unwrap(), 1);
        assert_eq!(
            store.get_state(0).await.unwrap().unwrap().state,
            ChunkState::Completed
        );
    }
}
