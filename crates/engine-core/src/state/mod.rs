use crate::error::StateStoreError;
use async_trait::async_trait;
use model::execution::progress::{ChunkEntry, Counter, JobMeta};
use std::collections::BTreeMap;

pub mod sled_store;

/// Persistent, job-scoped progress state shared by all workers of a run.
///
/// Aggregate counters only move through `atomic_increment` or one of the
/// transition methods, which apply the entry change and its counter deltas
/// as a single atomic step.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    fn job_id(&self) -> &str;

    async fn ping(&self) -> Result<(), StateStoreError>;

    async fn save_job(&self, meta: &JobMeta) -> Result<(), StateStoreError>;

    async fn load_job(&self) -> Result<Option<JobMeta>, StateStoreError>;

    /// Stores `entry` unless the chunk already has one. Returns whether it
    /// was written.
    async fn init_if_absent(&self, index: u64, entry: &ChunkEntry)
    -> Result<bool, StateStoreError>;

    async fn get_state(&self, index: u64) -> Result<Option<ChunkEntry>, StateStoreError>;

    /// Unconditional overwrite. Counters are left untouched.
    async fn set_state(&self, index: u64, entry: &ChunkEntry) -> Result<(), StateStoreError>;

    async fn atomic_increment(&self, counter: Counter, delta: i64)
    -> Result<i64, StateStoreError>;

    async fn counter(&self, counter: Counter) -> Result<i64, StateStoreError>;

    async fn scan_states(&self) -> Result<BTreeMap<u64, ChunkEntry>, StateStoreError>;

    /// Records a completed chunk and adds its records and bytes to the
    /// totals. A chunk that is already completed is left as is and `false`
    /// is returned.
    async fn complete_chunk(&self, index: u64, entry: &ChunkEntry)
    -> Result<bool, StateStoreError>;

    /// Records a failed chunk. Completed or already failed chunks are left as
    /// is and `false` is returned.
    async fn fail_chunk(&self, index: u64, entry: &ChunkEntry) -> Result<bool, StateStoreError>;

    /// Moves a failed chunk back to pending. Returns `false` for any other
    /// state.
    async fn reset_chunk(&self, index: u64) -> Result<bool, StateStoreError>;
}
