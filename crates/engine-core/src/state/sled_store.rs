use crate::{error::StateStoreError, state::ProgressStore};
use async_trait::async_trait;
use model::{
    core::chunk::ChunkState,
    execution::progress::{ChunkEntry, Counter, JobMeta},
};
use serde::{Serialize, de::DeserializeOwned};
use sled::{
    IVec,
    transaction::{ConflictableTransactionError, TransactionError, TransactionalTree},
};
use std::{collections::BTreeMap, path::Path};
use tracing::debug;

type TxResult<T> = Result<T, ConflictableTransactionError<StateStoreError>>;

pub struct SledProgressStore {
    db: sled::Db,
    job_id: String,
}

impl SledProgressStore {
    pub fn open(path: impl AsRef<Path>, job_id: impl Into<String>) -> Result<Self, StateStoreError> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|e| match e {
            // sled reports a held file lock as a plain I/O error.
            sled::Error::Io(ref io) if io.to_string().contains("could not acquire lock") => {
                StateStoreError::Locked(path.display().to_string())
            }
            other => {
                StateStoreError::Unavailable(format!("cannot open {}: {other}", path.display()))
            }
        })?;
        Ok(Self {
            db,
            job_id: job_id.into(),
        })
    }

    /// Ids of every job with a plan header in this database.
    pub fn job_ids(&self) -> Result<Vec<String>, StateStoreError> {
        let mut jobs = Vec::new();
        for item in self.db.scan_prefix("job:") {
            let (key, _) = item?;
            let key = String::from_utf8_lossy(&key);
            if let Some(id) = key
                .strip_prefix("job:")
                .and_then(|rest| rest.strip_suffix(":meta"))
            {
                jobs.push(id.to_string());
            }
        }
        Ok(jobs)
    }

    #[inline]
    fn meta_key(&self) -> String {
        format!("job:{}:meta", self.job_id)
    }

    #[inline]
    fn chunk_prefix(&self) -> String {
        format!("job:{}:chunk:", self.job_id)
    }

    /// Zero padded so that lexical order matches chunk order.
    #[inline]
    fn chunk_key(&self, index: u64) -> String {
        format!("job:{}:chunk:{:010}", self.job_id, index)
    }

    #[inline]
    fn counter_key(&self, counter: Counter) -> String {
        format!("job:{}:counter:{}", self.job_id, counter.as_str())
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StateStoreError> {
        bincode::serialize(value).map_err(|e| StateStoreError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StateStoreError> {
        bincode::deserialize(bytes).map_err(|e| StateStoreError::Decode {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    fn decode_counter(key: &str, bytes: Option<IVec>) -> Result<i64, StateStoreError> {
        match bytes {
            None => Ok(0),
            Some(raw) => {
                let arr: [u8; 8] = raw[..]
                    .try_into()
                    .map_err(|_| StateStoreError::CorruptCounter(key.to_string()))?;
                Ok(i64::from_be_bytes(arr))
            }
        }
    }

    fn tx_entry(tx: &TransactionalTree, key: &str) -> TxResult<Option<ChunkEntry>> {
        match tx.get(key)? {
            Some(bytes) => Self::decode(key, &bytes)
                .map(Some)
                .map_err(ConflictableTransactionError::Abort),
            None => Ok(None),
        }
    }

    fn tx_add(tx: &TransactionalTree, key: &str, delta: i64) -> TxResult<i64> {
        let current =
            Self::decode_counter(key, tx.get(key)?).map_err(ConflictableTransactionError::Abort)?;
        let next = current + delta;
        tx.insert(key, &next.to_be_bytes()[..])?;
        Ok(next)
    }

    /// Runs `f` inside a sled transaction, unwrapping sled's error layers.
    fn transact<T, F>(&self, f: F) -> Result<T, StateStoreError>
    where
        F: Fn(&TransactionalTree) -> TxResult<T>,
    {
        self.db.transaction(f).map_err(|e| match e {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => StateStoreError::Storage(err),
        })
    }
}

#[async_trait]
impl ProgressStore for SledProgressStore {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    async fn ping(&self) -> Result<(), StateStoreError> {
        self.db
            .get(self.meta_key())
            .map_err(|e| StateStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn save_job(&self, meta: &JobMeta) -> Result<(), StateStoreError> {
        let bytes = Self::encode(meta)?;
        self.db.insert(self.meta_key(), bytes)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn load_job(&self) -> Result<Option<JobMeta>, StateStoreError> {
        let key = self.meta_key();
        match self.db.get(&key)? {
            Some(bytes) => Ok(Some(Self::decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn init_if_absent(
        &self,
        index: u64,
        entry: &ChunkEntry,
    ) -> Result<bool, StateStoreError> {
        let key = self.chunk_key(index);
        let bytes = Self::encode(entry)?;
        let swapped = self
            .db
            .compare_and_swap(&key, None as Option<&[u8]>, Some(bytes))?;
        Ok(swapped.is_ok())
    }

    async fn get_state(&self, index: u64) -> Result<Option<ChunkEntry>, StateStoreError> {
        let key = self.chunk_key(index);
        match self.db.get(&key)? {
            Some(bytes) => Ok(Some(Self::decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn set_state(&self, index: u64, entry: &ChunkEntry) -> Result<(), StateStoreError> {
        let bytes = Self::encode(entry)?;
        self.db.insert(self.chunk_key(index), bytes)?;
        Ok(())
    }

    async fn atomic_increment(
        &self,
        counter: Counter,
        delta: i64,
    ) -> Result<i64, StateStoreError> {
        let key = self.counter_key(counter);
        self.transact(|tx| Self::tx_add(tx, &key, delta))
    }

    async fn counter(&self, counter: Counter) -> Result<i64, StateStoreError> {
        let key = self.counter_key(counter);
        Self::decode_counter(&key, self.db.get(&key)?)
    }

    async fn scan_states(&self) -> Result<BTreeMap<u64, ChunkEntry>, StateStoreError> {
        let prefix = self.chunk_prefix();
        let mut states = BTreeMap::new();

        for item in self.db.scan_prefix(&prefix) {
            let (key, value) = item?;
            let key = String::from_utf8_lossy(&key).into_owned();
            let index = key[prefix.len()..]
                .parse::<u64>()
                .map_err(|e| StateStoreError::Decode {
                    key: key.clone(),
                    message: e.to_string(),
                })?;
            states.insert(index, Self::decode(&key, &value)?);
        }

        Ok(states)
    }

    async fn complete_chunk(
        &self,
        index: u64,
        entry: &ChunkEntry,
    ) -> Result<bool, StateStoreError> {
        let key = self.chunk_key(index);
        let bytes = Self::encode(entry)?;
        let completed = self.counter_key(Counter::CompletedCount);
        let failed = self.counter_key(Counter::FailedCount);
        let records = self.counter_key(Counter::RecordsTransferred);
        let size = self.counter_key(Counter::BytesTransferred);

        let applied = self.transact(|tx| {
            let previous = Self::tx_entry(tx, &key)?;
            match previous.as_ref().map(|e| e.state) {
                Some(ChunkState::Completed) => return Ok(false),
                Some(ChunkState::Failed) => {
                    Self::tx_add(tx, &failed, -1)?;
                }
                _ => {}
            }

            tx.insert(key.as_str(), bytes.as_slice())?;
            Self::tx_add(tx, &completed, 1)?;
            Self::tx_add(tx, &records, entry.record_count as i64)?;
            Self::tx_add(tx, &size, entry.byte_size as i64)?;
            Ok(true)
        })?;

        if !applied {
            debug!(chunk = index, "Chunk already completed, counters unchanged");
        }
        Ok(applied)
    }

    async fn fail_chunk(&self, index: u64, entry: &ChunkEntry) -> Result<bool, StateStoreError> {
        let key = self.chunk_key(index);
        let bytes = Self::encode(entry)?;
        let failed = self.counter_key(Counter::FailedCount);

        self.transact(|tx| {
            let previous = Self::tx_entry(tx, &key)?;
            if previous.as_ref().is_some_and(|e| e.state.is_terminal()) {
                return Ok(false);
            }

            tx.insert(key.as_str(), bytes.as_slice())?;
            Self::tx_add(tx, &failed, 1)?;
            Ok(true)
        })
    }

    async fn reset_chunk(&self, index: u64) -> Result<bool, StateStoreError> {
        let key = self.chunk_key(index);
        let bytes = Self::encode(&ChunkEntry::pending())?;
        let failed = self.counter_key(Counter::FailedCount);

        self.transact(|tx| {
            let previous = Self::tx_entry(tx, &key)?;
            if previous.as_ref().map(|e| e.state) != Some(ChunkState::Failed) {
                return Ok(false);
            }

            tx.insert(key.as_str(), bytes.as_slice())?;
            Self::tx_add(tx, &failed, -1)?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use model::core::format::{Compression, OutputFormat};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn open(dir: &Path) -> SledProgressStore {
        SledProgressStore::open(dir, "job-test").unwrap()
    }

    fn meta() -> JobMeta {
        JobMeta {
            job_id: "job-test".into(),
            source: "csv:users.csv".into(),
            destination: "fs:/tmp/out".into(),
            output_format: OutputFormat::LineDelimited,
            compression: Compression::None,
            chunk_size: 10,
            total_records: 25,
            total_chunks: 3,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn second_open_reports_the_held_lock() {
        let dir = tempdir().unwrap();
        let _running = open(dir.path());
        let err = SledProgressStore::open(dir.path(), "job-test").err().unwrap();
        assert!(matches!(err, StateStoreError::Locked(_)), "{err}");
    }

    #[tokio::test]
    async fn job_meta_round_trips_and_is_listed() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        assert!(store.load_job().await.unwrap().is_none());
        store.save_job(&meta()).await.unwrap();
        store.init_if_absent(0, &ChunkEntry::pending()).await.unwrap();

        assert_eq!(store.load_job().await.unwrap().unwrap().total_chunks, 3);
        assert_eq!(store.job_ids().unwrap(), vec!["job-test".to_string()]);
    }

    #[tokio::test]
    async fn init_if_absent_never_overwrites() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        assert!(store.init_if_absent(0, &ChunkEntry::pending()).await.unwrap());
        store
            .set_state(0, &ChunkEntry::completed(10, 100, None, 1))
            .await
            .unwrap();
        assert!(!store.init_if_absent(0, &ChunkEntry::pending()).await.unwrap());

        let entry = store.get_state(0).await.unwrap().unwrap();
        assert_eq!(entry.state, ChunkState::Completed);
    }

    #[tokio::test]
    async fn scan_returns_chunks_in_index_order() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        for index in [11, 2, 100, 0] {
            store.init_if_absent(index, &ChunkEntry::pending()).await.unwrap();
        }
        store.save_job(&meta()).await.unwrap();
        store.atomic_increment(Counter::FailedCount, 1).await.unwrap();

        let keys: Vec<u64> = store.scan_states().await.unwrap().into_keys().collect();
        assert_eq!(keys, vec![0, 2, 11, 100]);
    }

    #[tokio::test]
    async fn jobs_do_not_see_each_other() {
        let dir = tempdir().unwrap();
        let db_a = open(dir.path());
        let db_b = SledProgressStore {
            db: db_a.db.clone(),
            job_id: "job-other".into(),
        };

        db_a.init_if_absent(0, &ChunkEntry::pending()).await.unwrap();
        db_a.atomic_increment(Counter::CompletedCount, 5).await.unwrap();

        assert!(db_b.scan_states().await.unwrap().is_empty());
        assert_eq!(db_b.counter(Counter::CompletedCount).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn completion_counts_exactly_once() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let entry = ChunkEntry::completed(10, 512, Some("chunk_000000.jsonl".into()), 1);

        assert!(store.complete_chunk(0, &entry).await.unwrap());
        assert!(!store.complete_chunk(0, &entry).await.unwrap());

        assert_eq!(store.counter(Counter::CompletedCount).await.unwrap(), 1);
        assert_eq!(store.counter(Counter::RecordsTransferred).await.unwrap(), 10);
        assert_eq!(store.counter(Counter::BytesTransferred).await.unwrap(), 512);
    }

    #[tokio::test]
    async fn concurrent_completions_of_one_chunk_count_once() {
        let dir = tempdir().unwrap();
        let store = Arc::new(open(dir.path()));
        store.init_if_absent(7, &ChunkEntry::pending()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .complete_chunk(7, &ChunkEntry::completed(3, 30, None, 1))
                    .await
                    .unwrap()
            }));
        }

        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(store.counter(Counter::RecordsTransferred).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn fail_then_reset_balances_failed_count() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store.init_if_absent(1, &ChunkEntry::pending()).await.unwrap();

        assert!(store.fail_chunk(1, &ChunkEntry::failed("timeout", 3)).await.unwrap());
        assert!(!store.fail_chunk(1, &ChunkEntry::failed("again", 3)).await.unwrap());
        assert_eq!(store.counter(Counter::FailedCount).await.unwrap(), 1);

        assert!(store.reset_chunk(1).await.unwrap());
        assert!(!store.reset_chunk(1).await.unwrap());
        assert_eq!(store.counter(Counter::FailedCount).await.unwrap(), 0);

        let entry = store.get_state(1).await.unwrap().unwrap();
        assert_eq!(entry.state, ChunkState::Pending);
        assert!(entry.last_error.is_none());
    }

    #[tokio::test]
    async fn completed_chunk_cannot_fail() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        store
            .complete_chunk(0, &ChunkEntry::completed(1, 1, None, 1))
            .await
            .unwrap();
        assert!(!store.fail_chunk(0, &ChunkEntry::failed("late", 1)).await.unwrap());
        assert_eq!(store.counter(Counter::FailedCount).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn counters_accept_negative_deltas() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        assert_eq!(store.atomic_increment(Counter::FailedCount, 2).await.unwrap(), 2);
        assert_eq!(store.atomic_increment(Counter::FailedCount, -3).await.unwrap(), -1);
    }
}
