#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use connectors::{
    error::{AdapterError, SinkError},
    sink::SinkWriter,
    source::SourceReader,
    sql::base::error::DbError,
};
use engine_config::{
    env::EnvManager,
    report::summary::TransferReport,
    settings::{ConfigOverrides, TransferConfig},
};
use engine_core::{
    error::StateStoreError,
    memory::MemoryGuard,
    state::{ProgressStore, sled_store::SledProgressStore},
};
use engine_runtime::{
    error::TransferError,
    execution::{executor::run, factory::Collaborators},
};
use model::{
    execution::progress::{ChunkEntry, Counter, JobMeta},
    records::record::Record,
};
use serde_json::{Value, json};
use std::{
    collections::{BTreeMap, HashMap},
    io,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
};
use tokio_util::sync::CancellationToken;

pub const JOB_ID: &str = "job-scenario";

/// The document stored at `offset` by [`NumberedSource`].
pub fn numbered_record(offset: u64) -> Record {
    Record::from_value(json!({
        "_id": offset,
        "name": format!("doc-{offset}"),
        "score": offset as f64 * 1.5,
        "active": offset % 2 == 0,
    }))
}

/// Source holding `total` generated documents, in offset order.
pub struct NumberedSource {
    total: u64,
    reads: AtomicU64,
}

impl NumberedSource {
    pub fn new(total: u64) -> Self {
        NumberedSource {
            total,
            reads: AtomicU64::new(0),
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceReader for NumberedSource {
    fn name(&self) -> String {
        "memory:numbered".to_string()
    }

    async fn count(&self) -> Result<u64, AdapterError> {
        Ok(self.total)
    }

    async fn read_page(&self, offset: u64, limit: u64) -> Result<Vec<Record>, AdapterError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let end = offset.saturating_add(limit).min(self.total);
        Ok((offset.min(end)..end).map(numbered_record).collect())
    }
}

/// Fails the first `failures` reads with a connection reset, then delegates.
pub struct FlakySource {
    inner: NumberedSource,
    failures: AtomicU32,
}

impl FlakySource {
    pub fn new(total: u64, failures: u32) -> Self {
        FlakySource {
            inner: NumberedSource::new(total),
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl SourceReader for FlakySource {
    fn name(&self) -> String {
        "memory:flaky".to_string()
    }

    async fn count(&self) -> Result<u64, AdapterError> {
        self.inner.count().await
    }

    async fn read_page(&self, offset: u64, limit: u64) -> Result<Vec<Record>, AdapterError> {
        let left = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if left.is_ok() {
            return Err(AdapterError::Database(DbError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))));
        }
        self.inner.read_page(offset, limit).await
    }
}

/// Counts fine but every page is undecodable.
pub struct BrokenSource {
    pub total: u64,
}

#[async_trait]
impl SourceReader for BrokenSource {
    fn name(&self) -> String {
        "memory:broken".to_string()
    }

    async fn count(&self) -> Result<u64, AdapterError> {
        Ok(self.total)
    }

    async fn read_page(&self, offset: u64, _limit: u64) -> Result<Vec<Record>, AdapterError> {
        Err(AdapterError::MalformedRecord {
            offset,
            message: "invalid BSON document".to_string(),
        })
    }
}

/// Blob store kept in memory.
#[derive(Default)]
pub struct MemorySink {
    blobs: Mutex<BTreeMap<String, Bytes>>,
    writes: AtomicU64,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts a blob in place without counting it as a write.
    pub fn preload(&self, blob: &str, data: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(blob.to_string(), Bytes::copy_from_slice(data));
    }

    pub fn names(&self) -> Vec<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }

    pub fn get(&self, blob: &str) -> Option<Bytes> {
        self.blobs.lock().unwrap().get(blob).cloned()
    }

    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SinkWriter for MemorySink {
    fn name(&self) -> String {
        "memory".to_string()
    }

    async fn exists(&self, blob: &str) -> Result<bool, SinkError> {
        Ok(self.blobs.lock().unwrap().contains_key(blob))
    }

    async fn write(&self, blob: &str, data: Bytes) -> Result<(), SinkError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.blobs.lock().unwrap().insert(blob.to_string(), data);
        Ok(())
    }
}

/// Times out the first `failures` writes, then delegates.
pub struct FlakySink {
    pub inner: MemorySink,
    failures: AtomicU32,
}

impl FlakySink {
    pub fn new(failures: u32) -> Self {
        FlakySink {
            inner: MemorySink::new(),
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl SinkWriter for FlakySink {
    fn name(&self) -> String {
        "memory:flaky".to_string()
    }

    async fn exists(&self, blob: &str) -> Result<bool, SinkError> {
        self.inner.exists(blob).await
    }

    async fn write(&self, blob: &str, data: Bytes) -> Result<(), SinkError> {
        let left = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if left.is_ok() {
            return Err(SinkError::Timeout(format!("put {blob}")));
        }
        self.inner.write(blob, data).await
    }
}

/// Progress store that goes down for good after a number of chunk
/// transitions. Startup calls (`ping`, `save_job`, `init_if_absent`) are not
/// counted.
pub struct FlakyStore {
    inner: SledProgressStore,
    transitions_left: AtomicU32,
    down: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: SledProgressStore, transitions_before_outage: u32) -> Self {
        FlakyStore {
            inner,
            transitions_left: AtomicU32::new(transitions_before_outage),
            down: AtomicBool::new(false),
        }
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StateStoreError> {
        if self.is_down() {
            Err(StateStoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn transition(&self) -> Result<(), StateStoreError> {
        self.check()?;
        let left = self
            .transitions_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if left.is_err() {
            self.down.store(true, Ordering::SeqCst);
        }
        self.check()
    }
}

#[async_trait]
impl ProgressStore for FlakyStore {
    fn job_id(&self) -> &str {
        self.inner.job_id()
    }

    async fn ping(&self) -> Result<(), StateStoreError> {
        self.check()?;
        self.inner.ping().await
    }

    async fn save_job(&self, meta: &JobMeta) -> Result<(), StateStoreError> {
        self.check()?;
        self.inner.save_job(meta).await
    }

    async fn load_job(&self) -> Result<Option<JobMeta>, StateStoreError> {
        self.check()?;
        self.inner.load_job().await
    }

    async fn init_if_absent(
        &self,
        index: u64,
        entry: &ChunkEntry,
    ) -> Result<bool, StateStoreError> {
        self.check()?;
        self.inner.init_if_absent(index, entry).await
    }

    async fn get_state(&self, index: u64) -> Result<Option<ChunkEntry>, StateStoreError> {
        self.check()?;
        self.inner.get_state(index).await
    }

    async fn set_state(&self, index: u64, entry: &ChunkEntry) -> Result<(), StateStoreError> {
        self.transition()?;
        self.inner.set_state(index, entry).await
    }

    async fn atomic_increment(
        &self,
        counter: Counter,
        delta: i64,
    ) -> Result<i64, StateStoreError> {
        self.transition()?;
        self.inner.atomic_increment(counter, delta).await
    }

    async fn counter(&self, counter: Counter) -> Result<i64, StateStoreError> {
        self.check()?;
        self.inner.counter(counter).await
    }

    async fn scan_states(&self) -> Result<BTreeMap<u64, ChunkEntry>, StateStoreError> {
        self.check()?;
        self.inner.scan_states().await
    }

    async fn complete_chunk(
        &self,
        index: u64,
        entry: &ChunkEntry,
    ) -> Result<bool, StateStoreError> {
        self.transition()?;
        self.inner.complete_chunk(index, entry).await
    }

    async fn fail_chunk(&self, index: u64, entry: &ChunkEntry) -> Result<bool, StateStoreError> {
        self.transition()?;
        self.inner.fail_chunk(index, entry).await
    }

    async fn reset_chunk(&self, index: u64) -> Result<bool, StateStoreError> {
        self.transition()?;
        self.inner.reset_chunk(index).await
    }
}

/// Configuration for in-memory scenarios: JSON Lines, no compression, fast
/// retries and the memory guard off.
pub fn test_config(state_dir: &Path, chunk_size: i64, workers: usize) -> Arc<TransferConfig> {
    test_config_with(state_dir, &[
        ("CHUNK_SIZE", chunk_size.to_string()),
        ("MAX_WORKERS", workers.to_string()),
    ])
}

pub fn test_config_with(state_dir: &Path, extra: &[(&str, String)]) -> Arc<TransferConfig> {
    let mut vars: HashMap<String, String> = [
        ("SOURCE_KIND", "csv".to_string()),
        ("SOURCE_URL", "memory".to_string()),
        ("SINK_KIND", "fs".to_string()),
        ("SINK_PATH", state_dir.join("blobs").display().to_string()),
        ("OUTPUT_FORMAT", "jsonl".to_string()),
        ("COMPRESSION", "none".to_string()),
        ("MAX_RETRIES", "4".to_string()),
        ("RETRY_DELAY_MS", "1".to_string()),
        ("RETRY_MAX_DELAY_MS", "5".to_string()),
        ("MAX_MEMORY_USAGE_GB", "0".to_string()),
        ("STATE_PATH", state_dir.join("state").display().to_string()),
        ("JOB_ID", JOB_ID.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    for (key, value) in extra {
        vars.insert(key.to_string(), value.clone());
    }

    let env = EnvManager::from_vars(vars);
    Arc::new(TransferConfig::load(&env, &ConfigOverrides::default()).expect("valid test config"))
}

pub fn open_store(config: &TransferConfig) -> SledProgressStore {
    SledProgressStore::open(&config.state_path, config.resolved_job_id()).expect("open sled store")
}

pub fn collaborators(
    source: Arc<dyn SourceReader>,
    sink: Arc<dyn SinkWriter>,
    store: Arc<dyn ProgressStore>,
) -> Collaborators {
    Collaborators {
        source,
        sink,
        store,
        guard: MemoryGuard::disabled(),
    }
}

pub async fn try_transfer(
    config: &Arc<TransferConfig>,
    parts: Collaborators,
) -> Result<TransferReport, TransferError> {
    run(config.clone(), parts, CancellationToken::new()).await
}

/// Runs a transfer, panicking if the run as a whole fails.
pub async fn transfer(config: &Arc<TransferConfig>, parts: Collaborators) -> TransferReport {
    try_transfer(config, parts).await.expect("transfer run")
}

pub fn jsonl_lines(data: &[u8]) -> Vec<Value> {
    std::str::from_utf8(data)
        .expect("utf-8 blob")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

pub fn blob(index: u64) -> String {
    format!("export/chunk_{index:06}.jsonl")
}
