use crate::{error::ChunkError, retry::classify_chunk_error, tracker::ProgressTracker};
use bytes::Bytes;
use connectors::{sink::SinkWriter, source::SourceReader};
use engine_core::{retry::RetryPolicy, serializer::serialize};
use model::{
    core::{
        chunk::Chunk,
        format::{Compression, OutputFormat},
    },
    execution::{progress::ChunkEntry, result::WorkerResult},
    records::record::Record,
};
use planner::naming::blob_name;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What one successful attempt did with a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Delivery {
    /// The source returned nothing for the range.
    Empty,
    Written { records: u64, bytes: u64 },
    /// The blob was already at the sink.
    AlreadyPresent { records: u64, bytes: u64 },
}

#[derive(Debug, Clone)]
pub struct BlobLayout {
    pub prefix: String,
    pub format: OutputFormat,
    pub compression: Compression,
}

impl BlobLayout {
    pub fn blob_name(&self, index: u64) -> String {
        blob_name(&self.prefix, index, self.format, self.compression)
    }
}

/// Read, serialize and write of a single chunk, followed by its progress
/// update.
pub struct ChunkPipeline {
    source: Arc<dyn SourceReader>,
    sink: Arc<dyn SinkWriter>,
    tracker: Arc<ProgressTracker>,
    retry: RetryPolicy,
    layout: BlobLayout,
}

impl ChunkPipeline {
    pub fn new(
        source: Arc<dyn SourceReader>,
        sink: Arc<dyn SinkWriter>,
        tracker: Arc<ProgressTracker>,
        retry: RetryPolicy,
        layout: BlobLayout,
    ) -> Self {
        ChunkPipeline {
            source,
            sink,
            tracker,
            retry,
            layout,
        }
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Processes the chunk to a terminal state. Never returns an error: the
    /// outcome is carried by the result and recorded in the store.
    pub async fn process(&self, chunk: &Chunk) -> WorkerResult {
        self.tracker.mark_in_progress(chunk.index).await;
        let blob = self.layout.blob_name(chunk.index);

        let outcome = self
            .retry
            .run(|| self.attempt(chunk, &blob), classify_chunk_error)
            .await;

        match outcome {
            Ok(done) => {
                let attempts = done.attempts;
                let (records, bytes, blob_name, skipped) = match done.value {
                    Delivery::Empty => {
                        warn!(chunk = chunk.index, "Source returned no records, nothing to write");
                        (0, 0, None, false)
                    }
                    Delivery::Written { records, bytes } => (records, bytes, Some(blob), false),
                    Delivery::AlreadyPresent { records, bytes } => {
                        (records, bytes, Some(blob), true)
                    }
                };

                let entry = ChunkEntry::completed(records, bytes, blob_name.clone(), attempts);
                if self.tracker.complete(chunk.index, &entry).await == Some(false) {
                    debug!(chunk = chunk.index, "Chunk was already recorded as completed");
                }

                info!(
                    chunk = chunk.index,
                    records,
                    bytes,
                    attempts,
                    skipped_upload = skipped,
                    blob = blob_name.as_deref().unwrap_or("-"),
                    "Chunk completed"
                );
                WorkerResult::success(chunk.index, records, bytes, attempts)
                    .with_skipped_upload(skipped)
            }
            Err(err) => {
                let attempts = err.attempts();
                let message = err.to_string();
                error!(chunk = chunk.index, attempts, error = %message, "Chunk failed");

                self.tracker
                    .fail(chunk.index, &ChunkEntry::failed(message.clone(), attempts))
                    .await;
                WorkerResult::failure(chunk.index, message, attempts)
            }
        }
    }

    async fn attempt(&self, chunk: &Chunk, blob: &str) -> Result<Delivery, ChunkError> {
        let records = self
            .source
            .read_page(chunk.start_offset, chunk.size)
            .await
            .map_err(|source| ChunkError::Read {
                index: chunk.index,
                source,
            })?;

        if records.is_empty() {
            return Ok(Delivery::Empty);
        }

        let count = records.len() as u64;
        if count != chunk.size {
            warn!(
                chunk = chunk.index,
                expected = chunk.size,
                actual = count,
                "Short read, recording actual record count"
            );
        }

        let body = self.encode(chunk.index, records).await?;
        let size = body.len() as u64;

        let present = self
            .sink
            .exists(blob)
            .await
            .map_err(|source| ChunkError::Exists {
                blob: blob.to_string(),
                source,
            })?;
        if present {
            info!(chunk = chunk.index, blob, "Blob already present, skipping upload");
            return Ok(Delivery::AlreadyPresent {
                records: count,
                bytes: size,
            });
        }

        self.sink
            .write(blob, body)
            .await
            .map_err(|source| ChunkError::Write {
                blob: blob.to_string(),
                source,
            })?;

        Ok(Delivery::Written {
            records: count,
            bytes: size,
        })
    }

    /// Serialization is CPU bound and runs off the async workers.
    async fn encode(
        &self,
        index: u64,
        records: Vec<Record>,
    ) -> Result<Bytes, ChunkError> {
        let format = self.layout.format;
        let compression = self.layout.compression;
        tokio::task::spawn_blocking(move || serialize(&records, format, compression))
            .await
            .map_err(|e| ChunkError::Task {
                index,
                message: e.to_string(),
            })?
            .map_err(|source| ChunkError::Serialize { index, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connectors::error::{AdapterError, SinkError};
    use engine_core::state::{ProgressStore, sled_store::SledProgressStore};
    use model::{core::chunk::ChunkState, execution::progress::Counter};
    use serde_json::json;
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };
    use tempfile::tempdir;

    struct RangeSource {
        total: u64,
        transient_failures: AtomicU32,
        malformed: bool,
    }

    impl RangeSource {
        fn new(total: u64) -> Self {
            RangeSource {
                total,
                transient_failures: AtomicU32::new(0),
                malformed: false,
            }
        }
    }

    #[async_trait]
    impl SourceReader for RangeSource {
        fn name(&self) -> String {
            "range".into()
        }

        async fn count(&self) -> Result<u64, AdapterError> {
            Ok(self.total)
        }

        async fn read_page(&self, offset: u64, limit: u64) -> Result<Vec<Record>, AdapterError> {
            if self.malformed {
                return Err(AdapterError::MalformedRecord {
                    offset,
                    message: "not a document".into(),
                });
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AdapterError::Database(
                    connectors::sql::base::error::DbError::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "reset",
                    )),
                ));
            }
            let end = (offset + limit).min(self.total);
            Ok((offset..end)
                .map(|i| Record::from_value(json!({"id": i})))
                .collect())
        }
    }

    #[derive(Default)]
    struct MapSink {
        blobs: Mutex<HashMap<String, Bytes>>,
        writes: AtomicU32,
    }

    #[async_trait]
    impl SinkWriter for MapSink {
        fn name(&self) -> String {
            "map".into()
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

    fn pipeline(
        source: RangeSource,
        sink: Arc<MapSink>,
        store: Arc<dyn ProgressStore>,
    ) -> ChunkPipeline {
        ChunkPipeline::new(
            Arc::new(source),
            sink,
            Arc::new(ProgressTracker::new(store)),
            RetryPolicy::immediate(3),
            BlobLayout {
                prefix: "out/".into(),
                format: OutputFormat::LineDelimited,
                compression: Compression::None,
            },
        )
    }

    fn store(dir: &std::path::Path) -> Arc<dyn ProgressStore> {
        Arc::new(SledProgressStore::open(dir, "job-pipeline").unwrap())
    }

    #[tokio::test]
    async fn writes_blob_and_records_completion() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let sink = Arc::new(MapSink::default());
        let pipeline = pipeline(RangeSource::new(25), sink.clone(), store.clone());

        let result = pipeline.process(&Chunk::new(1, 10, 10)).await;
        assert!(result.is_success());
        assert_eq!(result.record_count, 10);
        assert!(!result.skipped_upload);

        let body = sink.blobs.lock().unwrap()["out/chunk_000001.jsonl"].clone();
        assert_eq!(body.iter().filter(|b| **b == b'\n').count(), 10);

        let entry = store.get_state(1).await.unwrap().unwrap();
        assert_eq!(entry.state, ChunkState::Completed);
        assert_eq!(entry.blob_name.as_deref(), Some("out/chunk_000001.jsonl"));
        assert_eq!(store.counter(Counter::RecordsTransferred).await.unwrap(), 10);
        assert_eq!(
            store.counter(Counter::BytesTransferred).await.unwrap() as u64,
            result.byte_size
        );
    }

    #[tokio::test]
    async fn existing_blob_is_not_uploaded_again() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let sink = Arc::new(MapSink::default());
        sink.blobs
            .lock()
            .unwrap()
            .insert("out/chunk_000000.jsonl".into(), Bytes::from_static(b"old"));

        let result = pipeline(RangeSource::new(5), sink.clone(), store.clone())
            .process(&Chunk::new(0, 0, 5))
            .await;

        assert!(result.is_success());
        assert!(result.skipped_upload);
        assert_eq!(sink.writes.load(Ordering::SeqCst), 0);
        assert_eq!(store.counter(Counter::CompletedCount).await.unwrap(), 1);
        assert_eq!(store.counter(Counter::RecordsTransferred).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn transient_read_failures_are_retried() {
        let dir = tempdir().unwrap();
        let source = RangeSource::new(5);
        source.transient_failures.store(2, Ordering::SeqCst);

        let result = pipeline(source, Arc::new(MapSink::default()), store(dir.path()))
            .process(&Chunk::new(0, 0, 5))
            .await;
        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_chunk() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let source = RangeSource::new(5);
        source.transient_failures.store(10, Ordering::SeqCst);

        let result = pipeline(source, Arc::new(MapSink::default()), store.clone())
            .process(&Chunk::new(0, 0, 5))
            .await;

        assert!(!result.is_success());
        assert_eq!(result.attempts, 3);
        let entry = store.get_state(0).await.unwrap().unwrap();
        assert_eq!(entry.state, ChunkState::Failed);
        assert!(entry.last_error.unwrap().contains("reset"));
        assert_eq!(store.counter(Counter::FailedCount).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn malformed_data_fails_without_retry() {
        let dir = tempdir().unwrap();
        let mut source = RangeSource::new(5);
        source.malformed = true;

        let result = pipeline(source, Arc::new(MapSink::default()), store(dir.path()))
            .process(&Chunk::new(0, 0, 5))
            .await;
        assert!(!result.is_success());
        assert_eq!(result.attempts, 1);
        assert!(result.error.unwrap().contains("not a document"));
    }

    #[tokio::test]
    async fn empty_range_completes_without_blob() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let sink = Arc::new(MapSink::default());

        let result = pipeline(RangeSource::new(10), sink.clone(), store.clone())
            .process(&Chunk::new(3, 30, 10))
            .await;

        assert!(result.is_success());
        assert_eq!(result.record_count, 0);
        assert!(sink.blobs.lock().unwrap().is_empty());
        let entry = store.get_state(3).await.unwrap().unwrap();
        assert_eq!(entry.state, ChunkState::Completed);
        assert!(entry.blob_name.is_none());
    }

    #[tokio::test]
    async fn short_read_records_actual_count() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let result = pipeline(RangeSource::new(13), Arc::new(MapSink::default()), store.clone())
            .process(&Chunk::new(1, 10, 10))
            .await;

        assert_eq!(result.record_count, 3);
        assert_eq!(store.get_state(1).await.unwrap().unwrap().record_count, 3);
    }
}
