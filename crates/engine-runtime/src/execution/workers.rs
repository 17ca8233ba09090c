use crate::{error::TransferError, execution::queue::ChunkQueue};
use engine_core::memory::{Admission, MemoryGuard};
use engine_processing::pipeline::ChunkPipeline;
use model::execution::result::WorkerResult;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// What the workers of this run reported, as seen by the collector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTally {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped_uploads: u64,
    pub records: u64,
    pub bytes: u64,
    /// Failed results in arrival order.
    pub failures: Vec<WorkerResult>,
}

impl RunTally {
    fn record(&mut self, result: WorkerResult) {
        self.processed += 1;
        if result.is_success() {
            self.succeeded += 1;
            self.records += result.record_count;
            self.bytes += result.byte_size;
            if result.skipped_upload {
                self.skipped_uploads += 1;
            }
        } else {
            self.failed += 1;
            self.failures.push(result);
        }
    }
}

/// Runs `worker_count` workers over the queue until it is drained or the run
/// is cancelled, and returns the collected tally.
pub async fn spawn(
    pipeline: Arc<ChunkPipeline>,
    queue: Arc<ChunkQueue>,
    guard: MemoryGuard,
    worker_count: usize,
    cancel: CancellationToken,
) -> Result<RunTally, TransferError> {
    let worker_count = worker_count.max(1);
    info!(workers = worker_count, "Launching workers");

    let (tx, mut rx) = mpsc::channel::<WorkerResult>(worker_count * 2);

    let collector = tokio::spawn(async move {
        let mut tally = RunTally::default();
        while let Some(result) = rx.recv().await {
            tally.record(result);
        }
        tally
    });

    let mut workers = JoinSet::new();
    for id in 0..worker_count {
        let worker = Worker {
            id,
            pipeline: pipeline.clone(),
            queue: queue.clone(),
            guard: guard.clone(),
            cancel: cancel.clone(),
            tx: tx.clone(),
        };
        workers.spawn(worker.run());
    }
    drop(tx);

    while let Some(joined) = workers.join_next().await {
        // A crashed worker leaves its chunk in_progress for the next run.
        if let Err(err) = joined {
            error!(error = %err, "Worker task ended abnormally");
        }
    }

    Ok(collector.await?)
}

struct Worker {
    id: usize,
    pipeline: Arc<ChunkPipeline>,
    queue: Arc<ChunkQueue>,
    guard: MemoryGuard,
    cancel: CancellationToken,
    tx: mpsc::Sender<WorkerResult>,
}

impl Worker {
    async fn run(self) {
        let mut handled = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                info!(worker = self.id, "Stop requested, no new chunks admitted");
                break;
            }
            if self.guard.admit(&self.cancel).await == Admission::Cancelled {
                break;
            }
            let Some(chunk) = self.queue.pop().await else {
                break;
            };

            debug!(worker = self.id, %chunk, "Processing chunk");
            let result = self.pipeline.process(&chunk).await;
            self.guard.log_usage(chunk.index);
            handled += 1;

            if self.tx.send(result).await.is_err() {
                error!(worker = self.id, "Result collector is gone, stopping worker");
                break;
            }
        }
        debug!(worker = self.id, chunks = handled, "Worker finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use connectors::{
        error::{AdapterError, SinkError},
        sink::SinkWriter,
        source::SourceReader,
    };
    use engine_core::{
        retry::RetryPolicy,
        state::{ProgressStore, sled_store::SledProgressStore},
    };
    use engine_processing::{pipeline::BlobLayout, tracker::ProgressTracker};
    use model::{
        core::{
            chunk::Chunk,
            format::{Compression, OutputFormat},
        },
        records::record::Record,
    };
    use serde_json::json;
    use std::{collections::HashMap, sync::Mutex};

    struct Numbers {
        total: u64,
    }

    #[async_trait]
    impl SourceReader for Numbers {
        fn name(&self) -> String {
            "numbers".into()
        }

        async fn count(&self) -> Result<u64, AdapterError> {
            Ok(self.total)
        }

        async fn read_page(&self, offset: u64, limit: u64) -> Result<Vec<Record>, AdapterError> {
            let end = (offset + limit).min(self.total);
            Ok((offset..end).map(|n| Record::from_value(json!({ "n": n }))).collect())
        }
    }

    #[derive(Default)]
    struct Blobs(Mutex<HashMap<String, Bytes>>);

    #[async_trait]
    impl SinkWriter for Blobs {
        fn name(&self) -> String {
            "blobs".into()
        }

        async fn exists(&self, name: &str) -> Result<bool, SinkError> {
            Ok(self.0.lock().unwrap().contains_key(name))
        }

        async fn write(&self, name: &str, body: Bytes) -> Result<(), SinkError> {
            self.0.lock().unwrap().insert(name.to_string(), body);
            Ok(())
        }
    }

    fn pipeline(dir: &std::path::Path, total: u64, sink: Arc<Blobs>) -> Arc<ChunkPipeline> {
        let store: Arc<dyn ProgressStore> =
            Arc::new(SledProgressStore::open(dir, "job-workers").unwrap());
        Arc::new(ChunkPipeline::new(
            Arc::new(Numbers { total }),
            sink,
            Arc::new(ProgressTracker::new(store)),
            RetryPolicy::immediate(2),
            BlobLayout {
                prefix: "out/".into(),
                format: OutputFormat::LineDelimited,
                compression: Compression::None,
            },
        ))
    }

    fn queue(total: u64, size: u64) -> Arc<ChunkQueue> {
        Arc::new(ChunkQueue::new(
            (0..total.div_ceil(size)).map(|i| Chunk::new(i, i * size, size.min(total - i * size))),
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn drains_queue_with_every_chunk_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(Blobs::default());
        let queue = queue(95, 10);

        let tally = spawn(
            pipeline(dir.path(), 95, sink.clone()),
            queue.clone(),
            MemoryGuard::disabled(),
            4,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(tally.processed, 10);
        assert_eq!(tally.succeeded, 10);
        assert_eq!(tally.records, 95);
        assert!(tally.failures.is_empty());
        assert!(queue.is_empty().await);
        assert_eq!(sink.0.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn cancelled_run_admits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue(30, 10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let tally = spawn(
            pipeline(dir.path(), 30, Arc::new(Blobs::default())),
            queue.clone(),
            MemoryGuard::disabled(),
            2,
            cancel,
        )
        .await
        .unwrap();

        assert_eq!(tally.processed, 0);
        assert_eq!(queue.len().await, 3);
    }

    #[test]
    fn tally_counts_skips_and_failures() {
        let mut tally = RunTally::default();
        tally.record(WorkerResult::success(0, 10, 100, 1));
        tally.record(WorkerResult::success(1, 10, 90, 1).with_skipped_upload(true));
        tally.record(WorkerResult::failure(2, "boom", 3));

        assert_eq!(tally.processed, 3);
        assert_eq!(tally.succeeded, 2);
        assert_eq!(tally.skipped_uploads, 1);
        assert_eq!(tally.records, 20);
        assert_eq!(tally.bytes, 190);
        assert_eq!(tally.failures[0].chunk_index, 2);
    }
}
