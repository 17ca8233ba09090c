use crate::{
    error::TransferError,
    execution::{
        factory::Collaborators,
        queue::ChunkQueue,
        resume::{JobRequest, ResumeCoordinator, ResumePlan},
        status,
        workers::{self, RunTally},
    },
};
use chrono::{DateTime, Utc};
use engine_config::{
    report::summary::{FailedChunkReport, TransferReport},
    settings::TransferConfig,
};
use engine_core::{progress::ProgressService, state::ProgressStore};
use engine_processing::{
    pipeline::{BlobLayout, ChunkPipeline},
    tracker::ProgressTracker,
};
use model::execution::progress::JobMeta;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs one transfer to completion (or until cancelled) and reports on it.
///
/// Chunk failures never make this return an error; they are listed in the
/// report. Errors are reserved for problems that stop the run as a whole.
pub async fn run(
    config: Arc<TransferConfig>,
    collaborators: Collaborators,
    cancel: CancellationToken,
) -> Result<TransferReport, TransferError> {
    TransferExecutor::new(config, collaborators, cancel)
        .execute()
        .await
}

struct TransferExecutor {
    config: Arc<TransferConfig>,
    parts: Collaborators,
    cancel: CancellationToken,
}

impl TransferExecutor {
    fn new(config: Arc<TransferConfig>, parts: Collaborators, cancel: CancellationToken) -> Self {
        Self {
            config,
            parts,
            cancel,
        }
    }

    async fn execute(self) -> Result<TransferReport, TransferError> {
        let started_at = Utc::now();
        let store = self.parts.store.clone();
        info!(job_id = store.job_id(), "Starting transfer");

        store
            .ping()
            .await
            .map_err(|e| TransferError::ProgressStoreUnavailable(e.to_string()))?;

        let total_records = self.parts.source.count().await?;
        info!(
            source = %self.parts.source.name(),
            total_records,
            "Counted source records"
        );

        let coordinator = ResumeCoordinator::new(store.clone());
        let (meta, chunks) = coordinator
            .prepare_job(&self.job_request(), total_records)
            .await?;
        let resume = coordinator.reconcile(&chunks).await?;

        if !resume.failed.is_empty() {
            warn!(
                failed = resume.failed.len(),
                "Chunks failed in earlier runs are not retried until reset"
            );
        }
        if resume.pending.is_empty() {
            info!("Nothing left to transfer");
        }

        let tracker = Arc::new(ProgressTracker::new(store.clone()));
        let pipeline = Arc::new(ChunkPipeline::new(
            self.parts.source.clone(),
            self.parts.sink.clone(),
            tracker.clone(),
            self.config.retry_policy(),
            BlobLayout {
                prefix: self.config.blob_prefix.clone(),
                format: meta.output_format,
                compression: meta.compression,
            },
        ));
        let queue = Arc::new(ChunkQueue::new(resume.pending.iter().copied()));

        let status_stop = CancellationToken::new();
        let _stop_status_on_exit = status_stop.clone().drop_guard();
        let publisher = (!self.config.status_interval.is_zero()).then(|| {
            status::spawn_publisher(
                store.clone(),
                self.config.status_path(),
                self.config.status_interval,
                status_stop.clone(),
            )
        });

        let tally = workers::spawn(
            pipeline,
            queue.clone(),
            self.parts.guard.clone(),
            self.config.worker_count,
            self.cancel.clone(),
        )
        .await?;

        status_stop.cancel();
        if let Some(publisher) = publisher {
            if let Err(err) = publisher.await {
                warn!(error = %err, "Status publisher stopped abnormally");
            }
        }

        let interrupted = self.cancel.is_cancelled() && !queue.is_empty().await;
        if interrupted {
            warn!(
                remaining = queue.len().await,
                "Transfer interrupted, remaining chunks resume on the next run"
            );
        }

        let mut report = self
            .build_report(store, &meta, &resume, &tally, started_at)
            .await;
        report.interrupted = interrupted;
        report.tracking_degraded = tracker.is_degraded();
        report.tracking_error = tracker.first_error().map(str::to_string);

        info!(
            job_id = %report.job_id,
            status = report.status(),
            completed = report.completed_count,
            failed = report.failed_count,
            records = report.records_transferred,
            elapsed_secs = report.elapsed_secs(),
            "Transfer finished"
        );
        Ok(report)
    }

    fn job_request(&self) -> JobRequest {
        JobRequest {
            source: self.config.source.identity(),
            destination: self.config.destination(),
            output_format: self.config.output_format,
            compression: self.config.compression,
            chunk_size: self.config.chunk_size,
        }
    }

    /// Totals come from the store. If it cannot be read back the report is
    /// built from what this run saw.
    async fn build_report(
        &self,
        store: Arc<dyn ProgressStore>,
        meta: &JobMeta,
        resume: &ResumePlan,
        tally: &RunTally,
        started_at: DateTime<Utc>,
    ) -> TransferReport {
        let mut report = TransferReport {
            job_id: meta.job_id.clone(),
            source: meta.source.clone(),
            destination: meta.destination.clone(),
            total_chunks: meta.total_chunks,
            total_records: meta.total_records,
            completed_count: resume.completed + tally.succeeded,
            failed_count: resume.failed.len() as u64 + tally.failed,
            records_transferred: tally.records,
            bytes_transferred: tally.bytes,
            processed: tally.processed,
            skipped_uploads: tally.skipped_uploads,
            reclaimed: resume.reclaimed,
            failed_chunks: tally
                .failures
                .iter()
                .map(|r| FailedChunkReport {
                    index: r.chunk_index,
                    attempts: r.attempts,
                    error: r.error.clone().unwrap_or_default(),
                })
                .collect(),
            tracking_degraded: false,
            tracking_error: None,
            interrupted: false,
            started_at,
            finished_at: Utc::now(),
        };

        let service = ProgressService::new(store);
        let stored = async {
            let progress = service.job_progress().await?;
            let failed = service.failed_chunks().await?;
            Ok::<_, TransferError>((progress, failed))
        };

        match stored.await {
            // Writes lost while tracking was degraded make the stored
            // totals lag behind what this run did.
            Ok((progress, failed)) => {
                report.completed_count = report.completed_count.max(progress.completed_count);
                report.failed_count = report.failed_count.max(progress.failed_count);
                report.records_transferred =
                    report.records_transferred.max(progress.records_transferred);
                report.bytes_transferred = report.bytes_transferred.max(progress.bytes_transferred);
                for f in failed {
                    if report.failed_chunks.iter().all(|r| r.index != f.index) {
                        report.failed_chunks.push(FailedChunkReport {
                            index: f.index,
                            attempts: f.attempts,
                            error: f.error,
                        });
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "Could not read job totals back, reporting this run only");
            }
        }

        report.failed_chunks.sort_by_key(|f| f.index);
        report
    }
}
