use crate::error::TransferError;
use chrono::Utc;
use engine_core::{error::StateStoreError, state::ProgressStore};
use model::{
    core::{
        chunk::{Chunk, ChunkState},
        format::{Compression, OutputFormat},
    },
    execution::progress::{ChunkEntry, JobMeta},
};
use planner::plan::plan_chunks;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, warn};

/// Chunks split by what this run has to do with them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResumePlan {
    /// Chunks to process, in plan order.
    pub pending: Vec<Chunk>,
    pub completed: u64,
    /// Indices left failed by earlier runs. They wait for an explicit reset.
    pub failed: Vec<u64>,
    /// Chunks found `in_progress`, i.e. abandoned by a crashed run.
    pub reclaimed: u64,
}

/// What the current run wants to transfer.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub source: String,
    pub destination: String,
    pub output_format: OutputFormat,
    pub compression: Compression,
    pub chunk_size: i64,
}

/// Reconciles the planned chunks with the recorded progress at startup.
pub struct ResumeCoordinator {
    store: Arc<dyn ProgressStore>,
}

impl ResumeCoordinator {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        ResumeCoordinator { store }
    }

    /// Returns the job header and its chunks. A stored header wins over the
    /// request: the plan of a job never changes once written.
    pub async fn prepare_job(
        &self,
        request: &JobRequest,
        source_count: u64,
    ) -> Result<(JobMeta, Vec<Chunk>), TransferError> {
        if let Some(meta) = self.store.load_job().await? {
            if request.chunk_size != meta.chunk_size as i64 {
                return Err(TransferError::InvalidConfig(format!(
                    "chunk size {} differs from the stored plan of job {} ({}); \
                     use the original chunk size or a new job id",
                    request.chunk_size, meta.job_id, meta.chunk_size
                )));
            }
            if request.output_format != meta.output_format || request.compression != meta.compression {
                return Err(TransferError::InvalidConfig(format!(
                    "output {}/{} differs from the stored plan of job {} ({}/{})",
                    request.output_format,
                    request.compression,
                    meta.job_id,
                    meta.output_format,
                    meta.compression
                )));
            }
            if source_count != meta.total_records {
                warn!(
                    job_id = %meta.job_id,
                    planned = meta.total_records,
                    current = source_count,
                    "Source count changed since the job was planned, keeping the stored plan"
                );
            }

            let chunks = plan_chunks(meta.total_records, meta.chunk_size as i64)?;
            info!(
                job_id = %meta.job_id,
                chunks = chunks.len(),
                "Resuming existing job"
            );
            return Ok((meta, chunks));
        }

        let chunks = plan_chunks(source_count, request.chunk_size)?;
        let meta = JobMeta {
            job_id: self.store.job_id().to_string(),
            source: request.source.clone(),
            destination: request.destination.clone(),
            output_format: request.output_format,
            compression: request.compression,
            chunk_size: request.chunk_size as u64,
            total_records: source_count,
            total_chunks: chunks.len() as u64,
            started_at: Utc::now(),
        };
        self.store.save_job(&meta).await?;
        info!(
            job_id = %meta.job_id,
            total_records = source_count,
            chunks = chunks.len(),
            "Planned new job"
        );
        Ok((meta, chunks))
    }

    /// Initialises missing chunk entries as pending and builds the queue.
    pub async fn reconcile(&self, chunks: &[Chunk]) -> Result<ResumePlan, StateStoreError> {
        let mut existing = self.store.scan_states().await?;

        let mut created = 0u64;
        for chunk in chunks {
            if existing.contains_key(&chunk.index) {
                continue;
            }
            let entry = ChunkEntry::pending();
            if self.store.init_if_absent(chunk.index, &entry).await? {
                created += 1;
                existing.insert(chunk.index, entry);
            } else if let Some(current) = self.store.get_state(chunk.index).await? {
                existing.insert(chunk.index, current);
            }
        }

        let plan = classify(chunks, &existing);
        info!(
            pending = plan.pending.len(),
            completed = plan.completed,
            failed = plan.failed.len(),
            reclaimed = plan.reclaimed,
            initialised = created,
            "Reconciled chunk states"
        );
        Ok(plan)
    }

    /// Same classification as `reconcile`, without writing anything.
    pub async fn inspect(&self, chunks: &[Chunk]) -> Result<ResumePlan, StateStoreError> {
        let existing = self.store.scan_states().await?;
        Ok(classify(chunks, &existing))
    }
}

/// Unknown chunks count as pending.
fn classify(chunks: &[Chunk], states: &BTreeMap<u64, ChunkEntry>) -> ResumePlan {
    let mut plan = ResumePlan::default();
    for chunk in chunks {
        match states.get(&chunk.index).map(|e| e.state) {
            None | Some(ChunkState::Pending) => plan.pending.push(*chunk),
            Some(ChunkState::InProgress) => {
                plan.reclaimed += 1;
                plan.pending.push(*chunk);
            }
            Some(ChunkState::Completed) => plan.completed += 1,
            Some(ChunkState::Failed) => plan.failed.push(chunk.index),
        }
    }
    plan
}
