use crate::{
    error::TransferError,
    execution::resume::{ResumeCoordinator, ResumePlan},
};
use connectors::source::SourceReader;
use engine_config::settings::TransferConfig;
use engine_core::state::ProgressStore;
use planner::{naming::blob_name, plan::plan_chunks};
use serde::Serialize;
use std::sync::Arc;

/// What a `transfer` with the current configuration would do. Nothing is
/// written to the store or the sink.
#[derive(Debug, Clone, Serialize)]
pub struct PlanPreview {
    pub job_id: String,
    pub source: String,
    pub destination: String,
    /// Whether the job already has a stored plan.
    pub existing_job: bool,
    pub total_records: u64,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub pending: u64,
    pub completed: u64,
    pub failed: Vec<u64>,
    pub reclaimable: u64,
    pub first_blob: Option<String>,
    pub last_blob: Option<String>,
}

pub async fn preview(
    config: &TransferConfig,
    source: Arc<dyn SourceReader>,
    store: Arc<dyn ProgressStore>,
) -> Result<PlanPreview, TransferError> {
    let stored = store.load_job().await?;
    let (total_records, chunk_size, format, compression) = match &stored {
        Some(meta) => (
            meta.total_records,
            meta.chunk_size as i64,
            meta.output_format,
            meta.compression,
        ),
        None => (
            source.count().await?,
            config.chunk_size,
            config.output_format,
            config.compression,
        ),
    };

    let chunks = plan_chunks(total_records, chunk_size)?;
    let ResumePlan {
        pending,
        completed,
        failed,
        reclaimed,
    } = ResumeCoordinator::new(store.clone()).inspect(&chunks).await?;

    let name = |index: u64| blob_name(&config.blob_prefix, index, format, compression);
    Ok(PlanPreview {
        job_id: store.job_id().to_string(),
        source: config.source.identity(),
        destination: config.destination(),
        existing_job: stored.is_some(),
        total_records,
        chunk_size: chunk_size as u64,
        total_chunks: chunks.len() as u64,
        pending: pending.len() as u64,
        completed,
        failed,
        reclaimable: reclaimed,
        first_blob: chunks.first().map(|c| name(c.index)),
        last_blob: chunks.last().map(|c| name(c.index)),
    })
}
