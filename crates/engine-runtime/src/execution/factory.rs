use crate::error::TransferError;
use connectors::{
    sink::{SinkWriter, create_sink},
    source::{SourceReader, create_source},
};
use engine_config::settings::TransferConfig;
use engine_core::{
    memory::MemoryGuard,
    state::{ProgressStore, sled_store::SledProgressStore},
};
use std::sync::Arc;
use tracing::info;

/// Live collaborators of a transfer.
pub struct Collaborators {
    pub source: Arc<dyn SourceReader>,
    pub sink: Arc<dyn SinkWriter>,
    pub store: Arc<dyn ProgressStore>,
    pub guard: MemoryGuard,
}

pub async fn source_for(config: &TransferConfig) -> Result<Arc<dyn SourceReader>, TransferError> {
    Ok(create_source(&config.source).await?)
}

pub async fn sink_for(config: &TransferConfig) -> Result<Arc<dyn SinkWriter>, TransferError> {
    Ok(create_sink(&config.sink).await?)
}

pub fn store_for(config: &TransferConfig) -> Result<Arc<dyn ProgressStore>, TransferError> {
    let job_id = config.resolved_job_id();
    if let Some(parent) = config.state_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            TransferError::ProgressStoreUnavailable(format!(
                "cannot create {}: {e}",
                parent.display()
            ))
        })?;
    }
    let store = SledProgressStore::open(&config.state_path, job_id.clone())?;
    info!(job_id = %job_id, path = %config.state_path.display(), "Opened progress store");
    Ok(Arc::new(store))
}

pub fn guard_for(config: &TransferConfig) -> MemoryGuard {
    MemoryGuard::system(config.memory_ceiling_bytes, config.memory_poll_interval)
}

pub async fn collaborators(config: &TransferConfig) -> Result<Collaborators, TransferError> {
    let store = store_for(config)?;
    let source = source_for(config).await?;
    let sink = sink_for(config).await?;
    Ok(Collaborators {
        source,
        sink,
        store,
        guard: guard_for(config),
    })
}
