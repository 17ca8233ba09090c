use crate::{error::CliError, output::ProgressView};
use engine_config::settings::TransferConfig;
use engine_core::{progress::ProgressService, snapshot::ProgressSnapshot};
use engine_runtime::{error::TransferError, execution::factory};
use std::path::PathBuf;
use tracing::info;

/// Where `progress` reads a job from.
pub enum ProgressFeed {
    /// The store itself, when no transfer holds it.
    Store(ProgressService),
    /// The status file published by the transfer holding the store.
    StatusFile(PathBuf),
}

impl ProgressFeed {
    pub fn open(config: &TransferConfig) -> Result<Self, CliError> {
        match factory::store_for(config) {
            Ok(store) => Ok(ProgressFeed::Store(ProgressService::new(store))),
            Err(TransferError::JobRunning(reason)) => {
                let path = config.status_path();
                info!(
                    %reason,
                    status = %path.display(),
                    "Reading status published by the running transfer"
                );
                Ok(ProgressFeed::StatusFile(path))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn view(&self) -> Result<ProgressView, CliError> {
        match self {
            ProgressFeed::Store(service) => Ok(ProgressView::new(
                service.job_progress().await?,
                service.state_counts().await?,
                service.failed_chunks().await?,
            )),
            ProgressFeed::StatusFile(path) => {
                let snapshot = ProgressSnapshot::read(path).await?.ok_or_else(|| {
                    CliError::JobRunning(format!("no status published at {} yet", path.display()))
                })?;
                Ok(ProgressView::from_snapshot(snapshot))
            }
        }
    }
}
