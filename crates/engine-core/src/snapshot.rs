use crate::{
    error::ProgressError,
    progress::{FailedChunk, ProgressService, StateCounts},
};
use chrono::{DateTime, Utc};
use model::execution::progress::JobProgress;
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Job progress as last published by the process running the transfer.
///
/// The store is locked while a transfer runs, so other processes read this
/// file instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub progress: JobProgress,
    pub states: StateCounts,
    pub failed_chunks: Vec<FailedChunk>,
    /// False once the publishing run has finished.
    pub running: bool,
    pub updated_at: DateTime<Utc>,
}

/// `<state dir>/../status/<job id>.json`, outside the sled directory.
pub fn snapshot_path(state_path: &Path, job_id: &str) -> PathBuf {
    state_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join("status")
        .join(format!("{job_id}.json"))
}

fn status_error(path: &Path, err: impl ToString) -> ProgressError {
    ProgressError::StatusFile {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

impl ProgressSnapshot {
    pub async fn capture(service: &ProgressService, running: bool) -> Result<Self, ProgressError> {
        Ok(ProgressSnapshot {
            progress: service.job_progress().await?,
            states: service.state_counts().await?,
            failed_chunks: service.failed_chunks().await?,
            running,
            updated_at: Utc::now(),
        })
    }

    /// Replaces the file at `path` so readers never see a partial write.
    pub async fn write(&self, path: &Path) -> Result<(), ProgressError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| status_error(path, e))?;
        }
        let body = serde_json::to_vec_pretty(self).map_err(|e| status_error(path, e))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| status_error(path, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| status_error(path, e))
    }

    /// `None` when no run has published to `path` yet.
    pub async fn read(path: &Path) -> Result<Option<Self>, ProgressError> {
        let body = match tokio::fs::read(path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(status_error(path, e)),
        };
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| status_error(path, e))
    }
}
