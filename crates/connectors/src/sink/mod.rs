pub mod fs;
pub mod s3;

use crate::{
    error::SinkError,
    sink::{
        fs::FsSink,
        s3::{S3Config, S3Sink},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{path::PathBuf, sync::Arc};

/// Destination for chunk blobs.
///
/// Blobs are immutable: a name is written at most once per successful chunk
/// and `exists` lets a rerun detect a write that happened before a crash.
#[async_trait]
pub trait SinkWriter: Send + Sync {
    /// Human readable destination, e.g. `s3://bucket`.
    fn name(&self) -> String;

    /// Verifies the destination is reachable.
    async fn ping(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn exists(&self, blob: &str) -> Result<bool, SinkError>;

    async fn write(&self, blob: &str, data: Bytes) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkSettings {
    Fs { root: PathBuf },
    S3(S3Config),
}

impl SinkSettings {
    /// Stable identity used to derive the job id.
    pub fn identity(&self) -> String {
        match self {
            SinkSettings::Fs { root } => format!("fs:{}", root.display()),
            SinkSettings::S3(config) => format!("s3://{}", config.bucket),
        }
    }
}

pub async fn create_sink(settings: &SinkSettings) -> Result<Arc<dyn SinkWriter>, SinkError> {
    match settings {
        SinkSettings::Fs { root } => Ok(Arc::new(FsSink::new(root.clone()))),
        SinkSettings::S3(config) => Ok(Arc::new(S3Sink::new(config.clone()).await?)),
    }
}
