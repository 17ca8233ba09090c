use crate::{error::SinkError, sink::SinkWriter};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Stores blobs as files below a root directory.
///
/// Each write lands in a temporary sibling first and is renamed into
/// place, so a crash never leaves a partial blob under the final name.
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsSink { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, blob: &str) -> Result<PathBuf, SinkError> {
        let relative = Path::new(blob);
        let valid = !blob.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(SinkError::InvalidName(blob.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SinkWriter for FsSink {
    fn name(&self) -> String {
        format!("fs:{}", self.root.display())
    }

    async fn ping(&self) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn exists(&self, blob: &str) -> Result<bool, SinkError> {
        let path = self.resolve(blob)?;
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn write(&self, blob: &str, data: Bytes) -> Result<(), SinkError> {
        let path = self.resolve(blob)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(err) = tokio::fs::write(&tmp, &data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), size = data.len(), "Wrote blob");
        Ok(())
    }
}
