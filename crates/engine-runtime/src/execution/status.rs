use engine_core::{progress::ProgressService, snapshot::ProgressSnapshot, state::ProgressStore};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Writes the job's progress to `path` every `interval` until `stop` fires,
/// then once more marked as no longer running.
///
/// `interval` must be non-zero.
pub fn spawn_publisher(
    store: Arc<dyn ProgressStore>,
    path: PathBuf,
    interval: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let service = ProgressService::new(store);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(path = %path.display(), "Publishing transfer status");
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => publish(&service, &path, true).await,
            }
        }
        publish(&service, &path, false).await;
    })
}

async fn publish(service: &ProgressService, path: &Path, running: bool) {
    let result = match ProgressSnapshot::capture(service, running).await {
        Ok(snapshot) => snapshot.write(path).await,
        Err(err) => Err(err),
    };
    // Degraded tracking already reports store failures.
    if let Err(err) = result {
        debug!(error = %err, "Skipped status snapshot");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use engine_core::state::sled_store::SledProgressStore;
    use model::{
        core::format::{Compression, OutputFormat},
        execution::progress::{ChunkEntry, JobMeta},
    };
    use tempfile::tempdir;

    #[tokio::test]
    async fn final_snapshot_marks_the_run_finished() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ProgressStore> =
            Arc::new(SledProgressStore::open(dir.path().join("state"), "job-status").unwrap());
        store
            .save_job(&JobMeta {
                job_id: "job-status".into(),
                source: "csv:in.csv".into(),
                destination: "fs:out/".into(),
                output_format: OutputFormat::LineDelimited,
                compression: Compression::None,
                chunk_size: 5,
                total_records: 5,
                total_chunks: 1,
                started_at: Utc::now(),
            })
            .await
            .unwrap();
        store.init_if_absent(0, &ChunkEntry::pending()).await.unwrap();

        let path = dir.path().join("status").join("job-status.json");
        let stop = CancellationToken::new();
        let handle = spawn_publisher(
            store.clone(),
            path.clone(),
            Duration::from_millis(5),
            stop.clone(),
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        let live = ProgressSnapshot::read(&path).await.unwrap().unwrap();
        assert!(live.running);
        assert_eq!(live.progress.completed_count, 0);

        store
            .complete_chunk(0, &ChunkEntry::completed(5, 64, None, 1))
            .await
            .unwrap();
        stop.cancel();
        handle.await.unwrap();

        let done = ProgressSnapshot::read(&path).await.unwrap().unwrap();
        assert!(!done.running);
        assert_eq!(done.progress.completed_count, 1);
    }

    #[tokio::test]
    async fn unknown_job_publishes_nothing() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ProgressStore> =
            Arc::new(SledProgressStore::open(dir.path().join("state"), "job-none").unwrap());
        let path = dir.path().join("status").join("job-none.json");
        let stop = CancellationToken::new();
        stop.cancel();
        spawn_publisher(store, path.clone(), Duration::from_millis(5), stop)
            .await
            .unwrap();
        assert!(ProgressSnapshot::read(&path).await.unwrap().is_none());
    }
}
