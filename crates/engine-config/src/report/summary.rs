use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FailedChunkReport {
    pub index: u64,
    pub attempts: u32,
    pub error: String,
}

/// Outcome of one `transfer` run.
///
/// Job-wide totals come from the progress store; `processed`, `skipped_uploads`
/// and `reclaimed` describe this run only.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TransferReport {
    pub job_id: String,
    pub source: String,
    pub destination: String,
    pub total_chunks: u64,
    pub total_records: u64,
    pub completed_count: u64,
    pub failed_count: u64,
    pub records_transferred: u64,
    pub bytes_transferred: u64,
    pub processed: u64,
    pub skipped_uploads: u64,
    pub reclaimed: u64,
    pub failed_chunks: Vec<FailedChunkReport>,
    pub tracking_degraded: bool,
    pub tracking_error: Option<String>,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TransferReport {
    /// A run succeeds only when nothing failed and it was not interrupted.
    pub fn is_success(&self) -> bool {
        self.failed_count == 0 && !self.interrupted
    }

    pub fn elapsed_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as f64 / 1000.0
    }

    pub fn status(&self) -> &'static str {
        if self.interrupted {
            "interrupted"
        } else if self.failed_count > 0 {
            "partial"
        } else {
            "success"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn report() -> TransferReport {
        let now = Utc::now();
        TransferReport {
            job_id: "job-1".into(),
            source: "csv:in.csv".into(),
            destination: "fs:out/export/".into(),
            total_chunks: 3,
            total_records: 25,
            completed_count: 3,
            failed_count: 0,
            records_transferred: 25,
            bytes_transferred: 1024,
            processed: 3,
            skipped_uploads: 0,
            reclaimed: 0,
            failed_chunks: vec![],
            tracking_degraded: false,
            tracking_error: None,
            interrupted: false,
            started_at: now - Duration::milliseconds(1500),
            finished_at: now,
        }
    }

    #[test]
    fn status_reflects_failures_and_interruption() {
        let mut r = report();
        assert!(r.is_success());
        assert_eq!(r.status(), "success");
        assert_eq!(r.elapsed_secs(), 1.5);

        r.failed_count = 1;
        assert!(!r.is_success());
        assert_eq!(r.status(), "partial");

        r.interrupted = true;
        assert_eq!(r.status(), "interrupted");
    }

    #[test]
    fn serializes_failed_chunks() {
        let mut r = report();
        r.failed_chunks.push(FailedChunkReport {
            index: 2,
            attempts: 3,
            error: "timeout".into(),
        });
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["failed_chunks"][0]["index"], 2);
        assert_eq!(json["tracking_degraded"], false);
    }
}
