use crate::error::CliError;
use chrono::{DateTime, Utc};
use engine_config::report::summary::TransferReport;
use engine_core::{
    progress::{FailedChunk, StateCounts},
    snapshot::ProgressSnapshot,
};
use engine_runtime::execution::{preview::PlanPreview, reset::ResetOutcome};
use model::execution::progress::JobProgress;
use serde::Serialize;
use std::path::Path;

/// Everything `progress` shows for one job.
#[derive(Debug, Serialize)]
pub struct ProgressView {
    #[serde(flatten)]
    pub progress: JobProgress,
    pub states: StateCounts,
    pub progress_percentage: f64,
    pub records_per_second: Option<f64>,
    pub eta_seconds: Option<f64>,
    pub failed_chunks: Vec<FailedChunk>,
    /// Set when the view comes from the status file of a running transfer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<Published>,
}

#[derive(Debug, Serialize)]
pub struct Published {
    pub updated_at: DateTime<Utc>,
    pub running: bool,
}

impl ProgressView {
    pub fn new(progress: JobProgress, states: StateCounts, failed_chunks: Vec<FailedChunk>) -> Self {
        Self::at(progress, states, failed_chunks, Utc::now())
    }

    /// Rate and ETA are measured at the time the snapshot was taken.
    pub fn from_snapshot(snapshot: ProgressSnapshot) -> Self {
        let mut view = Self::at(
            snapshot.progress,
            snapshot.states,
            snapshot.failed_chunks,
            snapshot.updated_at,
        );
        view.published = Some(Published {
            updated_at: snapshot.updated_at,
            running: snapshot.running,
        });
        view
    }

    fn at(
        progress: JobProgress,
        states: StateCounts,
        failed_chunks: Vec<FailedChunk>,
        now: DateTime<Utc>,
    ) -> Self {
        ProgressView {
            progress_percentage: progress.progress_percentage(),
            records_per_second: progress.records_per_second(now),
            eta_seconds: progress.eta_seconds(now),
            progress,
            states,
            failed_chunks,
            published: None,
        }
    }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub async fn write_report(report: &TransferReport, path: &Path) -> Result<(), CliError> {
    tokio::fs::write(path, to_json(report)?).await?;
    Ok(())
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", to_json(value)?);
    Ok(())
}

pub fn print_transfer_report(report: &TransferReport) {
    println!("Transfer of job '{}': {}", report.job_id, report.status());
    println!("-----------------------------");
    println!("{:<20} {}", "Source", report.source);
    println!("{:<20} {}", "Destination", report.destination);
    println!(
        "{:<20} {} / {}",
        "Chunks completed", report.completed_count, report.total_chunks
    );
    println!("{:<20} {}", "Chunks failed", report.failed_count);
    println!(
        "{:<20} {} / {}",
        "Records", report.records_transferred, report.total_records
    );
    println!("{:<20} {}", "Bytes", report.bytes_transferred);
    println!(
        "{:<20} {} ({} uploads skipped, {} reclaimed)",
        "This run", report.processed, report.skipped_uploads, report.reclaimed
    );
    println!("{:<20} {:.1}s", "Elapsed", report.elapsed_secs());

    if report.tracking_degraded {
        println!();
        println!(
            "WARNING: progress tracking was degraded during this run: {}",
            report.tracking_error.as_deref().unwrap_or("unknown error")
        );
        println!("Stored counters may be behind; blobs were still written.");
    }

    if !report.failed_chunks.is_empty() {
        println!();
        println!("Failed chunks (run `doc2blob reset` to retry them):");
        for failed in &report.failed_chunks {
            println!(
                "  {:>8}  after {} attempt(s): {}",
                failed.index, failed.attempts, failed.error
            );
        }
    }

    if report.interrupted {
        println!();
        println!("Stopped before all chunks ran; rerun `doc2blob transfer` to continue.");
    }
}

pub fn print_plan(plan: &PlanPreview) {
    println!("Plan for job '{}':", plan.job_id);
    println!("-----------------------------");
    println!("{:<20} {}", "Source", plan.source);
    println!("{:<20} {}", "Destination", plan.destination);
    println!(
        "{:<20} {}",
        "Stored plan",
        if plan.existing_job { "yes" } else { "no (new job)" }
    );
    println!("{:<20} {}", "Records", plan.total_records);
    println!("{:<20} {}", "Chunk size", plan.chunk_size);
    println!("{:<20} {}", "Chunks", plan.total_chunks);
    println!("{:<20} {}", "To process", plan.pending);
    println!("{:<20} {}", "Already completed", plan.completed);
    println!("{:<20} {}", "Reclaimable", plan.reclaimable);
    println!("{:<20} {}", "Failed", plan.failed.len());
    if let (Some(first), Some(last)) = (&plan.first_blob, &plan.last_blob) {
        println!("{:<20} {first} .. {last}", "Blobs");
    }
}

pub fn print_progress(view: &ProgressView) {
    let p = &view.progress;
    println!("Progress for job '{}':", p.job_id);
    println!("-----------------------------");
    println!(
        "{:<20} {} / {} ({:.1}%)",
        "Chunks completed", p.completed_count, p.total_chunks, view.progress_percentage
    );
    println!("{:<20} {}", "Chunks failed", p.failed_count);
    println!("{:<20} {}", "Chunks pending", view.states.pending);
    println!("{:<20} {}", "Chunks in progress", view.states.in_progress);
    println!(
        "{:<20} {} / {}",
        "Records", p.records_transferred, p.total_records
    );
    println!("{:<20} {}", "Bytes", p.bytes_transferred);
    println!("{:<20} {}", "Started", p.started_at.to_rfc3339());
    let rate = view
        .records_per_second
        .map(|r| format!("{r:.0} records/s"))
        .unwrap_or_else(|| "n/a".to_string());
    println!("{:<20} {}", "Rate", rate);
    let eta = view
        .eta_seconds
        .map(format_duration)
        .unwrap_or_else(|| "n/a".to_string());
    println!("{:<20} {}", "ETA", eta);
    if let Some(published) = &view.published {
        let age = (Utc::now() - published.updated_at).num_milliseconds().max(0) as f64 / 1000.0;
        println!(
            "{:<20} status file, {} ago ({})",
            "Read from",
            format_duration(age),
            if published.running { "transfer running" } else { "transfer finished" }
        );
    }

    if !view.failed_chunks.is_empty() {
        println!();
        println!("Failed chunks:");
        for failed in &view.failed_chunks {
            println!("  {:>8}  {}", failed.index, failed.error);
        }
    }
}

pub fn print_reset(outcome: &ResetOutcome) {
    println!("{:<20} {:?}", "Reset to pending", outcome.reset);
    if !outcome.skipped.is_empty() {
        println!("{:<20} {:?}", "Skipped (not failed)", outcome.skipped);
    }
}

fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}
