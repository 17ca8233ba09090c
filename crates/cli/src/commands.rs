use clap::{Args, Subcommand};
use engine_config::settings::ConfigOverrides;
use model::core::format::{Compression, OutputFormat};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Export the source to the sink, resuming earlier progress of the same job
    Transfer {
        #[command(flatten)]
        opts: TransferArgs,

        #[arg(long, help = "Print the final report as JSON instead of a table")]
        json: bool,

        #[arg(
            long,
            help = "If specified, also writes the JSON report to this file"
        )]
        output: Option<PathBuf>,
    },
    /// Show the chunk plan and what a transfer would do, without writing anything
    Plan {
        #[command(flatten)]
        opts: TransferArgs,

        #[arg(long, help = "Print the plan as JSON instead of a table")]
        json: bool,
    },
    /// Show the progress of a job
    Progress {
        #[command(flatten)]
        opts: TransferArgs,

        #[arg(
            long,
            help = "If set, prints the progress information as JSON instead of a table"
        )]
        json: bool,

        #[arg(long, value_name = "SECS", help = "Refresh every SECS seconds until stopped")]
        watch: Option<u64>,
    },
    /// Move failed chunks back to pending so the next transfer retries them
    Reset {
        #[command(flatten)]
        opts: TransferArgs,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Comma separated chunk indices; all failed chunks when omitted"
        )]
        chunks: Option<Vec<u64>>,
    },
    /// Check that the source, the sink and the progress store are reachable
    TestConn {
        #[command(flatten)]
        opts: TransferArgs,
    },
}

/// Command line overrides shared by every command. Unset flags fall back to
/// the environment.
#[derive(Args, Debug, Clone, Default)]
pub struct TransferArgs {
    #[arg(long, help = "Records per chunk (CHUNK_SIZE)")]
    pub chunk_size: Option<i64>,

    #[arg(long, help = "Concurrent workers (MAX_WORKERS)")]
    pub workers: Option<usize>,

    #[arg(long, help = "Blob format: parquet or jsonl (OUTPUT_FORMAT)")]
    pub format: Option<OutputFormat>,

    #[arg(
        long,
        help = "snappy, gzip, zstd or none; jsonl takes only gzip or none (COMPRESSION)"
    )]
    pub compression: Option<Compression>,

    #[arg(long, help = "Blob name prefix (BLOB_PREFIX)")]
    pub prefix: Option<String>,

    #[arg(long, help = "Memory ceiling in GB, 0 disables (MAX_MEMORY_USAGE_GB)")]
    pub memory_limit_gb: Option<f64>,

    #[arg(long, help = "Attempts per chunk (MAX_RETRIES)")]
    pub retries: Option<u32>,

    #[arg(long, help = "Progress store directory (STATE_PATH)")]
    pub state_path: Option<PathBuf>,

    #[arg(long, help = "Explicit job id (JOB_ID)")]
    pub job_id: Option<String>,
}

impl TransferArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            chunk_size: self.chunk_size,
            worker_count: self.workers,
            output_format: self.format,
            compression: self.compression,
            blob_prefix: self.prefix.clone(),
            memory_limit_gb: self.memory_limit_gb,
            retry_attempts: self.retries,
            state_path: self.state_path.clone(),
            job_id: self.job_id.clone(),
        }
    }
}
