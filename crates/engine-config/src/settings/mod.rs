use crate::{env::EnvManager, settings::error::SettingsError};
use connectors::{
    sink::{SinkSettings, s3::S3Config},
    source::{SourceKind, SourceSettings},
};
use engine_core::{retry::RetryPolicy, snapshot::snapshot_path};
use model::core::format::{Compression, OutputFormat};
use planner::naming::{job_id, normalize_prefix};
use std::{path::PathBuf, time::Duration};

pub mod error;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Immutable settings of one transfer, built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferConfig {
    pub source: SourceSettings,
    pub sink: SinkSettings,
    pub blob_prefix: String,
    pub chunk_size: i64,
    pub worker_count: usize,
    pub memory_ceiling_bytes: u64,
    pub memory_poll_interval: Duration,
    pub retry_attempts: u32,
    pub retry_backoff_base: Duration,
    pub retry_backoff_max: Duration,
    pub output_format: OutputFormat,
    pub compression: Compression,
    pub state_path: PathBuf,
    pub status_interval: Duration,
    pub job_id: Option<String>,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

/// Values given on the command line. Set fields win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub chunk_size: Option<i64>,
    pub worker_count: Option<usize>,
    pub output_format: Option<OutputFormat>,
    pub compression: Option<Compression>,
    pub blob_prefix: Option<String>,
    pub memory_limit_gb: Option<f64>,
    pub retry_attempts: Option<u32>,
    pub state_path: Option<PathBuf>,
    pub job_id: Option<String>,
}

fn invalid(message: impl Into<String>) -> SettingsError {
    SettingsError::InvalidConfig(message.into())
}

fn gib_to_bytes(gb: f64) -> Result<u64, SettingsError> {
    if !gb.is_finite() || gb < 0.0 {
        return Err(invalid(format!("memory limit must be >= 0 GB, got {gb}")));
    }
    Ok((gb * GIB) as u64)
}

/// `~/.doc2blob/state`. Fails when there is no home directory.
fn default_state_path(home: Option<PathBuf>) -> Result<PathBuf, SettingsError> {
    home.map(|home| home.join(".doc2blob").join("state"))
        .ok_or_else(|| invalid("could not determine the home directory; set STATE_PATH"))
}

impl TransferConfig {
    /// Reads every recognised key from `env`, applying defaults. The result
    /// still has to be validated.
    pub fn from_env(env: &EnvManager) -> Result<Self, SettingsError> {
        let source_kind: SourceKind = env
            .get_or("SOURCE_KIND", "postgres")
            .parse()
            .map_err(invalid)?;
        let source = SourceSettings {
            kind: source_kind,
            url: env.get_or("SOURCE_URL", "").to_string(),
            table: env.get("SOURCE_TABLE").map(str::to_string),
            order_by: env.get_or("SOURCE_ORDER_BY", "id").to_string(),
        };

        let sink = match env.get_or("SINK_KIND", "fs").to_lowercase().as_str() {
            "fs" | "file" | "local" => SinkSettings::Fs {
                root: PathBuf::from(env.get_or("SINK_PATH", "./export")),
            },
            "s3" => SinkSettings::S3(S3Config {
                bucket: env.get_or("S3_BUCKET", "").to_string(),
                region: Some(env.get_or("S3_REGION", "us-east-1").to_string()),
                endpoint: env.get("S3_ENDPOINT").map(str::to_string),
                force_path_style: env.flag("S3_PATH_STYLE")?,
                access_key: env.get("S3_ACCESS_KEY").map(str::to_string),
                secret_key: env.get("S3_SECRET_KEY").map(str::to_string),
            }),
            other => return Err(invalid(format!("SINK_KIND={other}: expected fs or s3"))),
        };

        let output_format: OutputFormat = env
            .get_or("OUTPUT_FORMAT", "parquet")
            .parse()
            .map_err(invalid)?;
        let compression = match env.get("COMPRESSION") {
            Some(raw) => raw.parse::<Compression>().map_err(invalid)?,
            None => output_format.default_compression(),
        };

        let state_path = match env.get("STATE_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_state_path(dirs::home_dir())?,
        };

        Ok(TransferConfig {
            source,
            sink,
            blob_prefix: normalize_prefix(env.get_or("BLOB_PREFIX", "export/")),
            chunk_size: env.parse_or("CHUNK_SIZE", 100_000i64)?,
            worker_count: env.parse_or("MAX_WORKERS", 4usize)?,
            memory_ceiling_bytes: gib_to_bytes(env.parse_or("MAX_MEMORY_USAGE_GB", 8.0f64)?)?,
            memory_poll_interval: Duration::from_millis(env.parse_or("MEMORY_POLL_MS", 500u64)?),
            retry_attempts: env.parse_or("MAX_RETRIES", 3u32)?,
            retry_backoff_base: Duration::from_millis(env.parse_or("RETRY_DELAY_MS", 1_000u64)?),
            retry_backoff_max: Duration::from_millis(
                env.parse_or("RETRY_MAX_DELAY_MS", 30_000u64)?,
            ),
            output_format,
            compression,
            state_path,
            status_interval: Duration::from_millis(env.parse_or("STATUS_INTERVAL_MS", 2_000u64)?),
            job_id: env.get("JOB_ID").map(str::to_string),
            log_level: env.get_or("LOG_LEVEL", "info").to_lowercase(),
            log_file: env.get("LOG_FILE").map(PathBuf::from),
        })
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) -> Result<(), SettingsError> {
        if let Some(size) = overrides.chunk_size {
            self.chunk_size = size;
        }
        if let Some(workers) = overrides.worker_count {
            self.worker_count = workers;
        }
        if let Some(format) = overrides.output_format {
            // A codec that was only the old format's default follows the format.
            if overrides.compression.is_none()
                && self.compression == self.output_format.default_compression()
            {
                self.compression = format.default_compression();
            }
            self.output_format = format;
        }
        if let Some(compression) = overrides.compression {
            self.compression = compression;
        }
        if let Some(prefix) = &overrides.blob_prefix {
            self.blob_prefix = normalize_prefix(prefix);
        }
        if let Some(gb) = overrides.memory_limit_gb {
            self.memory_ceiling_bytes = gib_to_bytes(gb)?;
        }
        if let Some(attempts) = overrides.retry_attempts {
            self.retry_attempts = attempts;
        }
        if let Some(path) = &overrides.state_path {
            self.state_path = path.clone();
        }
        if let Some(id) = &overrides.job_id {
            self.job_id = Some(id.clone());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.chunk_size <= 0 {
            return Err(invalid(format!(
                "chunk size must be positive, got {}",
                self.chunk_size
            )));
        }
        if self.worker_count == 0 {
            return Err(invalid("worker count must be at least 1"));
        }
        if self.retry_attempts == 0 {
            return Err(invalid("retry attempts must be at least 1"));
        }
        if !self.output_format.supports(self.compression) {
            return Err(invalid(format!(
                "COMPRESSION={} is not supported for {} output (use none or gzip)",
                self.compression, self.output_format
            )));
        }
        if self.source.url.trim().is_empty() {
            return Err(invalid("SOURCE_URL is required"));
        }
        if self.source.kind == SourceKind::Postgres && self.source.table.is_none() {
            return Err(invalid("SOURCE_TABLE is required for a postgres source"));
        }
        if let SinkSettings::S3(s3) = &self.sink {
            if s3.bucket.trim().is_empty() {
                return Err(invalid("S3_BUCKET is required for an s3 sink"));
            }
            if s3.access_key.is_some() != s3.secret_key.is_some() {
                return Err(invalid(
                    "S3_ACCESS_KEY and S3_SECRET_KEY must be set together",
                ));
            }
        }
        if self.job_id.as_deref().is_some_and(|id| id.contains(':')) {
            return Err(invalid("JOB_ID must not contain ':'"));
        }
        Ok(())
    }

    /// Builds, overrides and validates in one step.
    pub fn load(env: &EnvManager, overrides: &ConfigOverrides) -> Result<Self, SettingsError> {
        let mut config = Self::from_env(env)?;
        config.apply(overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Destination identity including the blob prefix.
    pub fn destination(&self) -> String {
        let base = self.sink.identity();
        format!("{}/{}", base.trim_end_matches('/'), self.blob_prefix)
    }

    /// Explicit job id, or one derived from what is being transferred where.
    pub fn resolved_job_id(&self) -> String {
        match &self.job_id {
            Some(id) => id.clone(),
            None => job_id(
                &self.source.identity(),
                &self.destination(),
                self.output_format,
                self.compression,
                self.chunk_size.max(0) as u64,
            ),
        }
    }

    /// Status file a running transfer publishes for other processes.
    pub fn status_path(&self) -> PathBuf {
        snapshot_path(&self.state_path, &self.resolved_job_id())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            self.retry_backoff_base,
            self.retry_backoff_max,
        )
    }
}
