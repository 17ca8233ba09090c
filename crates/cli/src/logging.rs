use crate::error::CliError;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Console logging on stderr, plus a plain-text copy in `file` when set.
///
/// `RUST_LOG` wins over `level`. The returned guard flushes the file writer
/// and must live until the process exits.
pub fn init(level: &str, file: Option<&Path>) -> Result<Option<WorkerGuard>, CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| CliError::Logging(format!("invalid log level '{level}': {e}")))?;

    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let Some(path) = file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .try_init()
            .map_err(|e| CliError::Logging(e.to_string()))?;
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| CliError::Logging(format!("LOG_FILE {} has no file name", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))?;
    Ok(Some(guard))
}
