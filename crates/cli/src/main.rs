use crate::{
    commands::{Commands, TransferArgs},
    error::CliError,
    feed::ProgressFeed,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use engine_config::{env::EnvManager, settings::TransferConfig};
use engine_runtime::{
    error::TransferError,
    execution::{executor, factory, preview::preview, reset::reset_failed},
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod commands;
mod conn;
mod error;
mod feed;
mod logging;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "doc2blob",
    version,
    about = "Chunked, resumable export of a document collection to blob storage"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Environment file to load (defaults to ./.env when present)"
    )]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "doc2blob failed");
            eprintln!("Error: {err}");
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.as_i32());
}

async fn execute(cli: Cli) -> Result<ExitCode, CliError> {
    let env = load_env(cli.env_file.as_deref())?;

    let log_level = env.get_or("LOG_LEVEL", "info").to_lowercase();
    let log_file = env.get("LOG_FILE").map(PathBuf::from);
    let _log_guard = logging::init(&log_level, log_file.as_deref())?;

    match cli.command {
        Commands::Transfer { opts, json, output: report_path } => {
            transfer(&env, &opts, json, report_path).await
        }
        Commands::Plan { opts, json } => {
            let config = TransferConfig::load(&env, &opts.overrides())?;
            let store = factory::store_for(&config)?;
            let source = factory::source_for(&config).await?;
            let plan = preview(&config, source, store).await?;
            if json {
                output::print_json(&plan)?;
            } else {
                output::print_plan(&plan);
            }
            Ok(ExitCode::Success)
        }
        Commands::Progress { opts, json, watch } => {
            let config = lenient_config(&env, &opts)?;
            show_progress(&config, json, watch).await?;
            Ok(ExitCode::Success)
        }
        Commands::Reset { opts, chunks } => {
            let config = lenient_config(&env, &opts)?;
            let store = factory::store_for(&config).map_err(|err| match err {
                TransferError::JobRunning(_) => CliError::JobRunning(format!(
                    "stop the transfer using {} before resetting chunks",
                    config.state_path.display()
                )),
                other => other.into(),
            })?;
            let outcome = reset_failed(store.as_ref(), chunks.as_deref()).await?;
            output::print_reset(&outcome);
            Ok(ExitCode::Success)
        }
        Commands::TestConn { opts } => {
            let config = TransferConfig::load(&env, &opts.overrides())?;
            conn::test_connections(&config).await?;
            Ok(ExitCode::Success)
        }
    }
}

fn load_env(path: Option<&std::path::Path>) -> Result<EnvManager, CliError> {
    let mut env = EnvManager::from_process();
    match path {
        Some(path) => env.load_from_file(path)?,
        None => {
            env.load_default_file()?;
        }
    }
    Ok(env)
}

/// `progress` and `reset` only need to find the store and the job, so the
/// source and sink settings are not validated.
fn lenient_config(env: &EnvManager, opts: &TransferArgs) -> Result<TransferConfig, CliError> {
    let mut config = TransferConfig::from_env(env)?;
    config.apply(&opts.overrides())?;
    Ok(config)
}

async fn transfer(
    env: &EnvManager,
    opts: &TransferArgs,
    json: bool,
    output_path: Option<PathBuf>,
) -> Result<ExitCode, CliError> {
    let config = Arc::new(TransferConfig::load(env, &opts.overrides())?);
    info!(
        source = %config.source.identity(),
        destination = %config.destination(),
        job_id = %config.resolved_job_id(),
        chunk_size = config.chunk_size,
        workers = config.worker_count,
        format = %config.output_format,
        "Loaded transfer configuration"
    );

    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let parts = factory::collaborators(&config).await?;
    let report = executor::run(config, parts, shutdown.cancel_token()).await?;

    if let Some(path) = output_path {
        output::write_report(&report, &path).await?;
    }
    if json {
        output::print_json(&report)?;
    } else {
        output::print_transfer_report(&report);
    }

    if report.interrupted || shutdown.is_shutdown_requested() {
        Ok(ExitCode::ShutdownRequested)
    } else if report.failed_count > 0 {
        Ok(ExitCode::PartialFailure)
    } else {
        Ok(ExitCode::Success)
    }
}

async fn show_progress(
    config: &TransferConfig,
    as_json: bool,
    watch: Option<u64>,
) -> Result<(), CliError> {
    let feed = ProgressFeed::open(config)?;

    let Some(secs) = watch else {
        return print_progress_once(&feed, as_json).await;
    };

    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();
    let cancel = shutdown.cancel_token();
    let interval = Duration::from_secs(secs.max(1));

    loop {
        if !as_json {
            // Clear the screen and move the cursor home.
            print!("\x1B[2J\x1B[H");
        }
        print_progress_once(&feed, as_json).await?;

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn print_progress_once(feed: &ProgressFeed, as_json: bool) -> Result<(), CliError> {
    let view = feed.view().await?;
    if as_json {
        output::print_json(&view)
    } else {
        output::print_progress(&view);
        Ok(())
    }
}
