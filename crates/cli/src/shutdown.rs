use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Turns SIGINT/SIGTERM into a cancellation of the running transfer.
///
/// Workers stop taking new chunks; chunks already in flight finish and are
/// recorded before the process exits.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_handlers(&self) {
        let cancel_token = self.cancel_token.clone();
        let shutdown_flag = self.shutdown_requested.clone();

        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(err) = signal::ctrl_c().await {
                    error!(error = %err, "Failed to install SIGINT handler");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(err) => {
                        error!(error = %err, "Failed to install SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT, finishing in-flight chunks"),
                _ = terminate => info!("Received SIGTERM, finishing in-flight chunks"),
            }

            shutdown_flag.store(true, Ordering::SeqCst);
            cancel_token.cancel();
            warn!("No new chunks will be started; progress so far is kept");
        });
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

/// Exit codes for the CLI application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// The run finished but some chunks are failed.
    PartialFailure = 2,
    ShutdownRequested = 130, // Standard exit code for SIGINT
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
