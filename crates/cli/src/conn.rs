use crate::error::CliError;
use async_trait::async_trait;
use engine_config::settings::TransferConfig;
use engine_runtime::execution::factory;
use tracing::{error, info};

/// Something `test-conn` can reach out to.
#[async_trait]
pub trait ConnectionPinger: Send + Sync {
    fn kind(&self) -> &'static str;

    fn target(&self) -> String;

    /// Attempts to ping; returns Err if unreachable
    async fn ping(&self) -> Result<(), String>;
}

pub struct SourcePinger<'a> {
    pub config: &'a TransferConfig,
}

pub struct SinkPinger<'a> {
    pub config: &'a TransferConfig,
}

pub struct StorePinger<'a> {
    pub config: &'a TransferConfig,
}

#[async_trait]
impl ConnectionPinger for SourcePinger<'_> {
    fn kind(&self) -> &'static str {
        "source"
    }

    fn target(&self) -> String {
        self.config.source.identity()
    }

    async fn ping(&self) -> Result<(), String> {
        let source = factory::source_for(self.config)
            .await
            .map_err(|e| e.to_string())?;
        source.ping().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ConnectionPinger for SinkPinger<'_> {
    fn kind(&self) -> &'static str {
        "sink"
    }

    fn target(&self) -> String {
        self.config.sink.identity()
    }

    async fn ping(&self) -> Result<(), String> {
        let sink = factory::sink_for(self.config)
            .await
            .map_err(|e| e.to_string())?;
        sink.ping().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ConnectionPinger for StorePinger<'_> {
    fn kind(&self) -> &'static str {
        "progress store"
    }

    fn target(&self) -> String {
        self.config.state_path.display().to_string()
    }

    async fn ping(&self) -> Result<(), String> {
        let store = factory::store_for(self.config).map_err(|e| e.to_string())?;
        store.ping().await.map_err(|e| e.to_string())
    }
}

/// Pings everything a transfer needs and prints one line per check.
pub async fn test_connections(config: &TransferConfig) -> Result<(), CliError> {
    let pingers: [&dyn ConnectionPinger; 3] = [
        &SourcePinger { config },
        &SinkPinger { config },
        &StorePinger { config },
    ];

    let mut failed = 0;
    for pinger in pingers {
        info!(kind = pinger.kind(), target = %pinger.target(), "Pinging");
        match pinger.ping().await {
            Ok(()) => println!("{:<16} {:<8} {}", pinger.kind(), "ok", pinger.target()),
            Err(err) => {
                error!(kind = pinger.kind(), error = %err, "Ping failed");
                println!("{:<16} {:<8} {} ({err})", pinger.kind(), "FAILED", pinger.target());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(CliError::ConnectionCheck {
            failed,
            total: pingers.len(),
        });
    }
    Ok(())
}
