use crate::sql::base::error::ConnectorError;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::{
    Client, Config, Connection, NoTls, Socket, config::SslMode, tls::TlsStream,
};
use tracing::{error, warn};

/// Opens a client honoring the `sslmode` of the url. `prefer` falls back to
/// a plain connection when the handshake fails.
pub async fn connect_client(url: &str) -> Result<Client, ConnectorError> {
    let config: Config = url
        .parse()
        .map_err(|e: tokio_postgres::Error| ConnectorError::InvalidUrl(e.to_string()))?;

    match config.get_ssl_mode() {
        SslMode::Disable => connect_plain(&config).await,
        SslMode::Prefer => match connect_tls(&config).await {
            Ok(client) => Ok(client),
            Err(err) => {
                warn!(error = %err, "TLS handshake with source failed, falling back to plain connection");
                connect_plain(&config).await
            }
        },
        _ => connect_tls(&config).await,
    }
}

async fn connect_tls(config: &Config) -> Result<Client, ConnectorError> {
    let tls = MakeTlsConnector::new(TlsConnector::builder().build()?);
    let (client, connection) = config.connect(tls).await?;
    drive(connection);
    Ok(client)
}

async fn connect_plain(config: &Config) -> Result<Client, ConnectorError> {
    let (client, connection) = config.connect(NoTls).await?;
    drive(connection);
    Ok(client)
}

fn drive<T>(connection: Connection<Socket, T>)
where
    T: TlsStream + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(error = %err, "Source connection terminated");
        }
    });
}
