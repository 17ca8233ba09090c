use thiserror::Error;

/// Errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Low-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any SQL driver error.
    #[error("SQL error: {0}")]
    Sql(#[from] tokio_postgres::Error),

    /// A row could not be turned into a document.
    #[error("Decode error: {0}")]
    Decode(String),

    /// An error occurred while building a SQL query.
    #[error("Query build error: {0}")]
    QueryBuildError(String),
}

/// Errors happening during connection setup.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Invalid connection url: {0}")]
    InvalidUrl(String),

    #[error("Postgres connection failed: {0}")]
    Connection(#[from] tokio_postgres::Error),

    #[error("TLS configuration failed: {0}")]
    TlsConfig(#[from] native_tls::Error),
}
