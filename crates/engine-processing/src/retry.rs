use crate::error::ChunkError;
use connectors::{
    error::{AdapterError, SinkError},
    file::csv::error::FileError,
    sql::base::error::{ConnectorError, DbError},
};
use engine_core::retry::RetryDisposition;
use std::{error::Error as _, io::ErrorKind};
use tokio_postgres::{Error as PgError, error::SqlState};

pub fn classify_chunk_error(err: &ChunkError) -> RetryDisposition {
    match err {
        ChunkError::Read { source, .. } => classify_adapter_error(source),
        ChunkError::Exists { source, .. } | ChunkError::Write { source, .. } => {
            classify_sink_error(source)
        }
        ChunkError::Serialize { .. } => RetryDisposition::Stop,
        ChunkError::Task { .. } => RetryDisposition::Stop,
    }
}

pub fn classify_adapter_error(err: &AdapterError) -> RetryDisposition {
    match err {
        AdapterError::Database(db_err) => classify_db_error(db_err),
        AdapterError::Connector(conn_err) => classify_connector_error(conn_err),
        AdapterError::FileError(file_err) => classify_file_error(file_err),
        AdapterError::MalformedRecord { .. } => RetryDisposition::Stop,
        AdapterError::UnsupportedFormat(_) => RetryDisposition::Stop,
        AdapterError::MissingProperty(_) => RetryDisposition::Stop,
        AdapterError::Generic(_) => RetryDisposition::Stop,
    }
}

pub fn classify_db_error(err: &DbError) -> RetryDisposition {
    match err {
        DbError::Io(io_err) => classify_io_error(io_err),
        DbError::Sql(pg_err) => classify_pg_error(pg_err),
        DbError::Decode(_) => RetryDisposition::Stop,
        DbError::QueryBuildError(_) => RetryDisposition::Stop,
    }
}

pub fn classify_sink_error(err: &SinkError) -> RetryDisposition {
    match err {
        SinkError::Io(io_err) => classify_io_error(io_err),
        SinkError::Timeout(_) | SinkError::Dispatch(_) => RetryDisposition::Retry,
        SinkError::Service { status, .. } => match status {
            None => RetryDisposition::Retry,
            Some(code) if *code >= 500 || *code == 408 || *code == 429 => RetryDisposition::Retry,
            Some(_) => RetryDisposition::Stop,
        },
        SinkError::InvalidName(_) => RetryDisposition::Stop,
        SinkError::Config(_) => RetryDisposition::Stop,
        SinkError::Other(_) => RetryDisposition::Stop,
    }
}

fn classify_file_error(err: &FileError) -> RetryDisposition {
    match err {
        FileError::IoError(io_err) => classify_io_error(io_err),
        FileError::NotFound(_) => RetryDisposition::Stop,
        FileError::InvalidFormat(_) => RetryDisposition::Stop,
        FileError::CsvError(_) => RetryDisposition::Stop,
        FileError::ReadError(_) => RetryDisposition::Stop,
    }
}

fn classify_connector_error(err: &ConnectorError) -> RetryDisposition {
    match err {
        ConnectorError::Connection(_) => RetryDisposition::Retry,
        ConnectorError::InvalidUrl(_) => RetryDisposition::Stop,
        ConnectorError::TlsConfig(_) => RetryDisposition::Stop,
    }
}

fn classify_io_error(err: &std::io::Error) -> RetryDisposition {
    match err.kind() {
        ErrorKind::PermissionDenied
        | ErrorKind::NotFound
        | ErrorKind::InvalidInput
        | ErrorKind::InvalidData
        | ErrorKind::Unsupported => RetryDisposition::Stop,
        _ => RetryDisposition::Retry,
    }
}

fn classify_pg_error(err: &PgError) -> RetryDisposition {
    if err.is_closed() {
        return RetryDisposition::Retry;
    }

    if let Some(code) = err.code() {
        return if is_retryable_pg_code(code) {
            RetryDisposition::Retry
        } else {
            RetryDisposition::Stop
        };
    }

    // Without a server code the failure happened on the wire.
    if err
        .source()
        .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some())
    {
        return RetryDisposition::Retry;
    }

    RetryDisposition::Stop
}

fn is_retryable_pg_code(code: &SqlState) -> bool {
    matches!(
        *code,
        SqlState::T_R_SERIALIZATION_FAILURE
            | SqlState::T_R_DEADLOCK_DETECTED
            | SqlState::LOCK_NOT_AVAILABLE
            | SqlState::TOO_MANY_CONNECTIONS
            | SqlState::ADMIN_SHUTDOWN
            | SqlState::CRASH_SHUTDOWN
            | SqlState::CANNOT_CONNECT_NOW
            | SqlState::CONNECTION_FAILURE
            | SqlState::CONNECTION_DOES_NOT_EXIST
            | SqlState::CONNECTION_EXCEPTION
            | SqlState::QUERY_CANCELED
    )
}
