use crate::{
    error::AdapterError,
    file::csv::source::CsvSource,
    sql::postgres::source::{PgSourceConfig, PostgresSource},
};
use async_trait::async_trait;
use model::records::record::Record;
use std::{fmt, path::PathBuf, str::FromStr, sync::Arc};

/// Read access to the document collection being exported.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Human readable source identity, e.g. `postgres:public.users`.
    fn name(&self) -> String;

    /// Verifies the source is reachable.
    async fn ping(&self) -> Result<(), AdapterError> {
        self.count().await.map(|_| ())
    }

    /// Total number of records the source currently holds.
    async fn count(&self) -> Result<u64, AdapterError>;

    /// Returns up to `limit` records starting at `offset`, in a stable order.
    ///
    /// Fewer than `limit` records only come back when the source ends early.
    async fn read_page(&self, offset: u64, limit: u64) -> Result<Vec<Record>, AdapterError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Postgres,
    Csv,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pg" | "postgres" | "postgresql" => Ok(SourceKind::Postgres),
            "csv" | "file" => Ok(SourceKind::Csv),
            other => Err(format!("Unknown source kind: {other}")),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Postgres => write!(f, "postgres"),
            SourceKind::Csv => write!(f, "csv"),
        }
    }
}

/// Connection settings for building a source reader.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub url: String,
    pub table: Option<String>,
    pub order_by: String,
}

impl SourceSettings {
    /// Stable identity used to derive the job id.
    pub fn identity(&self) -> String {
        match self.kind {
            SourceKind::Postgres => format!(
                "postgres:{}",
                self.table.as_deref().unwrap_or_default()
            ),
            SourceKind::Csv => format!("csv:{}", self.url),
        }
    }
}

pub async fn create_source(settings: &SourceSettings) -> Result<Arc<dyn SourceReader>, AdapterError> {
    match settings.kind {
        SourceKind::Postgres => {
            let table = settings
                .table
                .clone()
                .ok_or_else(|| AdapterError::MissingProperty("SOURCE_TABLE".to_string()))?;
            let source = PostgresSource::connect(PgSourceConfig {
                url: settings.url.clone(),
                table,
                order_by: settings.order_by.clone(),
            })
            .await?;
            Ok(Arc::new(source))
        }
        SourceKind::Csv => {
            let source = CsvSource::open(PathBuf::from(&settings.url))?;
            Ok(Arc::new(source))
        }
    }
}
