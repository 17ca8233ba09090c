use crate::{
    error::AdapterError,
    source::SourceReader,
    sql::{
        base::{
            error::{ConnectorError, DbError},
            ident::quote_ident,
        },
        postgres::utils::connect_client,
    },
};
use async_trait::async_trait;
use model::records::record::Record;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::Client;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PgSourceConfig {
    pub url: String,
    pub table: String,
    pub order_by: String,
}

/// Pages through a Postgres table, returning each row as a JSON document.
///
/// Rows are ordered by `order_by` so that an offset always addresses the
/// same record while the table is not modified.
pub struct PostgresSource {
    config: PgSourceConfig,
    client: Mutex<Option<Arc<Client>>>,
    count_sql: String,
    page_sql: String,
}

impl PostgresSource {
    pub async fn connect(config: PgSourceConfig) -> Result<Self, AdapterError> {
        let table = quote_ident(&config.table)?;
        let order_by = quote_ident(&config.order_by)?;

        let count_sql = format!("SELECT count(*) FROM {table}");
        let page_sql = format!(
            "SELECT to_jsonb(t) FROM {table} AS t ORDER BY t.{order_by} LIMIT $1 OFFSET $2"
        );

        let client = connect_client(&config.url).await?;
        info!(table = %config.table, "Connected to Postgres source");

        Ok(PostgresSource {
            config,
            client: Mutex::new(Some(Arc::new(client))),
            count_sql,
            page_sql,
        })
    }

    /// Returns a live client, reconnecting when the previous connection
    /// has been closed.
    async fn client(&self) -> Result<Arc<Client>, ConnectorError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            if !client.is_closed() {
                return Ok(client.clone());
            }
            warn!(table = %self.config.table, "Source connection closed, reconnecting");
        }

        let client = Arc::new(connect_client(&self.config.url).await?);
        *guard = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl SourceReader for PostgresSource {
    fn name(&self) -> String {
        format!("postgres:{}", self.config.table)
    }

    async fn ping(&self) -> Result<(), AdapterError> {
        let client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, AdapterError> {
        let client = self.client().await?;
        let row = client
            .query_one(&self.count_sql, &[])
            .await
            .map_err(DbError::from)?;
        let count: i64 = row.try_get(0).map_err(DbError::from)?;
        Ok(count.max(0) as u64)
    }

    async fn read_page(&self, offset: u64, limit: u64) -> Result<Vec<Record>, AdapterError> {
        let client = self.client().await?;
        let limit_param = i64::try_from(limit)
            .map_err(|_| DbError::QueryBuildError(format!("limit {limit} out of range")))?;
        let offset_param = i64::try_from(offset)
            .map_err(|_| DbError::QueryBuildError(format!("offset {offset} out of range")))?;

        let rows = client
            .query(&self.page_sql, &[&limit_param, &offset_param])
            .await
            .map_err(DbError::from)?;

        let mut records = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            let doc: serde_json::Value =
                row.try_get(0)
                    .map_err(|e| AdapterError::MalformedRecord {
                        offset: offset + idx as u64,
                        message: e.to_string(),
                    })?;
            records.push(Record::from_value(doc));
        }

        debug!(offset, limit, rows = records.len(), "Read Postgres page");
        Ok(records)
    }
}
