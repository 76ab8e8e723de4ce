//! ClickHouse HTTP client
//!
//! Talks to the ClickHouse HTTP interface directly with `reqwest`: statements
//! go in the request body (`FORMAT JSON` for reads), inserts carry their SQL in
//! the `query` parameter and the NDJSON rows as the body.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use spool_config::ClickHouseConfig;

use super::convert::convert_value;
use super::error::SinkError;
use super::metrics::{ClickHouseMetrics, MetricsSnapshot};
use super::schema::{SchemaCache, TableSchema};
use crate::table::TableName;
use crate::DataSink;

/// One result row as returned by `FORMAT JSON`
pub type Row = serde_json::Map<String, Value>;

/// Settings sent with every insert
///
/// Inserts must tolerate loosely shaped rows: unknown fields are skipped,
/// `null` falls back to the column default and dates are parsed best-effort.
const INSERT_SETTINGS: &[(&str, &str)] = &[
    ("max_partitions_per_insert_block", "0"),
    ("wait_end_of_query", "1"),
    ("send_progress_in_http_headers", "1"),
    ("session_timeout", "600"),
    ("input_format_null_as_default", "1"),
    ("input_format_skip_unknown_fields", "1"),
    ("date_time_input_format", "best_effort"),
];

/// `FORMAT JSON` response envelope
#[derive(Debug, Deserialize)]
struct JsonEnvelope {
    #[serde(default)]
    data: Vec<Row>,
}

// =============================================================================
// Client
// =============================================================================

/// ClickHouse adapter: statements, batched inserts and schema-aware coercion
pub struct ClickHouseClient {
    http: reqwest::Client,
    url: String,
    database: String,
    user: String,
    password: String,
    schemas: SchemaCache,
    metrics: ClickHouseMetrics,
}

impl std::fmt::Debug for ClickHouseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseClient")
            .field("url", &self.url)
            .field("database", &self.database)
            .field("user", &self.user)
            .finish()
    }
}

impl ClickHouseClient {
    /// Create a client for the configured server
    pub fn new(config: &ClickHouseConfig) -> Result<Self, SinkError> {
        Self::with_url(config, config.url())
    }

    /// Create a client against an explicit base URL
    ///
    /// Everything but host, port and scheme is still taken from `config`.
    pub fn with_url(config: &ClickHouseConfig, url: impl Into<String>) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            url: url.into().trim_end_matches('/').to_string(),
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            schemas: SchemaCache::new(),
            metrics: ClickHouseMetrics::new(),
        })
    }

    /// Current metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Schema cache (exposed for inspection)
    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    /// POST to the HTTP interface, mapping error statuses to `SinkError::Status`
    async fn post(&self, params: &[(&str, &str)], body: Bytes) -> Result<String, SinkError> {
        let mut request = self
            .http
            .post(&self.url)
            .query(&[("database", self.database.as_str())])
            .query(params)
            .body(body);

        if !self.user.is_empty() {
            request = request.basic_auth(&self.user, Some(&self.password));
        }

        let result = send(request).await;
        if result.is_err() {
            self.metrics.record_error();
        }
        result
    }

    /// Run a read statement and return the `data` rows
    ///
    /// `FORMAT JSON` is appended, so `sql` must not carry its own format
    /// clause. Statements without a result set yield an empty vector.
    pub async fn execute(&self, sql: &str) -> Result<Vec<Row>, SinkError> {
        let start = Instant::now();
        let statement = format!("{} FORMAT JSON", sql.trim().trim_end_matches(';'));

        let text = self.post(&[], Bytes::from(statement)).await?;
        self.metrics.record_statement();

        tracing::debug!(
            sql,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "clickhouse statement executed"
        );

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let envelope: JsonEnvelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.metrics.record_error();
                return Err(e.into());
            }
        };
        Ok(envelope.data)
    }

    /// Batch-insert NDJSON rows into a table
    pub async fn insert_rows(&self, table: &TableName, rows: Bytes) -> Result<(), SinkError> {
        let start = Instant::now();
        let bytes = rows.len() as u64;
        let query = format!("INSERT INTO {} FORMAT JSONEachRow", table);

        let mut params = Vec::with_capacity(INSERT_SETTINGS.len() + 1);
        params.extend_from_slice(INSERT_SETTINGS);
        params.push(("query", query.as_str()));

        self.post(&params, rows).await?;
        self.metrics.record_insert(bytes);

        tracing::debug!(
            table = %table,
            bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "clickhouse insert completed"
        );
        Ok(())
    }

    /// Schema for a table, fetched on first use
    pub async fn schema(&self, table: &TableName) -> Result<Arc<TableSchema>, SinkError> {
        if let Some(schema) = self.schemas.get(table.as_str()) {
            return Ok(schema);
        }
        self.fetch_schema(table).await
    }

    /// Fetch a table's schema from the server and cache it
    async fn fetch_schema(&self, table: &TableName) -> Result<Arc<TableSchema>, SinkError> {
        let rows = self.execute(&format!("DESCRIBE TABLE {}", table)).await?;
        self.metrics.record_schema_fetch();

        let schema = TableSchema::from_describe(&rows);
        tracing::debug!(table = %table, columns = schema.len(), "schema loaded");
        Ok(self.schemas.insert(table.as_str(), schema))
    }

    /// Schema that is guaranteed fresh for `columns`
    ///
    /// If any column is unknown to the cached schema it is dropped and fetched
    /// again, once. Columns still missing afterwards are left to the caller.
    async fn schema_for<'a, I>(&self, table: &TableName, columns: I) -> Result<Arc<TableSchema>, SinkError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let schema = self.schema(table).await?;
        if columns.into_iter().all(|column| schema.contains(column)) {
            return Ok(schema);
        }

        tracing::debug!(table = %table, "unknown column, refreshing schema");
        self.schemas.invalidate(table.as_str());
        self.fetch_schema(table).await
    }

    /// Coerce one value to its column's type
    pub async fn convert_to_type(
        &self,
        table: &TableName,
        column: &str,
        value: Value,
    ) -> Result<Value, SinkError> {
        let schema = self.schema_for(table, [column]).await?;
        Ok(match schema.column(column) {
            Some(info) => convert_value(info, value),
            None => value,
        })
    }

    /// Coerce every value of a row, refreshing the schema at most once
    pub async fn convert_row_values(&self, table: &TableName, row: Row) -> Result<Row, SinkError> {
        let schema = self.schema_for(table, row.keys().map(String::as_str)).await?;
        Ok(row
            .into_iter()
            .map(|(column, value)| {
                let value = match schema.column(&column) {
                    Some(info) => convert_value(info, value),
                    None => value,
                };
                (column, value)
            })
            .collect())
    }

    /// Prefetch the schema of every table in the database
    ///
    /// Hidden tables (names starting with `.`) are skipped, as are names that
    /// are not plain identifiers. Returns the number of schemas loaded.
    pub async fn warm_schema_cache(&self) -> Result<usize, SinkError> {
        let rows = self.execute("SHOW TABLES").await?;
        let mut loaded = 0;

        for name in rows.iter().filter_map(|row| row.get("name")?.as_str()) {
            if name.starts_with('.') {
                continue;
            }
            let Ok(table) = TableName::new(name) else {
                tracing::debug!(table = name, "skipping table with unsupported name");
                continue;
            };
            match self.fetch_schema(&table).await {
                Ok(_) => loaded += 1,
                Err(e) => tracing::warn!(table = %table, error = %e, "failed to load schema"),
            }
        }

        Ok(loaded)
    }

    /// Check that the server answers (`SELECT 1`)
    pub async fn ping(&self) -> Result<(), SinkError> {
        self.execute("SELECT 1").await.map(|_| ())
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<String, SinkError> {
    let response = request.send().await?;
    let status = response.status().as_u16();
    let body = response.text().await?;

    if status >= 400 {
        return Err(SinkError::Status { status, body });
    }
    Ok(body)
}

#[async_trait]
impl DataSink for ClickHouseClient {
    fn name(&self) -> &str {
        "clickhouse"
    }

    async fn insert(&self, table: &TableName, rows: Bytes) -> Result<(), SinkError> {
        self.insert_rows(table, rows).await
    }

    async fn convert_to_type(
        &self,
        table: &TableName,
        column: &str,
        value: Value,
    ) -> Result<Value, SinkError> {
        ClickHouseClient::convert_to_type(self, table, column, value).await
    }

    async fn convert_row(&self, table: &TableName, row: Row) -> Result<Row, SinkError> {
        self.convert_row_values(table, row).await
    }
}
