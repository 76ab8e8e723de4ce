//! Spool - Sinks
//!
//! Destination side of the bridge: the ClickHouse HTTP adapter, its schema
//! cache and the [`DataSink`] seam the buffer and consumer are written
//! against.
//!
//! ```text
//! [Flush Engine] --insert(table, ndjson)--> [DataSink] --> ClickHouse
//! [Consumer]     --convert_row(table, row)-->
//! ```

pub mod clickhouse;
mod table;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

pub use clickhouse::{ClickHouseClient, Row, SinkError};
pub use table::{InvalidTableName, TableName, MAX_TABLE_NAME_LEN};

/// Destination for buffered rows
///
/// One instance exists per process and is shared as `Arc<dyn DataSink>`.
#[async_trait]
pub trait DataSink: Send + Sync {
    /// Sink name for logs
    fn name(&self) -> &str;

    /// Insert a batch of newline-delimited JSON rows
    async fn insert(&self, table: &TableName, rows: Bytes) -> Result<(), SinkError>;

    /// Coerce a single value to the type of `table.column`
    async fn convert_to_type(
        &self,
        table: &TableName,
        column: &str,
        value: Value,
    ) -> Result<Value, SinkError>;

    /// Coerce every value of a row
    async fn convert_row(&self, table: &TableName, row: Row) -> Result<Row, SinkError> {
        let mut converted = Row::new();
        for (column, value) in row {
            let value = self.convert_to_type(table, &column, value).await?;
            converted.insert(column, value);
        }
        Ok(converted)
    }
}
