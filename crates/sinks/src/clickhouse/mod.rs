//! ClickHouse adapter
//!
//! The single data sink Spool writes to. Rows are shipped as `JSONEachRow`
//! over the HTTP interface; values from typed envelopes are coerced using the
//! table schema reported by `DESCRIBE TABLE`.
//!
//! # Failure classes
//!
//! | Error | Class | Buffer file |
//! |-------|-------|-------------|
//! | HTTP 404, `UNKNOWN_TABLE`, `UNKNOWN_DATABASE` | permanent | deleted |
//! | other HTTP status | transient | kept for recovery |
//! | connect / timeout / decode | transient | kept for recovery |

mod client;
mod convert;
mod error;
mod metrics;
mod schema;

pub use client::{ClickHouseClient, Row};
pub use convert::{convert_value, is_empty_like, parse_datetime, DATETIME_FORMAT, DATE_FORMAT};
pub use error::SinkError;
pub use metrics::{ClickHouseMetrics, MetricsSnapshot};
pub use schema::{
    parse_column_type, ColumnInfo, ColumnKind, ParsedType, SchemaCache, TableSchema,
};


#[cfg(test)]
#[path = "schema_test.rs"]
mod schema_test;
