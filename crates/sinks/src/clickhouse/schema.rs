//! Table schema metadata
//!
//! Column types come from `DESCRIBE TABLE` as ClickHouse type strings such as
//! `Array(Nullable(String))`. They are reduced to the handful of facts the
//! coercion path needs: a semantic kind, array-ness and nullability.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::client::Row;

/// Semantic type a value is cast to before buffering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Signed or unsigned integers
    Integer,
    /// Float32 / Float64
    Float,
    /// Strings, dates, UUIDs, enums
    String,
    /// Anything else, left untouched
    Passthrough,
}

impl ColumnKind {
    /// Map a base (unwrapped) ClickHouse type name to its semantic kind
    pub fn from_base_type(base: &str) -> Self {
        match base {
            "Int8" | "Int16" | "Int32" | "Int64" | "Int128" | "Int256" => Self::Integer,
            "UInt8" | "UInt16" | "UInt32" | "UInt64" | "UInt128" | "UInt256" => Self::Integer,
            "Float32" | "Float64" => Self::Float,
            "String" | "Date" | "Date32" | "DateTime" | "UUID" => Self::String,
            t if t.starts_with("FixedString(") => Self::String,
            t if t.starts_with("DateTime(") || t.starts_with("DateTime64") => Self::String,
            t if t.starts_with("Enum8(") || t.starts_with("Enum16(") => Self::String,
            _ => Self::Passthrough,
        }
    }
}

/// A ClickHouse type string split into its wrappers and base type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedType<'a> {
    /// Innermost type name, e.g. `String` or `DateTime64(3)`
    pub base: &'a str,
    /// Outer `Array(...)` wrapper present
    pub is_array: bool,
    /// Top-level `Nullable(...)` wrapper present
    pub is_nullable: bool,
}

/// Parse a ClickHouse type string
///
/// Recognizes `Array(...)` and `Nullable(...)`; `LowCardinality(...)` is a
/// storage hint and is stripped wherever it appears. `Nullable` inside an
/// array applies to the elements, so the column itself is not nullable.
pub fn parse_column_type(raw: &str) -> ParsedType<'_> {
    let mut base = strip_low_cardinality(raw.trim());
    let mut is_array = false;
    let mut is_nullable = false;

    if let Some(inner) = strip_wrapper(base, "Array") {
        is_array = true;
        base = strip_low_cardinality(inner);
    }

    if let Some(inner) = strip_wrapper(base, "Nullable") {
        is_nullable = !is_array;
        base = strip_low_cardinality(inner);
    }

    ParsedType {
        base,
        is_array,
        is_nullable,
    }
}

fn strip_wrapper<'a>(s: &'a str, wrapper: &str) -> Option<&'a str> {
    s.strip_prefix(wrapper)?.strip_prefix('(')?.strip_suffix(')')
}

fn strip_low_cardinality(s: &str) -> &str {
    strip_wrapper(s, "LowCardinality").unwrap_or(s)
}

/// Metadata for a single column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Semantic type values are cast to
    pub kind: ColumnKind,
    /// Type string exactly as reported by ClickHouse
    pub raw_type: String,
    /// Column is `Array(...)`
    pub is_array: bool,
    /// Column is `Nullable(...)`
    pub is_nullable: bool,
    /// `DEFAULT` expression, if any
    pub default_expression: Option<String>,
}

impl ColumnInfo {
    /// Build column info from a raw ClickHouse type string
    pub fn from_type(raw_type: &str) -> Self {
        let parsed = parse_column_type(raw_type);
        Self {
            kind: ColumnKind::from_base_type(parsed.base),
            raw_type: raw_type.to_string(),
            is_array: parsed.is_array,
            is_nullable: parsed.is_nullable,
            default_expression: None,
        }
    }
}

/// Columns of one table, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    columns: HashMap<String, ColumnInfo>,
}

impl TableSchema {
    /// Build a schema from `DESCRIBE TABLE` rows
    ///
    /// Rows without a string `name` or `type` are skipped.
    pub fn from_describe(rows: &[Row]) -> Self {
        let columns = rows
            .iter()
            .filter_map(|row| {
                let name = row.get("name")?.as_str()?;
                let raw_type = row.get("type")?.as_str()?;
                let mut info = ColumnInfo::from_type(raw_type);
                info.default_expression = row
                    .get("default_expression")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                Some((name.to_string(), info))
            })
            .collect();

        Self { columns }
    }

    /// Look up a column
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.get(name)
    }

    /// Check if a column exists
    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True if the table reported no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, ColumnInfo)> for TableSchema {
    fn from_iter<I: IntoIterator<Item = (String, ColumnInfo)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// Per-table schema cache
///
/// Entries are shared as `Arc` so lookups never hold the lock across an
/// await point.
#[derive(Debug, Default)]
pub struct SchemaCache {
    tables: Mutex<HashMap<String, Arc<TableSchema>>>,
}

impl SchemaCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached schema for a table
    pub fn get(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.tables.lock().get(table).cloned()
    }

    /// Store a schema, returning the shared handle
    pub fn insert(&self, table: &str, schema: TableSchema) -> Arc<TableSchema> {
        let schema = Arc::new(schema);
        self.tables
            .lock()
            .insert(table.to_string(), Arc::clone(&schema));
        schema
    }

    /// Drop a table's cached schema
    pub fn invalidate(&self, table: &str) {
        self.tables.lock().remove(table);
    }

    /// Number of cached tables
    pub fn len(&self) -> usize {
        self.tables.lock().len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.tables.lock().is_empty()
    }
}
