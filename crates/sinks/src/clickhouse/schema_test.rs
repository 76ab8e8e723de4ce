//! Tests for type parsing and the schema cache

use serde_json::json;

use super::*;

fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

// =============================================================================
// Type strings
// =============================================================================

#[test]
fn test_parse_plain_type() {
    let parsed = parse_column_type("UInt32");
    assert_eq!(parsed.base, "UInt32");
    assert!(!parsed.is_array);
    assert!(!parsed.is_nullable);
}

#[test]
fn test_parse_nullable() {
    let parsed = parse_column_type("Nullable(Float64)");
    assert_eq!(parsed.base, "Float64");
    assert!(parsed.is_nullable);
}

#[test]
fn test_parse_array_of_nullable() {
    let parsed = parse_column_type("Array(Nullable(String))");
    assert_eq!(parsed.base, "String");
    assert!(parsed.is_array);
    assert!(!parsed.is_nullable);
}

#[test]
fn test_parse_strips_low_cardinality() {
    let parsed = parse_column_type("LowCardinality(Nullable(String))");
    assert_eq!(parsed.base, "String");
    assert!(parsed.is_nullable);

    let parsed = parse_column_type("Array(LowCardinality(String))");
    assert_eq!(parsed.base, "String");
    assert!(parsed.is_array);
}

#[test]
fn test_parse_keeps_parameters() {
    assert_eq!(parse_column_type("DateTime64(3, 'UTC')").base, "DateTime64(3, 'UTC')");
    assert_eq!(parse_column_type("Nullable(FixedString(16))").base, "FixedString(16)");
}

#[test]
fn test_kind_lookup() {
    let cases = [
        ("Int8", ColumnKind::Integer),
        ("UInt256", ColumnKind::Integer),
        ("Float32", ColumnKind::Float),
        ("String", ColumnKind::String),
        ("FixedString(2)", ColumnKind::String),
        ("Date", ColumnKind::String),
        ("Date32", ColumnKind::String),
        ("DateTime", ColumnKind::String),
        ("DateTime('Europe/Berlin')", ColumnKind::String),
        ("DateTime64(6)", ColumnKind::String),
        ("UUID", ColumnKind::String),
        ("Enum8('a' = 1, 'b' = 2)", ColumnKind::String),
        ("Decimal(10, 2)", ColumnKind::Passthrough),
        ("Map(String, UInt64)", ColumnKind::Passthrough),
        ("Bool", ColumnKind::Passthrough),
        ("IPv4", ColumnKind::Passthrough),
    ];
    for (ty, kind) in cases {
        assert_eq!(ColumnKind::from_base_type(ty), kind, "{ty}");
    }
}

#[test]
fn test_column_info_from_type() {
    let info = ColumnInfo::from_type("Array(Int64)");
    assert_eq!(info.kind, ColumnKind::Integer);
    assert_eq!(info.raw_type, "Array(Int64)");
    assert!(info.is_array);
    assert!(!info.is_nullable);
}

// =============================================================================
// TableSchema
// =============================================================================

#[test]
fn test_from_describe() {
    let rows = vec![
        row(json!({"name": "id", "type": "UInt64", "default_expression": ""})),
        row(json!({"name": "created", "type": "DateTime", "default_expression": "now()"})),
        row(json!({"name": "broken"})),
    ];
    let schema = TableSchema::from_describe(&rows);

    assert_eq!(schema.len(), 2);
    assert!(schema.contains("id"));
    assert!(!schema.contains("broken"));
    assert_eq!(schema.column("id").unwrap().default_expression, None);
    assert_eq!(
        schema.column("created").unwrap().default_expression.as_deref(),
        Some("now()")
    );
}

#[test]
fn test_from_describe_empty() {
    let schema = TableSchema::from_describe(&[]);
    assert!(schema.is_empty());
}

// =============================================================================
// SchemaCache
// =============================================================================

#[test]
fn test_cache_insert_get_invalidate() {
    let cache = SchemaCache::new();
    assert!(cache.is_empty());

    let schema: TableSchema = [("id".to_string(), ColumnInfo::from_type("UInt8"))]
        .into_iter()
        .collect();
    let stored = cache.insert("orders", schema);

    let fetched = cache.get("orders").unwrap();
    assert!(std::sync::Arc::ptr_eq(&stored, &fetched));
    assert_eq!(cache.len(), 1);

    cache.invalidate("orders");
    assert!(cache.get("orders").is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_cache_insert_replaces() {
    let cache = SchemaCache::new();
    cache.insert("orders", TableSchema::default());
    let schema: TableSchema = [("id".to_string(), ColumnInfo::from_type("UInt8"))]
        .into_iter()
        .collect();
    cache.insert("orders", schema);

    assert_eq!(cache.len(), 1);
    assert!(cache.get("orders").unwrap().contains("id"));
}
