//! Value coercion for typed envelopes
//!
//! Producers using the legacy `{ "table": ..., "values": {...} }` envelope send
//! loosely typed values (numbers as strings, free-form dates, nested objects
//! for string columns). ClickHouse rejects most of these in `JSONEachRow`, so
//! each value is cast to its column's semantic type before buffering.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Number, Value};

use super::schema::{ColumnInfo, ColumnKind};

/// Canonical `Date` layout
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Canonical `DateTime` layout
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
];

const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y", "%Y%m%d"];

/// Coerce a value for the given column
pub fn convert_value(column: &ColumnInfo, value: Value) -> Value {
    if column.is_nullable && is_empty_like(&value) {
        return Value::Null;
    }

    if column.is_array {
        return convert_array(column.kind, value);
    }

    if let Some(format) = canonical_format(&column.raw_type)
        && is_truthy(&value)
        && !is_canonical(&value, format)
    {
        return reformat_datetime(value, format);
    }

    if column.kind == ColumnKind::String && is_structured(&value) {
        return Value::String(value.to_string());
    }

    cast(column.kind, value)
}

/// Falsy values other than `""` and integer `0`
///
/// The empty string and integer zero are legitimate values for a nullable
/// column and must not be turned into `NULL`.
pub fn is_empty_like(value: &Value) -> bool {
    match value {
        Value::String(s) if s.is_empty() => false,
        Value::Number(n) if n.is_i64() || n.is_u64() => false,
        other => !is_truthy(other),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn is_structured(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

fn convert_array(kind: ColumnKind, value: Value) -> Value {
    let items = match value {
        Value::Array(items) => items,
        v if !is_truthy(&v) => Vec::new(),
        v => vec![v],
    };

    Value::Array(
        items
            .into_iter()
            .map(|item| {
                if kind == ColumnKind::String && is_structured(&item) {
                    Value::String(item.to_string())
                } else {
                    cast(kind, item)
                }
            })
            .collect(),
    )
}

/// Cast a scalar to a semantic kind
///
/// `null` is left alone so that `input_format_null_as_default` can fill the
/// column default. Structured values only change for string columns.
fn cast(kind: ColumnKind, value: Value) -> Value {
    match (kind, value) {
        (ColumnKind::Passthrough, v) | (_, v @ Value::Null) => v,

        (ColumnKind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Value::Number(n),
        (ColumnKind::Integer, Value::Number(n)) => {
            Value::from(n.as_f64().map_or(0, |f| f.trunc() as i64))
        }
        (ColumnKind::Integer, Value::String(s)) => parse_integer(&s),
        (ColumnKind::Integer, Value::Bool(b)) => Value::from(i64::from(b)),

        (ColumnKind::Float, Value::Number(n)) => float_value(n.as_f64().unwrap_or(0.0)),
        (ColumnKind::Float, Value::String(s)) => float_value(leading_number(&s).unwrap_or(0.0)),
        (ColumnKind::Float, Value::Bool(b)) => float_value(if b { 1.0 } else { 0.0 }),

        (ColumnKind::String, Value::Number(n)) => Value::String(n.to_string()),
        (ColumnKind::String, Value::Bool(b)) => Value::String(if b { "1" } else { "" }.into()),
        (ColumnKind::String, v @ Value::String(_)) => v,
        (ColumnKind::String, v) => Value::String(v.to_string()),

        (_, v) => v,
    }
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

/// Integer from a string; values above `i64::MAX` stay unsigned
fn parse_integer(s: &str) -> Value {
    let s = s.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = s.parse::<u64>() {
        return Value::from(n);
    }
    Value::from(leading_number(s).map_or(0, |f| f.trunc() as i64))
}

/// Parse the numeric prefix of a string (`"12.5kg"` → 12.5)
fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        let mut frac = end + 1;
        while bytes.get(frac).is_some_and(u8::is_ascii_digit) {
            frac += 1;
        }
        if frac > end + 1 || end > digits_start {
            end = frac;
        }
    }
    if end == digits_start {
        return None;
    }

    s[..end].trim_end_matches('.').parse().ok()
}

fn canonical_format(raw_type: &str) -> Option<&'static str> {
    match raw_type {
        "Date" => Some(DATE_FORMAT),
        "DateTime" => Some(DATETIME_FORMAT),
        _ => None,
    }
}

fn is_canonical(value: &Value, format: &str) -> bool {
    let Some(s) = value.as_str() else {
        return false;
    };
    if format == DATE_FORMAT {
        s.len() == 10 && NaiveDate::parse_from_str(s, format).is_ok()
    } else {
        s.len() == 19 && NaiveDateTime::parse_from_str(s, format).is_ok()
    }
}

/// Reparse a loosely formatted date/time and render it canonically (UTC)
///
/// Values that cannot be parsed are passed through for ClickHouse's own
/// `best_effort` parser to judge.
fn reformat_datetime(value: Value, format: &str) -> Value {
    match parse_datetime(&value) {
        Some(dt) => Value::String(dt.format(format).to_string()),
        None => value,
    }
}

/// Parse a date/time in any of the accepted layouts or as unix seconds
pub fn parse_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Number(n) => from_unix(n.as_i64()?),
        Value::String(s) => parse_datetime_str(s.trim()),
        _ => None,
    }
}

fn parse_datetime_str(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
    {
        return Some(dt);
    }
    if let Some(date) = DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(s, layout).ok())
    {
        return date.and_hms_opt(0, 0, 0);
    }
    s.parse::<i64>().ok().and_then(from_unix)
}

fn from_unix(secs: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}
