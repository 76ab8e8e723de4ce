//! Destination table names
//!
//! Table names arrive from message producers and end up both in file paths
//! (`<dir>/<table>.json`) and in SQL text (`INSERT INTO <table>`), so they are
//! restricted to plain ClickHouse identifiers.

use std::fmt;

/// Longest accepted table name (ext4 file names are limited to 255 bytes)
pub const MAX_TABLE_NAME_LEN: usize = 200;

/// A validated destination table name
///
/// Only ASCII letters, digits and `_` are accepted, which rules out path
/// separators, `..` and anything that would need SQL quoting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName(String);

/// Rejected table name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid table name '{0}'")]
pub struct InvalidTableName(pub String);

impl TableName {
    /// Validate and wrap a table name
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidTableName> {
        let name = name.into();
        if Self::is_valid(&name) {
            Ok(Self(name))
        } else {
            Err(InvalidTableName(name))
        }
    }

    /// Check a candidate name without allocating
    pub fn is_valid(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= MAX_TABLE_NAME_LEN
            && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
    }

    /// The name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for TableName {
    type Error = InvalidTableName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["orders", "events_v1", "T2", "_internal"] {
            assert!(TableName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_rejects_path_traversal() {
        for name in ["", "..", "../etc/passwd", "a/b", "orders.json", "db.table", "a b", "é"] {
            assert!(TableName::new(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn test_rejects_overlong() {
        let name = "a".repeat(MAX_TABLE_NAME_LEN + 1);
        assert!(!TableName::is_valid(&name));
        assert!(TableName::is_valid(&name[..MAX_TABLE_NAME_LEN]));
    }

    #[test]
    fn test_display() {
        let table = TableName::try_from("orders").unwrap();
        assert_eq!(table.to_string(), "orders");
        assert_eq!(table.as_str(), "orders");
    }
}
