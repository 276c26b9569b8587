//! Schema metadata types discovered at runtime.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// A snapshot of the database schema, keyed by table name.
///
/// Snapshots are built off-band by the refresh task and published atomically;
/// a published snapshot is never mutated.
pub type Tables = HashMap<String, Table>;

/// Information about a single column.
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared SQL data type (e.g. "INTEGER", "VARCHAR(255)").
    pub data_type: String,

    /// Whether the column rejects NULL values.
    pub not_null: bool,

    /// Whether the column is part of the primary key.
    pub is_pk: bool,
}

/// A table (or view) with its columns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Primary-key column name; empty when the table has none or the key
    /// spans multiple columns.
    pub primary_key: String,

    /// Columns in ordinal order.
    pub columns: Vec<Column>,
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.name)?;
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", column.name, column.data_type)?;
        }
        write!(f, ")")
    }
}
