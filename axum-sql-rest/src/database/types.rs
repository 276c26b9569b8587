//! Declared-type registry.
//!
//! Maps the column types reported by the database to a scan kind, and decodes
//! row cells into JSON-safe values. Every dialect reports its own spelling of
//! the standard types (`INT4`, `NVARCHAR(70)`, `DOUBLE PRECISION`), so names
//! are normalized before lookup.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo};

/// How a column's cells are scanned and converted to JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// Integer family; NULL becomes `0`.
    Int,
    /// Float family; NULL becomes `0.0`.
    Float,
    /// Boolean; NULL becomes `false`.
    Bool,
    /// String family; NULL becomes `""`.
    Text,
    /// Raw JSON text, decoded best-effort: number, then boolean, else the
    /// raw string. Unknown types fall back to this kind.
    Json,
}

/// Collapses numeric suffixes so `INT4`, `INT8`, `FLOAT4` map like their
/// base type.
static NUMERIC_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(INT|FLOAT)\d+").unwrap());

/// Resolve the scan kind for a declared column type name.
pub fn kind_of(declared: &str) -> ScanKind {
    let name = normalize(declared);
    if let Some(kind) = lookup(&name) {
        return kind;
    }
    let collapsed = NUMERIC_SUFFIX.replace(&name, "$1");
    lookup(&collapsed).unwrap_or(ScanKind::Json)
}

/// Strips a parenthesized suffix (`NVARCHAR(70)` → `NVARCHAR`) and
/// upper-cases the remainder.
fn normalize(declared: &str) -> String {
    let base = match declared.find('(') {
        Some(i) => &declared[..i],
        None => declared,
    };
    base.to_uppercase()
}

fn lookup(name: &str) -> Option<ScanKind> {
    let kind = match name {
        "TINYINT" | "SMALLINT" | "INT" | "INTEGER" | "BIGINT" | "SERIAL" | "BIGSERIAL"
        | "SMALLSERIAL" => ScanKind::Int,
        "DEC" | "DECIMAL" | "NUMERIC" | "FLOAT" | "REAL" | "DOUBLE" | "DOUBLE PRECISION" => {
            ScanKind::Float
        }
        "BOOL" | "BOOLEAN" => ScanKind::Bool,
        "CHAR" | "VARCHAR" | "NVARCHAR" | "TEXT" | "UUID" | "ENUM" | "BLOB" | "BINARY" | "XML"
        | "DATE" | "DATETIME" | "TIMESTAMP" => ScanKind::Text,
        "JSON" => ScanKind::Json,
        _ => return None,
    };
    Some(kind)
}

/// Best-effort conversion of raw JSON text into a primitive value.
pub fn json_value(raw: String) -> Value {
    if let Ok(number) = raw.parse::<f64>() {
        return Value::from(number);
    }
    if raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("t") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") || raw.eq_ignore_ascii_case("f") {
        return Value::Bool(false);
    }
    Value::String(raw)
}

/// Converts a database row into an ordered column-name → value map.
pub fn row_to_object<R>(row: &R) -> serde_json::Map<String, Value>
where
    R: Row,
    usize: ColumnIndex<R>,
    i64: Type<<R as Row>::Database> + for<'d> Decode<'d, <R as Row>::Database>,
    f64: Type<<R as Row>::Database> + for<'d> Decode<'d, <R as Row>::Database>,
    bool: Type<<R as Row>::Database> + for<'d> Decode<'d, <R as Row>::Database>,
    String: Type<<R as Row>::Database> + for<'d> Decode<'d, <R as Row>::Database>,
{
    let mut object = serde_json::Map::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let kind = kind_of(column.type_info().name());
        object.insert(column.name().to_string(), decode_cell(row, index, kind));
    }
    object
}

/// Decodes one cell according to its scan kind.
///
/// When the driver refuses the kind's native type (SQLite's dynamic typing,
/// exotic backend types), a typed fallback chain is tried before giving up
/// with `null`.
fn decode_cell<R>(row: &R, index: usize, kind: ScanKind) -> Value
where
    R: Row,
    usize: ColumnIndex<R>,
    i64: Type<<R as Row>::Database> + for<'d> Decode<'d, <R as Row>::Database>,
    f64: Type<<R as Row>::Database> + for<'d> Decode<'d, <R as Row>::Database>,
    bool: Type<<R as Row>::Database> + for<'d> Decode<'d, <R as Row>::Database>,
    String: Type<<R as Row>::Database> + for<'d> Decode<'d, <R as Row>::Database>,
{
    match kind {
        ScanKind::Int => {
            if let Ok(cell) = row.try_get::<Option<i64>, _>(index) {
                return Value::from(cell.unwrap_or(0));
            }
        }
        ScanKind::Float => {
            if let Ok(cell) = row.try_get::<Option<f64>, _>(index) {
                return Value::from(cell.unwrap_or(0.0));
            }
        }
        ScanKind::Bool => {
            if let Ok(cell) = row.try_get::<Option<bool>, _>(index) {
                return Value::Bool(cell.unwrap_or(false));
            }
        }
        ScanKind::Text => {
            if let Ok(cell) = row.try_get::<Option<String>, _>(index) {
                return Value::String(cell.unwrap_or_default());
            }
        }
        ScanKind::Json => {
            if let Ok(cell) = row.try_get::<Option<String>, _>(index) {
                return json_value(cell.unwrap_or_default());
            }
        }
    }

    if let Ok(cell) = row.try_get::<Option<i64>, _>(index) {
        return Value::from(cell.unwrap_or(0));
    }
    if let Ok(cell) = row.try_get::<Option<f64>, _>(index) {
        return Value::from(cell.unwrap_or(0.0));
    }
    if let Ok(cell) = row.try_get::<Option<String>, _>(index) {
        return Value::String(cell.unwrap_or_default());
    }
    if let Ok(cell) = row.try_get::<Option<bool>, _>(index) {
        return Value::Bool(cell.unwrap_or(false));
    }
    Value::Null
}
