//! SQL dialect support.
//!
//! The gateway always generates SQL with `?` placeholders. The dialect
//! decides how those placeholders are rebound for the target database, which
//! introspection queries discover tables and columns, and how JSON path
//! expressions are written.

use std::fmt::Write as _;

/// A supported database backend.
///
/// Derived once from the database URL scheme and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Resolve a dialect from a database URL scheme (`postgres`, `mysql`,
    /// `sqlite`).
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "postgres" => Some(Self::Postgres),
            "mysql" => Some(Self::MySql),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Returns the bound-parameter placeholder for a 1-based index.
    pub fn placeholder(self, index: u32) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::MySql | Self::Sqlite => "?".to_string(),
        }
    }

    /// Rewrites `?` placeholders into the dialect's native style.
    ///
    /// For Postgres every `?` becomes `$N` with N counting up from 1; the
    /// other dialects take the query unchanged. The input SQL is generated by
    /// the gateway itself and never contains `?` outside placeholder
    /// positions, so string literals need no special handling.
    pub fn rebind(self, sql: &str) -> String {
        if self != Self::Postgres {
            return sql.to_string();
        }

        let mut out = String::with_capacity(sql.len() + 8);
        let mut index = 0u32;
        for part in sql.split('?') {
            if index > 0 {
                // a split boundary is a consumed `?`
                let _ = write!(out, "${index}");
            }
            out.push_str(part);
            index += 1;
        }
        out
    }

    /// Query returning one row per table or view, with a `name` column.
    pub fn tables_sql(self) -> &'static str {
        match self {
            Self::Postgres => {
                "SELECT c.relname AS name \
                 FROM pg_catalog.pg_class c \
                 LEFT JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
                 WHERE c.relkind IN ('r', 'v', 'm', 'f', '') \
                   AND n.nspname <> 'pg_catalog' \
                   AND n.nspname <> 'information_schema' \
                   AND n.nspname !~ '^pg_toast' \
                   AND pg_catalog.pg_table_is_visible(c.oid) \
                 ORDER BY 1"
            }
            Self::MySql => {
                "SELECT TABLE_NAME AS name \
                 FROM information_schema.TABLES \
                 WHERE (TABLE_TYPE = 'BASE TABLE' OR TABLE_TYPE = 'view') \
                   AND TABLE_SCHEMA = DATABASE()"
            }
            Self::Sqlite => {
                "SELECT name FROM sqlite_schema \
                 WHERE (type = 'table' OR type = 'view') \
                   AND name NOT LIKE 'sqlite_%'"
            }
        }
    }

    /// Query returning `{column_name, data_type, notnull, pk}` rows for one
    /// table. Table names originate from [`Dialect::tables_sql`] output, not
    /// from request input.
    pub fn columns_sql(self, table: &str) -> String {
        match self {
            Self::Postgres => format!(
                "SELECT c.column_name, c.data_type, \
                        c.is_nullable = 'NO' AS notnull, \
                        pc.contype = 'p' IS TRUE AS pk \
                 FROM information_schema.columns c \
                 LEFT JOIN information_schema.key_column_usage kcu \
                   ON c.column_name = kcu.column_name AND c.table_name = kcu.table_name \
                 LEFT JOIN pg_constraint pc ON kcu.constraint_name = pc.conname \
                 WHERE c.table_name = '{table}' \
                 ORDER BY c.ordinal_position"
            ),
            Self::MySql => format!(
                "SELECT COLUMN_NAME AS column_name, DATA_TYPE AS data_type, \
                        IS_NULLABLE = 'NO' AS notnull, COLUMN_KEY = 'PRI' AS pk \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE table_schema = DATABASE() AND table_name = '{table}'"
            ),
            Self::Sqlite => format!(
                "SELECT name AS column_name, type AS data_type, \
                        \"notnull\" = 1 AS \"notnull\", pk >= 1 AS pk \
                 FROM PRAGMA_TABLE_INFO('{table}')"
            ),
        }
    }

    /// Primary-key column DDL used when the gateway creates its own tables.
    pub fn primary_key_ddl(self) -> &'static str {
        match self {
            Self::Postgres => "BIGINT PRIMARY KEY GENERATED ALWAYS AS IDENTITY",
            Self::MySql => "BIGINT PRIMARY KEY AUTO_INCREMENT",
            Self::Sqlite => "INTEGER PRIMARY KEY",
        }
    }

    /// Translates a `col->a->2->>b` column expression into the dialect's JSON path
    /// expression, returning the expression and the alias to use when the
    /// column appears in a SELECT list.
    ///
    /// Postgres and SQLite keep the `->`/`->>` operators and quote field
    /// names; MySQL uses `col->'$.a[2].b'` path syntax. The alias is the
    /// last non-numeric segment.
    pub fn json_path(self, column: &str) -> (String, String) {
        match self {
            Self::Postgres | Self::Sqlite => arrow_json_path(column),
            Self::MySql => mysql_json_path(column),
        }
    }
}

fn strip_segment(part: &str) -> (bool, &str) {
    let (double, part) = match part.strip_prefix('>') {
        Some(rest) => (true, rest),
        None => (false, part),
    };
    (double, part.trim_matches('\'').trim_matches('"'))
}

fn arrow_json_path(column: &str) -> (String, String) {
    let mut alias = String::new();
    let mut out = String::with_capacity(column.len() + 8);
    for (i, part) in column.split("->").enumerate() {
        if i == 0 {
            out.push_str(part);
            continue;
        }
        let (double, segment) = strip_segment(part);
        out.push_str(if double { "->>" } else { "->" });
        if segment.parse::<i64>().is_ok() {
            out.push_str(segment);
        } else {
            alias = segment.to_string();
            let _ = write!(out, "'{segment}'");
        }
    }
    (out, alias)
}

fn mysql_json_path(column: &str) -> (String, String) {
    let mut parts = column.split("->");
    let name = parts.next().unwrap_or_default();
    let mut alias = String::new();
    let mut path = String::new();
    for part in parts {
        let (_, segment) = strip_segment(part);
        if segment.parse::<i64>().is_ok() {
            let _ = write!(path, "[{segment}]");
        } else {
            alias = segment.to_string();
            let _ = write!(path, ".{segment}");
        }
    }
    (format!("{name}->'${path}'"), alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_scheme() {
        assert_eq!(Dialect::from_scheme("postgres"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_scheme("mysql"), Some(Dialect::MySql));
        assert_eq!(Dialect::from_scheme("sqlite"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_scheme("mssql"), None);
    }

    #[test]
    fn test_placeholder() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::MySql.placeholder(3), "?");
        assert_eq!(Dialect::Sqlite.placeholder(1), "?");
    }

    #[test]
    fn test_rebind_noop_for_question_dialects() {
        let sql = "SELECT * FROM a WHERE a = ? AND b = ?";
        assert_eq!(Dialect::MySql.rebind(sql), sql);
        assert_eq!(Dialect::Sqlite.rebind(sql), sql);
    }

    #[test]
    fn test_rebind_postgres() {
        assert_eq!(
            Dialect::Postgres.rebind("SELECT * FROM a WHERE a = ? AND b = ?"),
            "SELECT * FROM a WHERE a = $1 AND b = $2"
        );
        assert_eq!(Dialect::Postgres.rebind("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_rebind_indices_are_contiguous() {
        let sql = "INSERT INTO t (a, b, c) VALUES (?,?,?),(?,?,?)";
        let rebound = Dialect::Postgres.rebind(sql);
        for n in 1..=6 {
            assert!(rebound.contains(&format!("${n}")), "missing ${n} in {rebound}");
        }
        assert!(!rebound.contains('?'));
        assert!(!rebound.contains("$7"));
    }

    #[test]
    fn test_json_path_postgres() {
        let (expr, alias) = Dialect::Postgres.json_path("object->1->field1->field2->>2");
        assert_eq!(expr, "object->1->'field1'->'field2'->>2");
        assert_eq!(alias, "field2");
    }

    #[test]
    fn test_json_path_sqlite_matches_postgres() {
        let (expr, alias) = Dialect::Sqlite.json_path("meta->>name");
        assert_eq!(expr, "meta->>'name'");
        assert_eq!(alias, "name");
    }

    #[test]
    fn test_json_path_mysql() {
        let (expr, alias) = Dialect::MySql.json_path("object->1->field1->field2->>2");
        assert_eq!(expr, "object->'$[1].field1.field2[2]'");
        assert_eq!(alias, "field2");
    }
}
