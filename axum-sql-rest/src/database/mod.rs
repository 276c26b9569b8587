//! Database facade.
//!
//! One `Db` value hides the three supported backends behind a uniform
//! interface: open a pool from a URL, execute generated SQL with `?`
//! placeholders (rebound per dialect), fetch rows as JSON-safe maps, and
//! introspect the schema. Every operation carries a hard 2-minute deadline.

pub mod dialect;
pub mod error;
pub mod types;

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Database, Encode, Type};
use tracing::{debug, warn};

pub use dialect::Dialect;
pub use error::{DbError, OpenError};

use crate::schema::{Column, Table, Tables};

/// Hard ceiling for any single database operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const MAX_CONNECTIONS: u32 = 50;

/// One fetched row: column name → JSON-safe value, in result order.
pub type Object = serde_json::Map<String, Value>;

#[derive(Clone)]
enum Pool {
    Postgres(sqlx::PgPool),
    MySql(sqlx::MySqlPool),
    Sqlite(sqlx::SqlitePool),
}

/// A connection pool plus the dialect it speaks.
#[derive(Clone)]
pub struct Db {
    pool: Pool,
    dialect: Dialect,
}

impl Db {
    /// Opens a pool from a `{postgres|mysql|sqlite}://…` URL and verifies
    /// connectivity.
    ///
    /// SQLite connections get a 5-second busy timeout unless the DSN
    /// configures one, so concurrent writers back off instead of failing
    /// with "database is locked".
    pub async fn open(url: &str) -> Result<Self, OpenError> {
        let (scheme, dsn) = url
            .split_once("://")
            .ok_or_else(|| OpenError::InvalidUrl(format!("no scheme in {url}")))?;
        let dialect = Dialect::from_scheme(scheme)
            .ok_or_else(|| OpenError::InvalidUrl(format!("unsupported scheme: {scheme}")))?;

        let pool = match dialect {
            Dialect::Postgres => Pool::Postgres(
                PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .max_lifetime(None)
                    .connect(url)
                    .await?,
            ),
            Dialect::MySql => Pool::MySql(
                MySqlPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .max_lifetime(None)
                    .connect(url)
                    .await?,
            ),
            Dialect::Sqlite => {
                let mut options = SqliteConnectOptions::from_str(url)?;
                if !dsn.contains("busy_timeout") {
                    options = options.busy_timeout(Duration::from_secs(5));
                }
                Pool::Sqlite(
                    SqlitePoolOptions::new()
                        .max_connections(MAX_CONNECTIONS)
                        .max_lifetime(None)
                        .connect_with(options)
                        .await?,
                )
            }
        };

        Ok(Self { pool, dialect })
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Executes a statement and returns the number of affected rows.
    pub async fn exec(&self, sql: &str, args: &[Value]) -> Result<u64, DbError> {
        let sql = self.dialect.rebind(sql);
        debug!(query = %sql, ?args, "exec query");
        let run = async {
            match &self.pool {
                Pool::Postgres(pool) => {
                    bind_all(sqlx::query(&sql), args).execute(pool).await.map(|r| r.rows_affected())
                }
                Pool::MySql(pool) => {
                    bind_all(sqlx::query(&sql), args).execute(pool).await.map(|r| r.rows_affected())
                }
                Pool::Sqlite(pool) => {
                    bind_all(sqlx::query(&sql), args).execute(pool).await.map(|r| r.rows_affected())
                }
            }
        };
        tokio::time::timeout(DEFAULT_TIMEOUT, run)
            .await
            .map_err(|_| timeout_error())?
            .map_err(|err| DbError::from_sqlx("failed to exec sql", err))
    }

    /// Runs a query and returns all matching rows. An empty result is the
    /// empty list, never an error.
    pub async fn fetch(&self, sql: &str, args: &[Value]) -> Result<Vec<Object>, DbError> {
        let sql = self.dialect.rebind(sql);
        debug!(query = %sql, ?args, "fetch data");
        let run = async {
            match &self.pool {
                Pool::Postgres(pool) => bind_all(sqlx::query(&sql), args)
                    .fetch_all(pool)
                    .await
                    .map(|rows| rows.iter().map(types::row_to_object).collect()),
                Pool::MySql(pool) => bind_all(sqlx::query(&sql), args)
                    .fetch_all(pool)
                    .await
                    .map(|rows| rows.iter().map(types::row_to_object).collect()),
                Pool::Sqlite(pool) => bind_all(sqlx::query(&sql), args)
                    .fetch_all(pool)
                    .await
                    .map(|rows| rows.iter().map(types::row_to_object).collect()),
            }
        };
        tokio::time::timeout(DEFAULT_TIMEOUT, run)
            .await
            .map_err(|_| timeout_error())?
            .map_err(|err| DbError::from_sqlx("failed to run query", err))
    }

    /// Runs a query expected to match exactly one row.
    pub async fn fetch_one(&self, sql: &str, args: &[Value]) -> Result<Object, DbError> {
        let mut objects = self.fetch(sql, args).await?;
        match objects.len() {
            0 => Err(DbError::new(StatusCode::NOT_FOUND, "not found")),
            1 => Ok(objects.remove(0)),
            _ => Err(DbError::new(
                StatusCode::BAD_REQUEST,
                "multiple rows found in database",
            )),
        }
    }

    /// Discovers all tables and views with their columns.
    ///
    /// A table whose columns cannot be read is logged and skipped; a failure
    /// of the table listing itself is an error so the caller can keep its
    /// previous snapshot.
    pub async fn fetch_tables(&self) -> Result<Tables, DbError> {
        let rows = self.fetch(self.dialect.tables_sql(), &[]).await?;

        let mut tables = HashMap::with_capacity(rows.len());
        for row in rows {
            let Some(name) = row.get("name").and_then(Value::as_str) else {
                continue;
            };
            match self.fetch_columns(name).await {
                Ok((columns, primary_key)) => {
                    tables.insert(
                        name.to_string(),
                        Table {
                            name: name.to_string(),
                            primary_key,
                            columns,
                        },
                    );
                }
                Err(err) => {
                    warn!("fetch columns error {err}, skip table {name}");
                }
            }
        }
        Ok(tables)
    }

    /// Fetches the columns of one table, promoting the primary key only when
    /// exactly one column carries it.
    async fn fetch_columns(&self, table: &str) -> Result<(Vec<Column>, String), DbError> {
        let rows = self.fetch(&self.dialect.columns_sql(table), &[]).await?;

        let mut columns = Vec::with_capacity(rows.len());
        let mut primary_key = String::new();
        let mut pk_seen = false;
        for row in &rows {
            let column = Column {
                name: string_field(row, "column_name"),
                data_type: string_field(row, "data_type"),
                not_null: truthy(row.get("notnull")),
                is_pk: truthy(row.get("pk")),
            };
            if column.is_pk {
                if pk_seen {
                    // composite keys are not addressable via /table/<id>
                    primary_key.clear();
                } else {
                    primary_key = column.name.clone();
                    pk_seen = true;
                }
            }
            columns.push(column);
        }
        Ok((columns, primary_key))
    }
}

fn timeout_error() -> DbError {
    DbError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "database operation timed out",
    )
}

fn string_field(row: &Object, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Interprets the 0/1/true/false spellings that boolean-ish cells take
/// across dialects.
pub(crate) fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn bind_all<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    args: &[Value],
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    bool: Encode<'q, DB> + Type<DB>,
    String: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
{
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => query.bind(s.clone()),
            // nested structures are bound as their JSON text
            other => query.bind(other.to_string()),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    // each test gets its own database file; pooled `:memory:` connections
    // would each see a different empty database
    fn temp_db_url(name: &str) -> String {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "axum-sql-rest-{name}-{}-{n}.db",
            std::process::id()
        ));
        format!("sqlite://{}?mode=rwc", path.display())
    }

    #[test]
    fn test_truthy() {
        assert!(truthy(Some(&Value::Bool(true))));
        assert!(truthy(Some(&Value::from(1))));
        assert!(truthy(Some(&Value::from(1.0))));
        assert!(truthy(Some(&Value::String("1".to_string()))));
        assert!(!truthy(Some(&Value::Bool(false))));
        assert!(!truthy(Some(&Value::from(0))));
        assert!(!truthy(Some(&Value::Null)));
        assert!(!truthy(None));
    }

    #[tokio::test]
    async fn test_open_rejects_malformed_url() {
        assert!(matches!(
            Db::open("not-a-url").await,
            Err(OpenError::InvalidUrl(_))
        ));
        assert!(matches!(
            Db::open("mssql://x").await,
            Err(OpenError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_exec_and_fetch_roundtrip() {
        let db = Db::open(&temp_db_url("roundtrip")).await.unwrap();
        db.exec(
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT, active BOOLEAN)",
            &[],
        )
        .await
        .unwrap();

        let rows = db
            .exec(
                "INSERT INTO customers (id, name, active) VALUES (?,?,?),(?,?,?)",
                &[
                    Value::from(1),
                    Value::String("alice".to_string()),
                    Value::Bool(true),
                    Value::from(2),
                    Value::String("bob".to_string()),
                    Value::Bool(false),
                ],
            )
            .await
            .unwrap();
        assert_eq!(rows, 2);

        let objects = db
            .fetch("SELECT * FROM customers ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0]["name"], Value::String("alice".to_string()));
        assert_eq!(objects[0]["id"], Value::from(1));

        let one = db
            .fetch_one(
                "SELECT * FROM customers WHERE id = ?",
                &[Value::String("2".to_string())],
            )
            .await
            .unwrap();
        assert_eq!(one["name"], Value::String("bob".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_one_zero_and_many() {
        let db = Db::open(&temp_db_url("fetch-one")).await.unwrap();
        db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[])
            .await
            .unwrap();
        let err = db.fetch_one("SELECT * FROM t", &[]).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        db.exec(
            "INSERT INTO t (v) VALUES (?),(?)",
            &[
                Value::String("a".to_string()),
                Value::String("b".to_string()),
            ],
        )
        .await
        .unwrap();
        let err = db.fetch_one("SELECT * FROM t", &[]).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_duplicate_primary_key_maps_to_conflict() {
        let db = Db::open(&temp_db_url("conflict")).await.unwrap();
        db.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[])
            .await
            .unwrap();
        let args = [Value::from(1), Value::String("a".to_string())];
        db.exec("INSERT INTO t (id, v) VALUES (?,?)", &args)
            .await
            .unwrap();
        let err = db
            .exec("INSERT INTO t (id, v) VALUES (?,?)", &args)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_fetch_tables_discovers_primary_keys() {
        let db = Db::open(&temp_db_url("tables")).await.unwrap();
        db.exec(
            "CREATE TABLE invoices (id INTEGER PRIMARY KEY, total REAL NOT NULL)",
            &[],
        )
        .await
        .unwrap();
        db.exec(
            "CREATE TABLE pairs (a INTEGER, b INTEGER, PRIMARY KEY (a, b))",
            &[],
        )
        .await
        .unwrap();

        let tables = db.fetch_tables().await.unwrap();
        let invoices = &tables["invoices"];
        assert_eq!(invoices.primary_key, "id");
        assert_eq!(invoices.columns.len(), 2);
        assert!(invoices.columns[1].not_null);

        // composite key collapses to no primary key
        assert_eq!(tables["pairs"].primary_key, "");
    }
}
