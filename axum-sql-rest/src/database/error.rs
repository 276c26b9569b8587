//! Database error translation.
//!
//! Driver errors carry backend-specific codes; the facade maps them onto a
//! stable HTTP status taxonomy once, and the router returns that status
//! verbatim.

use axum::http::StatusCode;
use sqlx::error::DatabaseError;
use sqlx::mysql::MySqlDatabaseError;
use sqlx::postgres::PgDatabaseError;
use sqlx::sqlite::SqliteError;
use thiserror::Error;

// https://www.postgresql.org/docs/current/errcodes-appendix.html
const PG_INTEGRITY_CONSTRAINT_VIOLATION: &str = "23";
const PG_SYNTAX_ERROR: &str = "42";

// https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html
const MYSQL_NO_DEFAULT_FOR_FIELD: u32 = 1364;

// https://www.sqlite.org/rescode.html
const SQLITE_CONSTRAINT_NOTNULL: i64 = 1299;
const SQLITE_CONSTRAINT_PRIMARYKEY: i64 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i64 = 2067;

/// A database failure mapped to the HTTP status the client should see.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DbError {
    pub status: StatusCode,
    pub message: String,
}

impl DbError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Wraps a sqlx error, resolving the HTTP status from the concrete
    /// driver error when one is attached.
    pub(crate) fn from_sqlx(hint: &str, err: sqlx::Error) -> Self {
        let mut status = StatusCode::INTERNAL_SERVER_ERROR;
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(pg) = db_err.try_downcast_ref::<PgDatabaseError>() {
                status = pg_status(pg.code());
            } else if let Some(my) = db_err.try_downcast_ref::<MySqlDatabaseError>() {
                status = mysql_status(u32::from(my.number()));
            } else if let Some(sqlite) = db_err.try_downcast_ref::<SqliteError>() {
                let code = sqlite
                    .code()
                    .and_then(|code| code.parse::<i64>().ok())
                    .unwrap_or_default();
                status = sqlite_status(code);
            }
        }
        Self {
            status,
            message: format!("{hint}, {err}"),
        }
    }
}

fn pg_status(code: &str) -> StatusCode {
    if code.starts_with(PG_INTEGRITY_CONSTRAINT_VIOLATION) || code.starts_with(PG_SYNTAX_ERROR) {
        return StatusCode::BAD_REQUEST;
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

fn mysql_status(code: u32) -> StatusCode {
    match code {
        MYSQL_NO_DEFAULT_FOR_FIELD => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn sqlite_status(code: i64) -> StatusCode {
    match code {
        SQLITE_CONSTRAINT_NOTNULL => StatusCode::BAD_REQUEST,
        SQLITE_CONSTRAINT_PRIMARYKEY | SQLITE_CONSTRAINT_UNIQUE => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Failure to open a database from its URL.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("invalid database url: {0}")]
    InvalidUrl(String),
    #[error("failed to connect to database: {0}")]
    Unreachable(#[from] sqlx::Error),
}
