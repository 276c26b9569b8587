//! JSON response shapes.
//!
//! Success reads return bare data (array, object, or scalar); writes and
//! failures return `{"msg": …}` with the status code as the authoritative
//! signal; the `debug` flag returns the generated SQL instead of executing
//! it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};

use crate::database::DbError;
use crate::query::QueryError;

/// A finished JSON reply: status plus body.
#[derive(Debug)]
pub struct Reply {
    status: StatusCode,
    body: Value,
}

impl Reply {
    /// Bare data with a 200.
    pub fn data(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    /// `{"msg": …}` with the given status.
    pub fn message(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "msg": msg.into() }),
        }
    }

    /// The generated SQL and its arguments, instead of a result.
    pub fn debug(query: String, args: Vec<Value>) -> Self {
        Self {
            status: StatusCode::OK,
            body: json!({ "query": query, "args": args }),
        }
    }

    /// A database failure; the facade already chose the status.
    pub fn db_error(err: DbError) -> Self {
        Self::message(err.status, err.message)
    }

    /// A request-input failure; always a 400.
    pub fn bad_request(err: QueryError) -> Self {
        Self::message(StatusCode::BAD_REQUEST, err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_shape() {
        let reply = Reply::message(StatusCode::NOT_FOUND, "table does not exist: x");
        assert_eq!(reply.status(), StatusCode::NOT_FOUND);
        assert_eq!(reply.body["msg"], "table does not exist: x");
    }

    #[test]
    fn test_debug_shape() {
        let reply = Reply::debug(
            "SELECT * FROM t WHERE a = ?".to_string(),
            vec![Value::from("1")],
        );
        assert_eq!(reply.status(), StatusCode::OK);
        assert_eq!(reply.body["query"], "SELECT * FROM t WHERE a = ?");
        assert_eq!(reply.body["args"][0], "1");
    }
}
