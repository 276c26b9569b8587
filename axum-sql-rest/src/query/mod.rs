//! Translation of HTTP request input into SQL fragments.
//!
//! [`url::UrlQuery`] covers the query-string grammar (projection, predicates,
//! ordering, pagination, flags); [`post::PostData`] covers JSON request
//! bodies for insert and update. Both emit `?` placeholders; the database
//! facade rebinds them per dialect.

pub mod post;
pub mod url;

use thiserror::Error;

pub use post::{PostData, SetQuery, ValuesQuery};
pub use url::UrlQuery;

/// Request-input rejection; always a 400 at the HTTP boundary.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid character found in {0}")]
    InvalidCharacter(&'static str),

    #[error("function not allowed: {0}")]
    FunctionNotAllowed(String),

    #[error("failed to parse json data, {0}")]
    Json(String),

    #[error("no post data provided")]
    Empty,

    #[error("columns must be same for all objects, invalid object: {0}")]
    MixedColumns(String),

    #[error("bulk update is not supported")]
    BulkUpdate,
}
