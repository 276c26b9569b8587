//! # axum-sql-rest
//!
//! An automatic REST API for relational databases, mountable as an Axum
//! router.
//!
//! Every table (and view) of a PostgreSQL, MySQL, or SQLite database is
//! exposed as a uniform set of CRUD endpoints. The HTTP verb plus a small
//! URL query grammar translate into parameterized SQL:
//!
//! - `GET /articles?select=id,title&order=id.desc&page=2&page_size=20`
//! - `GET /articles?Id=in.(1,2)&count`
//! - `POST /articles` with a JSON object or array body (bulk insert)
//! - `PUT /articles/42` / `PATCH /articles?Id=eq.42` with a JSON object
//! - `DELETE /articles?published=is.false`
//!
//! Schema metadata is discovered at runtime and refreshed every 30 seconds,
//! so new tables show up without a restart.
//!
//! ## Authentication & authorization
//!
//! With an auth secret configured, the gateway owns two tables
//! (`auth_users`, `auth_policies`), serves
//! `POST /auth/{setup|register|login|logout}`, identifies requests by JWT
//! bearer tokens, and enforces per-table, per-action policies, including
//! automatic `user_id` scoping of reads and writes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use axum_sql_rest::RestGateway;
//!
//! #[tokio::main]
//! async fn main() {
//!     let gateway = RestGateway::builder("sqlite://data.db?mode=rwc")
//!         .connect()
//!         .await
//!         .expect("failed to connect");
//!
//!     let app = gateway.clone().into_router();
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
//!         .await
//!         .unwrap();
//!     axum::serve(listener, app).await.unwrap();
//!     gateway.close();
//! }
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod database;
pub mod query;
pub mod response;
pub mod schema;

mod layer;

pub use database::{Db, DbError, Dialect, OpenError};
pub use layer::{GatewayBuilder, GatewayState, RestGateway};
pub use schema::{Column, Table};
