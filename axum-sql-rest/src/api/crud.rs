//! Table CRUD handlers.
//!
//! One entry point serves `/{table}` and `/{table}/{id}` for every verb:
//! the table is validated against the schema snapshot, the action is derived
//! from the verb (plus the `mine` flag), the policy gate may inject a
//! user-scoping filter, and the verb dispatch builds and executes the SQL.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::Extension;
use serde_json::Value;
use tracing::warn;

use crate::auth::{Action, User, UserAuthInfo};
use crate::layer::GatewayState;
use crate::query::{PostData, UrlQuery};
use crate::response::Reply;

/// Query parameters, decoded in arrival order so repeated keys survive.
pub type Pairs = Vec<(String, String)>;

/// Handler for `/{table}`.
pub async fn table_handler(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    Path(table): Path<String>,
    Query(pairs): Query<Pairs>,
    Extension(user): Extension<User>,
    body: Bytes,
) -> Reply {
    handle(&state, method, table, None, pairs, user, body).await
}

/// Handler for `/{table}/{id}`.
pub async fn row_handler(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    Path((table, id)): Path<(String, String)>,
    Query(pairs): Query<Pairs>,
    Extension(user): Extension<User>,
    body: Bytes,
) -> Reply {
    handle(&state, method, table, Some(id), pairs, user, body).await
}

/// Liveness probe at the mount root.
pub async fn health_handler() -> Reply {
    Reply::message(StatusCode::OK, "rest server is up and running")
}

async fn handle(
    state: &GatewayState,
    method: Method,
    table_name: String,
    id: Option<String>,
    pairs: Pairs,
    user: User,
    body: Bytes,
) -> Reply {
    let tables = state.cache.tables();
    let Some(table) = tables.get(&table_name) else {
        return Reply::message(
            StatusCode::NOT_FOUND,
            format!("table does not exist: {table_name}"),
        );
    };

    let mut url_query = UrlQuery::new(state.db.dialect(), pairs);
    if let Some(id) = id {
        // /table/<id> addressing needs a single-column primary key
        if table.primary_key.is_empty() {
            return Reply::message(
                StatusCode::BAD_REQUEST,
                format!("primary key not found on table: {}", table.name),
            );
        }
        url_query.set_primary_key(&table.primary_key, &id);
    }

    let mut auth_info = None;
    if state.auth_enabled() {
        let action = action_of(&method, &url_query);
        let policies = state.cache.policies();
        let (allowed, user_id_column) = user.has_perm(&table_name, action, &policies);
        if !allowed {
            return if user.is_anonymous() {
                Reply::message(StatusCode::UNAUTHORIZED, "login required")
            } else {
                Reply::message(StatusCode::FORBIDDEN, "unauthorized")
            };
        }
        if let Some(column) = user_id_column {
            auth_info = Some(UserAuthInfo {
                column,
                user_id: user.id,
            });
        }
    }

    match method.as_str().to_ascii_uppercase().as_str() {
        "POST" => create(state, &table_name, &url_query, auth_info, &body).await,
        "DELETE" => delete(state, &table_name, &mut url_query, auth_info).await,
        "PUT" | "PATCH" => update(state, &table_name, &mut url_query, auth_info, &body).await,
        "GET" => read(state, &table_name, &mut url_query, auth_info).await,
        other => Reply::message(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("method not supported: {other}"),
        ),
    }
}

fn action_of(method: &Method, url_query: &UrlQuery) -> Action {
    match method.as_str().to_ascii_uppercase().as_str() {
        "POST" => Action::Create,
        "PUT" | "PATCH" => Action::Update,
        "DELETE" => Action::Delete,
        _ if url_query.is_mine() => Action::ReadMine,
        _ => Action::Read,
    }
}

async fn create(
    state: &GatewayState,
    table: &str,
    url_query: &UrlQuery,
    auth_info: Option<UserAuthInfo>,
    body: &Bytes,
) -> Reply {
    let mut data = match PostData::from_slice(body) {
        Ok(data) => data,
        Err(err) => {
            warn!("failed to parse post json data: {err}");
            return Reply::message(
                StatusCode::BAD_REQUEST,
                format!("failed to parse post json data, {err}"),
            );
        }
    };
    if let Some(info) = &auth_info {
        // create on behalf of the authenticated user
        data.set(&info.column, Value::from(info.user_id));
    }

    let values = match data.values_query() {
        Ok(values) => values,
        Err(err) => {
            warn!("failed to generate values query: {err}");
            return Reply::message(
                StatusCode::BAD_REQUEST,
                format!("failed to prepare values query, {err}"),
            );
        }
    };

    let query = format!(
        "INSERT INTO {table} ({}) VALUES {}",
        values.columns.join(","),
        values.placeholders.join(",")
    );
    if url_query.is_debug() {
        return Reply::debug(query, values.args);
    }

    let inserted = values.placeholders.len() as u64;
    match state.db.exec(&query, &values.args).await {
        Ok(rows) if rows == inserted => Reply::message(
            StatusCode::OK,
            format!("successfully inserted {rows} rows"),
        ),
        Ok(rows) => Reply::message(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("expected to insert {inserted} rows, but affected {rows} rows"),
        ),
        Err(err) => Reply::db_error(err),
    }
}

async fn delete(
    state: &GatewayState,
    table: &str,
    url_query: &mut UrlQuery,
    auth_info: Option<UserAuthInfo>,
) -> Reply {
    apply_user_filter(url_query, &auth_info);

    let (_, where_query, args) = url_query.where_query(1);
    if where_query.is_empty() {
        return Reply::message(
            StatusCode::BAD_REQUEST,
            "delete without any condition is not allowed, use 1=eq.1 to bypass it",
        );
    }

    let query = format!("DELETE FROM {table} WHERE {where_query}");
    if url_query.is_debug() {
        return Reply::debug(query, args);
    }

    match state.db.exec(&query, &args).await {
        Ok(rows) => Reply::message(
            StatusCode::OK,
            format!("successfully deleted {rows} rows"),
        ),
        Err(err) => Reply::db_error(err),
    }
}

async fn update(
    state: &GatewayState,
    table: &str,
    url_query: &mut UrlQuery,
    auth_info: Option<UserAuthInfo>,
    body: &Bytes,
) -> Reply {
    apply_user_filter(url_query, &auth_info);

    let data = match PostData::from_slice(body) {
        Ok(data) => data,
        Err(err) => {
            warn!("failed to parse update json data: {err}");
            return Reply::message(
                StatusCode::BAD_REQUEST,
                format!("failed to parse update json data, {err}"),
            );
        }
    };
    let set = match data.set_query(1) {
        Ok(set) => set,
        Err(err) => {
            warn!("failed to generate set query: {err}");
            return Reply::message(
                StatusCode::BAD_REQUEST,
                format!("failed to prepare set query, {err}"),
            );
        }
    };

    // set args come first, where args continue the placeholder numbering
    let (_, where_query, where_args) = url_query.where_query(set.next_index);
    if where_query.is_empty() {
        return Reply::message(
            StatusCode::BAD_REQUEST,
            "update without any condition is not allowed, use 1=eq.1 to bypass it",
        );
    }

    let query = format!("UPDATE {table} SET {} WHERE {where_query}", set.query);
    let mut args = set.args;
    args.extend(where_args);

    if url_query.is_debug() {
        return Reply::debug(query, args);
    }

    match state.db.exec(&query, &args).await {
        Ok(rows) => Reply::message(
            StatusCode::OK,
            format!("successfully updated {rows} rows"),
        ),
        Err(err) => Reply::db_error(err),
    }
}

async fn read(
    state: &GatewayState,
    table: &str,
    url_query: &mut UrlQuery,
    auth_info: Option<UserAuthInfo>,
) -> Reply {
    apply_user_filter(url_query, &auth_info);

    if url_query.is_count() {
        return count(state, table, url_query).await;
    }

    let selects = match url_query.select_query() {
        Ok(selects) => selects,
        Err(err) => return Reply::bad_request(err),
    };
    let mut query = format!("SELECT {selects} FROM {table}");

    let (_, where_query, args) = url_query.where_query(1);
    if !where_query.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&where_query);
    }

    match url_query.order_query() {
        Ok(order) if !order.is_empty() => {
            query.push_str(" ORDER BY ");
            query.push_str(&order);
        }
        Ok(_) => {}
        Err(err) => return Reply::bad_request(err),
    }

    let (page, page_size) = url_query.page();
    query.push_str(&format!(" LIMIT {page_size}"));
    if page > 1 {
        query.push_str(&format!(" OFFSET {}", (page - 1) * page_size));
    }

    if url_query.is_debug() {
        return Reply::debug(query, args);
    }

    let mut objects = match state.db.fetch(&query, &args).await {
        Ok(objects) => objects,
        Err(err) => return Reply::db_error(err),
    };

    if url_query.is_singular() || url_query.has_id() {
        return match objects.len() {
            0 => Reply::message(StatusCode::NOT_FOUND, "data not found in database"),
            1 => Reply::data(Value::Object(objects.remove(0))),
            n => Reply::message(
                StatusCode::BAD_REQUEST,
                format!("expect singular data, but got {n} rows"),
            ),
        };
    }
    Reply::data(Value::Array(objects.into_iter().map(Value::Object).collect()))
}

async fn count(state: &GatewayState, table: &str, url_query: &UrlQuery) -> Reply {
    let mut query = format!("SELECT COUNT(1) AS count FROM {table}");
    let (_, where_query, args) = url_query.where_query(1);
    if !where_query.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&where_query);
    }

    if url_query.is_debug() {
        return Reply::debug(query, args);
    }

    match state.db.fetch(&query, &args).await {
        Ok(objects) => {
            let count = objects
                .first()
                .and_then(|object| object.get("count"))
                .cloned()
                .unwrap_or(Value::from(0));
            Reply::data(count)
        }
        Err(err) => Reply::db_error(err),
    }
}

/// Scopes the query to the authenticated user's rows.
fn apply_user_filter(url_query: &mut UrlQuery, auth_info: &Option<UserAuthInfo>) {
    if let Some(info) = auth_info {
        url_query.set(&info.column, &format!("eq.{}", info.user_id));
    }
}
