//! Auth endpoints: `/auth/{setup|register|login|logout}`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::auth::{password, setup, token};
use crate::database::truthy;
use crate::layer::GatewayState;
use crate::response::Reply;

#[derive(Debug, Default, Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// Handler for `/auth/{action}`; only POST is served.
pub async fn auth_handler(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    Path(action): Path<String>,
    body: Bytes,
) -> Reply {
    if method != Method::POST {
        return Reply::message(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("method not supported: {method}"),
        );
    }

    match action.as_str() {
        "setup" => run_setup(&state).await,
        "register" => register(&state, &body).await,
        "login" => login(&state, &body).await,
        // the client just drops its token, nothing to do server-side
        "logout" => Reply::message(StatusCode::OK, "success"),
        _ => Reply::message(StatusCode::BAD_REQUEST, "action not supported"),
    }
}

/// Handler for a bare `/auth` path.
pub async fn auth_root_handler(method: Method) -> Reply {
    if method != Method::POST {
        return Reply::message(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("method not supported: {method}"),
        );
    }
    Reply::message(StatusCode::BAD_REQUEST, "no auth action provided")
}

async fn run_setup(state: &GatewayState) -> Reply {
    match setup::setup(&state.db).await {
        Ok((username, password)) => {
            Reply::data(json!({ "username": username, "password": password }))
        }
        Err(err) => {
            error!("setup error: {err}");
            Reply::db_error(err)
        }
    }
}

async fn register(state: &GatewayState, body: &Bytes) -> Reply {
    let Ok(credentials) = serde_json::from_slice::<Credentials>(body) else {
        return Reply::message(StatusCode::BAD_REQUEST, "failed to decode json data");
    };

    match setup::register_user(&state.db, &credentials.username, &credentials.password).await {
        Ok(()) => Reply::message(StatusCode::OK, "success"),
        Err(err) => {
            error!("create user error: {err}");
            Reply::db_error(err)
        }
    }
}

async fn login(state: &GatewayState, body: &Bytes) -> Reply {
    let credentials = match serde_json::from_slice::<Credentials>(body) {
        Ok(credentials) => credentials,
        Err(err) => {
            warn!("failed to parse json data: {err}");
            return Reply::message(
                StatusCode::BAD_REQUEST,
                format!("failed to parse post json data, {err}"),
            );
        }
    };

    let user = match setup::fetch_user(&state.db, &credentials.username).await {
        Ok(user) => user,
        Err(err) => {
            error!("fetch user error: {err}");
            return Reply::db_error(err);
        }
    };

    let hashed = user
        .get("password")
        .and_then(|value| value.as_str())
        .unwrap_or_default();
    if !password::verify_password(&credentials.password, hashed) {
        return Reply::message(
            StatusCode::UNAUTHORIZED,
            "failed to authenticate user, password doesn't match",
        );
    }

    let user_id = user.get("id").and_then(|value| value.as_i64()).unwrap_or(0);
    let is_admin = truthy(user.get("is_admin"));
    let Some(secret) = state.auth_secret() else {
        return Reply::message(StatusCode::INTERNAL_SERVER_ERROR, "auth is not configured");
    };
    match token::generate(secret, user_id, is_admin) {
        Ok(signed) => Reply::data(json!({ "token": signed })),
        Err(err) => Reply::message(
            StatusCode::BAD_REQUEST,
            format!("failed to generate token, {err}"),
        ),
    }
}
