//! HTTP endpoint handlers and route assembly.

use std::sync::Arc;

use axum::routing::any;
use axum::{middleware, Router};

use crate::layer::GatewayState;

pub mod auth;
pub mod crud;

pub use auth::auth_handler;
pub use crud::{health_handler, row_handler, table_handler};

/// Builds the gateway's route table.
///
/// The verbs are dispatched inside the handlers (an unsupported verb is a
/// JSON 405, not axum's default empty reply), so every route is registered
/// with `any`. The auth routes exist only when auth is enabled; otherwise
/// `/auth/...` falls through to table routing like any other path.
pub fn router(state: Arc<GatewayState>) -> Router {
    let mut router = Router::new().route("/", any(crud::health_handler));

    if state.auth_enabled() {
        router = router
            .route("/auth", any(auth::auth_root_handler))
            .route("/auth/{action}", any(auth::auth_handler));
    }

    router
        .route("/{table}", any(crud::table_handler))
        .route("/{table}/{id}", any(crud::row_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::auth::middleware::authenticate,
        ))
        .with_state(state)
}
