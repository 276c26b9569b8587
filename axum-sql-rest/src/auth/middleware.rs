//! Request authentication middleware.
//!
//! Extracts the `Authorization: Bearer` token, verifies it, and attaches the
//! resulting [`User`] as a request extension. A missing or invalid token
//! yields the anonymous user; rejecting the request is the policy gate's
//! job, not the middleware's.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use super::{token, User};
use crate::layer::GatewayState;

pub async fn authenticate(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut user = User::default();
    if let Some(secret) = state.auth_secret() {
        let bearer = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));
        if let Some(bearer) = bearer {
            match token::verify(secret, bearer) {
                Ok(claims) => {
                    user = User {
                        id: claims.user_id,
                        username: String::new(),
                        is_admin: claims.is_admin,
                    };
                }
                Err(err) => warn!("parse bearer token error: {err}"),
            }
        }
    }

    request.extensions_mut().insert(user);
    next.run(request).await
}
