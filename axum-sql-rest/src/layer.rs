//! Gateway construction and Axum integration.
//!
//! A [`RestGateway`] owns the connection pool, the metadata cache with its
//! refresh task, and the auth configuration; [`RestGateway::into_router`]
//! turns it into a plain `axum::Router` that can be served directly or
//! merged into a host application.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::api;
use crate::cache::MetaCache;
use crate::database::{Db, OpenError};

/// Shared state behind every handler.
pub struct GatewayState {
    pub(crate) db: Db,
    pub(crate) cache: Arc<MetaCache>,
    auth_secret: Option<Vec<u8>>,
}

impl GatewayState {
    /// Auth is enabled iff a token secret was configured.
    pub(crate) fn auth_enabled(&self) -> bool {
        self.auth_secret.is_some()
    }

    pub(crate) fn auth_secret(&self) -> Option<&[u8]> {
        self.auth_secret.as_deref()
    }
}

/// Configures and connects a [`RestGateway`].
pub struct GatewayBuilder {
    url: String,
    prefix: String,
    auth_secret: Option<String>,
    cors_enabled: bool,
    cors_origins: Vec<String>,
}

impl GatewayBuilder {
    /// Mounts the gateway under a URL prefix (e.g. `/admin`).
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Enables authentication and authorization with the given token
    /// secret.
    #[must_use]
    pub fn auth_secret(mut self, secret: impl Into<String>) -> Self {
        self.auth_secret = Some(secret.into());
        self
    }

    /// Enables CORS; an empty origin list means permissive.
    #[must_use]
    pub fn cors(mut self, origins: Vec<String>) -> Self {
        self.cors_enabled = true;
        self.cors_origins = origins;
        self
    }

    /// Opens the pool, runs the first schema refresh, and starts the
    /// periodic refresh task.
    pub async fn connect(self) -> Result<RestGateway, OpenError> {
        let db = Db::open(&self.url).await?;
        let auth_secret = self.auth_secret.map(String::into_bytes);
        let cache = MetaCache::start(db.clone(), auth_secret.is_some()).await;
        let state = Arc::new(GatewayState {
            db,
            cache,
            auth_secret,
        });
        Ok(RestGateway {
            state,
            prefix: self.prefix,
            cors_enabled: self.cors_enabled,
            cors_origins: self.cors_origins,
        })
    }
}

/// A connected REST gateway.
///
/// # Example
///
/// ```rust,no_run
/// use axum_sql_rest::RestGateway;
///
/// # async fn example() {
/// let gateway = RestGateway::builder("sqlite://data.db?mode=rwc")
///     .prefix("/api")
///     .connect()
///     .await
///     .unwrap();
/// let app = axum::Router::new().merge(gateway.clone().into_router());
/// // serve `app`, call `gateway.close()` on shutdown
/// # }
/// ```
#[derive(Clone)]
pub struct RestGateway {
    state: Arc<GatewayState>,
    prefix: String,
    cors_enabled: bool,
    cors_origins: Vec<String>,
}

impl RestGateway {
    /// Starts configuring a gateway for the given database URL.
    pub fn builder(url: impl Into<String>) -> GatewayBuilder {
        GatewayBuilder {
            url: url.into(),
            prefix: String::new(),
            auth_secret: None,
            cors_enabled: false,
            cors_origins: Vec::new(),
        }
    }

    /// The database handle, for administrative tasks next to the server.
    pub fn db(&self) -> &Db {
        &self.state.db
    }

    /// Converts the gateway into an Axum router.
    pub fn into_router(self) -> Router {
        let mut router = api::router(self.state.clone());

        let prefix = self.prefix.trim_end_matches('/');
        if !prefix.is_empty() {
            router = Router::new().nest(prefix, router);
        }

        if self.cors_enabled {
            router = router.layer(self.cors_layer());
        }
        router
    }

    fn cors_layer(&self) -> CorsLayer {
        if self.cors_origins.is_empty() {
            return CorsLayer::permissive();
        }
        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("skipping invalid cors origin: {origin}");
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }

    /// Stops the refresh task; idempotent.
    pub fn close(&self) {
        self.state.cache.close();
    }
}
