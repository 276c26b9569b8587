//! Shared schema and policy snapshots.
//!
//! Both snapshots are rebuilt by a single background task every 30 seconds
//! and published under a reader-writer lock holding reference-counted maps.
//! Readers clone the `Arc` out of a short critical section and work on an
//! immutable snapshot; a request never observes a half-built map.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, trace};

use crate::auth::{Policies, POLICY_TABLE};
use crate::database::Db;
use crate::schema::Tables;

/// How often the snapshots are rebuilt.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

const SELECT_POLICIES: &str = "SELECT table_name, action, expression FROM auth_policies";

/// Process-wide metadata cache with one refresh task.
pub struct MetaCache {
    tables: RwLock<Arc<Tables>>,
    policies: RwLock<Arc<Policies>>,
    shutdown: watch::Sender<bool>,
}

impl MetaCache {
    /// Runs one synchronous refresh, then spawns the periodic refresh task.
    ///
    /// The task wakes on the 30-second tick or the shutdown signal, nothing
    /// else. When `auth_enabled` is false the policy snapshot stays empty.
    pub async fn start(db: Db, auth_enabled: bool) -> Arc<Self> {
        let (shutdown, mut signal) = watch::channel(false);
        let cache = Arc::new(Self {
            tables: RwLock::new(Arc::new(HashMap::new())),
            policies: RwLock::new(Arc::new(HashMap::new())),
            shutdown,
        });

        cache.refresh(&db, auth_enabled).await;

        let task_cache = cache.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
            // the first tick completes immediately and the initial refresh
            // already ran
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = signal.changed() => return,
                    _ = ticker.tick() => task_cache.refresh(&db, auth_enabled).await,
                }
            }
        });

        cache
    }

    /// Current schema snapshot.
    pub fn tables(&self) -> Arc<Tables> {
        self.tables.read().unwrap().clone()
    }

    /// Current policy snapshot.
    pub fn policies(&self) -> Arc<Policies> {
        self.policies.read().unwrap().clone()
    }

    /// Stops the refresh task. Safe to call more than once.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn refresh(&self, db: &Db, auth_enabled: bool) {
        match db.fetch_tables().await {
            Ok(tables) => {
                for table in tables.values() {
                    trace!("fetched table: {table}");
                }
                *self.tables.write().unwrap() = Arc::new(tables);
            }
            // keep serving the previous snapshot
            Err(err) => error!("fetch tables error: {err}"),
        }

        if auth_enabled {
            self.refresh_policies(db).await;
        }
    }

    async fn refresh_policies(&self, db: &Db) {
        let rows = match db.fetch(SELECT_POLICIES, &[]).await {
            Ok(rows) => rows,
            Err(err) => {
                error!("fetch policies from {POLICY_TABLE} error: {err}");
                return;
            }
        };

        let mut policies: Policies = HashMap::new();
        for row in rows {
            let (Some(table), Some(action), Some(expression)) = (
                row.get("table_name").and_then(|v| v.as_str()),
                row.get("action").and_then(|v| v.as_str()),
                row.get("expression").and_then(|v| v.as_str()),
            ) else {
                error!("malformed policy row: {row:?}");
                continue;
            };
            policies
                .entry(table.to_string())
                .or_default()
                .insert(action.to_string(), expression.to_string());
        }
        trace!("fetched policies: {policies:?}");
        *self.policies.write().unwrap() = Arc::new(policies);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp(name: &str) -> Db {
        let path = std::env::temp_dir().join(format!(
            "axum-sql-rest-cache-{name}-{}.db",
            std::process::id()
        ));
        Db::open(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initial_refresh_and_close() {
        let db = open_temp("initial").await;
        db.exec("CREATE TABLE IF NOT EXISTS widgets (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();

        let cache = MetaCache::start(db, false).await;
        assert!(cache.tables().contains_key("widgets"));
        assert!(cache.policies().is_empty());

        cache.close();
        cache.close();
    }

    #[tokio::test]
    async fn test_policy_snapshot() {
        let db = open_temp("policies").await;
        db.exec(
            "CREATE TABLE IF NOT EXISTS auth_policies (
                id INTEGER PRIMARY KEY,
                description VARCHAR(256),
                table_name VARCHAR(128),
                action VARCHAR(16),
                expression VARCHAR(128)
            )",
            &[],
        )
        .await
        .unwrap();
        db.exec(
            "INSERT INTO auth_policies (description, table_name, action, expression)
             VALUES ('', 'articles', 'all', 'user_id = auth_user.id')",
            &[],
        )
        .await
        .unwrap();

        let cache = MetaCache::start(db, true).await;
        let policies = cache.policies();
        assert_eq!(
            policies["articles"]["all"],
            "user_id = auth_user.id".to_string()
        );
        cache.close();
    }
}
