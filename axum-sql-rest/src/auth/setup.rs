//! First-run provisioning of the auth tables.

use axum::http::StatusCode;
use serde_json::Value;
use tracing::info;

use super::password::{generate_password, hash_password, GENERATED_PASSWORD_LEN};
use super::policy::{add_policy, default_policies, CREATE_POLICY_TABLE};
use crate::database::{Db, DbError, Object};

/// Username of the bootstrapped administrator.
pub const ADMIN_USERNAME: &str = "rest_admin";

const CREATE_USER_TABLE: &str = "CREATE TABLE auth_users (
    id {},
    username VARCHAR(32) UNIQUE NOT NULL,
    password VARCHAR(72) NOT NULL,
    is_admin BOOL NOT NULL DEFAULT false
)";

const INSERT_ADMIN_USER: &str =
    "INSERT INTO auth_users (username, password, is_admin) VALUES (?, ?, true)";

const INSERT_USER: &str = "INSERT INTO auth_users (username, password) VALUES (?, ?)";

pub(crate) const SELECT_USER: &str =
    "SELECT id, username, password, is_admin FROM auth_users WHERE username = ?";

/// Whether setup already ran; probed by selecting from the users table.
pub async fn is_setup_done(db: &Db) -> bool {
    db.exec(&format!("SELECT 1 FROM {}", super::USER_TABLE), &[])
        .await
        .is_ok()
}

/// Creates the auth tables, seeds the default policies, and bootstraps an
/// admin account with a random password.
///
/// Returns the admin credentials; this is the only time the plain password
/// is available. A second call fails without touching the tables.
pub async fn setup(db: &Db) -> Result<(String, String), DbError> {
    if is_setup_done(db).await {
        return Err(DbError::new(
            StatusCode::BAD_REQUEST,
            "setup is already done before",
        ));
    }

    info!("create users table");
    let ddl = db.dialect().primary_key_ddl();
    db.exec(&CREATE_USER_TABLE.replacen("{}", ddl, 1), &[])
        .await?;

    info!("create an admin user");
    let password = generate_password(GENERATED_PASSWORD_LEN);
    let hashed = hash_password(&password).map_err(hash_error)?;
    db.exec(
        INSERT_ADMIN_USER,
        &[
            Value::String(ADMIN_USERNAME.to_string()),
            Value::String(hashed),
        ],
    )
    .await?;

    info!("create policies table");
    db.exec(&CREATE_POLICY_TABLE.replacen("{}", ddl, 1), &[])
        .await?;

    info!("create default policies");
    for policy in default_policies() {
        add_policy(db, &policy).await?;
    }

    Ok((ADMIN_USERNAME.to_string(), password))
}

/// Creates a regular user account; a duplicate username surfaces as the
/// backend's unique violation.
pub async fn register_user(db: &Db, username: &str, password: &str) -> Result<(), DbError> {
    let hashed = hash_password(password).map_err(hash_error)?;
    db.exec(
        INSERT_USER,
        &[
            Value::String(username.to_string()),
            Value::String(hashed),
        ],
    )
    .await?;
    Ok(())
}

/// Fetches one user row by username; missing users are a 404.
pub async fn fetch_user(db: &Db, username: &str) -> Result<Object, DbError> {
    db.fetch_one(SELECT_USER, &[Value::String(username.to_string())])
        .await
}

fn hash_error(err: bcrypt::BcryptError) -> DbError {
    DbError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("failed to hash password, {err}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;

    async fn open_temp(name: &str) -> Db {
        let path = std::env::temp_dir().join(format!(
            "axum-sql-rest-setup-{name}-{}.db",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        Db::open(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_setup_bootstraps_admin_and_policies() {
        let db = open_temp("bootstrap").await;
        assert!(!is_setup_done(&db).await);

        let (username, password) = setup(&db).await.unwrap();
        assert_eq!(username, ADMIN_USERNAME);
        assert_eq!(password.len(), GENERATED_PASSWORD_LEN);
        assert!(is_setup_done(&db).await);

        let admin = fetch_user(&db, ADMIN_USERNAME).await.unwrap();
        assert!(verify_password(
            &password,
            admin["password"].as_str().unwrap()
        ));

        let policies = db.fetch("SELECT * FROM auth_policies", &[]).await.unwrap();
        assert_eq!(policies.len(), 3);
    }

    #[tokio::test]
    async fn test_setup_is_rejected_the_second_time() {
        let db = open_temp("idempotent").await;
        setup(&db).await.unwrap();

        let err = setup(&db).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        // the users table is untouched
        let users = db.fetch("SELECT * FROM auth_users", &[]).await.unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn test_register_user_and_duplicate() {
        let db = open_temp("register").await;
        setup(&db).await.unwrap();

        register_user(&db, "reader", "hunter22").await.unwrap();
        let user = fetch_user(&db, "reader").await.unwrap();
        assert!(verify_password(
            "hunter22",
            user["password"].as_str().unwrap()
        ));
        assert!(!crate::database::truthy(user.get("is_admin")));

        let err = register_user(&db, "reader", "hunter22").await.unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let missing = fetch_user(&db, "ghost").await.unwrap_err();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }
}
