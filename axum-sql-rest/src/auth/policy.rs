//! Security policies stored in the `auth_policies` table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::{Db, DbError};

/// One policy row: who may perform `action` on `table_name`, expressed in
/// the closed expression grammar evaluated by [`super::User::has_perm`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub id: i64,
    pub description: String,
    pub table_name: String,
    pub action: String,
    pub expression: String,
}

pub(crate) const CREATE_POLICY_TABLE: &str = "CREATE TABLE auth_policies (
    id {},
    description VARCHAR(256) NOT NULL,
    table_name VARCHAR(128) NOT NULL,
    action VARCHAR(16) NOT NULL,
    expression VARCHAR(128) NOT NULL
)";

pub(crate) const INSERT_POLICY: &str = "INSERT INTO auth_policies \
    (description, table_name, action, expression) VALUES (?, ?, ?, ?)";

/// Inserts one policy row; picked up by the next snapshot refresh.
pub async fn add_policy(db: &Db, policy: &Policy) -> Result<(), DbError> {
    db.exec(
        INSERT_POLICY,
        &[
            Value::String(policy.description.clone()),
            Value::String(policy.table_name.clone()),
            Value::String(policy.action.clone()),
            Value::String(policy.expression.clone()),
        ],
    )
    .await?;
    Ok(())
}

/// Policies installed at setup time: the auth tables are admin-only, and
/// everything else defaults to per-user row scoping.
pub fn default_policies() -> Vec<Policy> {
    vec![
        Policy {
            id: 0,
            description: "policies operations are limited to admin user".to_string(),
            table_name: "auth_policies".to_string(),
            action: "all".to_string(),
            expression: "auth_user.is_admin".to_string(),
        },
        Policy {
            id: 0,
            description: "users are limited to admin user (denies users updating themselves to admin)"
                .to_string(),
            table_name: "auth_users".to_string(),
            action: "all".to_string(),
            expression: "auth_user.is_admin".to_string(),
        },
        Policy {
            id: 0,
            description: "all tables/actions are filtered by user_id".to_string(),
            table_name: "all".to_string(),
            action: "all".to_string(),
            expression: "user_id = auth_user.id".to_string(),
        },
    ]
}
