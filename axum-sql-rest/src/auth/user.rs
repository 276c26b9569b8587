//! Request users and policy evaluation.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::Policies;

/// What a request is trying to do, derived from the HTTP verb and the
/// `mine` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    /// Read with the `mine` flag, usually filtered by a user-id column.
    ReadMine,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::ReadMine => "read_mine",
        }
    }
}

/// The user attached to a request; id 0 is the anonymous user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// A user-scoping filter derived from policy evaluation: generated SQL gets
/// an implicit `column = user_id` predicate (or insert value).
#[derive(Debug, Clone)]
pub struct UserAuthInfo {
    pub column: String,
    pub user_id: i64,
}

impl User {
    pub fn is_anonymous(&self) -> bool {
        self.id == 0
    }

    pub fn is_authenticated(&self) -> bool {
        self.id != 0
    }

    /// Decides whether this user may perform `action` on `table`.
    ///
    /// Lookup order: the table's entry for the action, the table's `all`
    /// entry, the global `all`/`all` entry; a table with no matching entry
    /// at all is allowed. The second return value is the user-id column to
    /// scope the query by, when the matched expression requests one.
    pub fn has_perm(
        &self,
        table: &str,
        action: Action,
        policies: &Policies,
    ) -> (bool, Option<String>) {
        let expression = policies
            .get(table)
            .and_then(|actions| actions.get(action.as_str()).or_else(|| actions.get("all")))
            .or_else(|| policies.get("all").and_then(|actions| actions.get("all")));

        match expression {
            Some(expression) => self.eval(expression),
            None => (true, None),
        }
    }

    /// Evaluates one policy expression. The grammar is closed: empty,
    /// `auth_user.is_admin`, `auth_user.is_authenticated`, or
    /// `<column>=auth_user.id`; anything else denies.
    ///
    /// The `<column>=auth_user.id` form reports its column even when the
    /// user is anonymous, so callers can distinguish "login required" from
    /// "forbidden".
    fn eval(&self, expression: &str) -> (bool, Option<String>) {
        let expression: String = expression.chars().filter(|c| *c != ' ').collect();
        if expression.is_empty() {
            return (true, None);
        }
        if expression == "auth_user.is_admin" {
            return (self.is_admin, None);
        }
        if expression == "auth_user.is_authenticated" {
            return (self.is_authenticated(), None);
        }
        if let Some(column) = expression.strip_suffix("=auth_user.id") {
            return (self.is_authenticated(), Some(column.to_string()));
        }

        warn!("invalid policy expression: {expression}, denying");
        (false, None)
    }
}
