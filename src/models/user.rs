use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for User {
    fn entity_type() -> &'static str { "user" }
    fn subject_id(&self) -> Uuid { self.id }
}

/// Raw user row; built by `db::row_parsers::db_user_from_row`.
#[derive(Debug, Clone)]
pub struct DbUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub company_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<DbUser> for User {
    fn from(db: DbUser) -> Self {
        User {
            id: db.id,
            name: db.name,
            email: db.email,
            company_id: db.company_id,
            department_id: db.department_id,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Row-level visibility scope attached to a user. Absence of a
/// `user_visibility` row is equivalent to `hidden = false, view_scope = All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViewScope {
    All,
    SelfOnly,
    DeptOnly,
}

impl ViewScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewScope::All => "all",
            ViewScope::SelfOnly => "self_only",
            ViewScope::DeptOnly => "dept_only",
        }
    }

    /// Unknown values degrade to the default rather than erroring; the
    /// column is free text and older rows may carry retired spellings.
    pub fn parse(value: &str) -> Self {
        match value {
            "self_only" => ViewScope::SelfOnly,
            "dept_only" => ViewScope::DeptOnly,
            _ => ViewScope::All,
        }
    }
}

impl Default for ViewScope {
    fn default() -> Self {
        ViewScope::All
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserVisibility {
    pub user_id: Uuid,
    pub hidden: bool,
    pub view_scope: ViewScope,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for UserVisibility {
    fn entity_type() -> &'static str { "user_visibility" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// Partial update: fields left out keep their previous value (or the
/// default when no visibility row existed yet).
#[derive(Debug, Deserialize, ToSchema)]
pub struct VisibilityUpdateRequest {
    pub hidden: Option<bool>,
    pub view_scope: Option<ViewScope>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfile {
    pub user_id: Uuid,
    /// Field values the viewer is allowed to read, keyed by field key.
    pub fields: std::collections::BTreeMap<String, String>,
}
