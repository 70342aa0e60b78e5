use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone)]
pub struct DbRole {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbRole> for Role {
    fn from(db: DbRole) -> Self {
        Role {
            id: db.id,
            name: db.name,
            description: db.description,
            is_system: db.is_system,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

// =============================================================================
// PERMISSION
// =============================================================================

/// A permission is identified by its (resource, action) pair; the dotted
/// display name is derived, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    pub resource: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn name(&self) -> String {
        format!("{}.{}", self.resource, self.action)
    }
}

impl Loggable for Permission {
    fn entity_type() -> &'static str { "permission" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone)]
pub struct DbPermission {
    pub id: Uuid,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbPermission> for Permission {
    fn from(db: DbPermission) -> Self {
        Permission {
            id: db.id,
            resource: db.resource,
            action: db.action,
            description: db.description,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

// =============================================================================
// ASSIGNMENTS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRoleAssignment {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

impl Loggable for UserRoleAssignment {
    fn entity_type() -> &'static str { "user_role" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// Replace semantics: the user ends up with exactly the named roles.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetUserRolesRequest {
    #[schema(example = json!(["hr_manager"]))]
    pub roles: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermissions {
    pub user_id: Uuid,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}
