use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub company_id: Uuid,
    /// Users leading this department. Weak references: ids of deleted
    /// users may linger here and simply never match a live user.
    pub leader_user_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Department {
    fn entity_type() -> &'static str { "department" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone)]
pub struct DbDepartment {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub company_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbDepartment {
    pub fn with_leaders(self, leader_user_ids: Vec<Uuid>) -> Department {
        Department {
            id: self.id,
            name: self.name,
            parent_id: self.parent_id,
            company_id: self.company_id,
            leader_user_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepartmentCreateRequest {
    #[schema(example = "Engineering")]
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub company_id: Uuid,
}

/// Full replacement of a department's leader set.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLeadersRequest {
    pub leader_user_ids: Vec<Uuid>,
}
