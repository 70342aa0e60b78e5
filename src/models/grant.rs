use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::events::{Loggable, Severity};

/// A time-boxed, optionally department-scoped exception permitting one
/// grantee a specific action on a specific field. Immutable after creation
/// apart from revocation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TemporaryAccessGrant {
    pub id: Uuid,
    pub grantee_id: Uuid,
    pub resource: String,
    pub field_key: String,
    pub action: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// When set, this grant may pierce the company-boundary isolation
    /// invariant for its resource.
    pub allow_cross_boundary: bool,
    /// When set, the grant only applies to targets inside this department
    /// or one of its descendants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_department_id: Option<Uuid>,
    pub created_by_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TemporaryAccessGrant {
    /// Active iff `start_at <= now <= end_at` (inclusive on both ends)
    /// and not revoked.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.start_at <= now && now <= self.end_at
    }
}

impl Loggable for TemporaryAccessGrant {
    fn entity_type() -> &'static str { "access_grant" }
    fn subject_id(&self) -> Uuid { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrantCreateRequest {
    pub grantee_id: Uuid,
    #[schema(example = "user")]
    pub resource: String,
    #[schema(example = "salary")]
    pub field_key: String,
    #[schema(example = "read")]
    pub action: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub allow_cross_boundary: bool,
    pub scope_department_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(start: DateTime<Utc>, end: DateTime<Utc>) -> TemporaryAccessGrant {
        TemporaryAccessGrant {
            id: Uuid::new_v4(),
            grantee_id: Uuid::new_v4(),
            resource: "user".into(),
            field_key: "salary".into(),
            action: "read".into(),
            start_at: start,
            end_at: end,
            allow_cross_boundary: false,
            scope_department_id: None,
            created_by_id: Uuid::new_v4(),
            revoked_at: None,
            created_at: start,
        }
    }

    #[test]
    fn window_is_inclusive_on_both_ends() {
        let now = Utc::now();
        let g = grant(now, now + Duration::hours(1));
        assert!(g.is_active_at(now));
        assert!(g.is_active_at(now + Duration::hours(1)));
        assert!(!g.is_active_at(now + Duration::hours(2)));
        assert!(!g.is_active_at(now - Duration::seconds(1)));
    }

    #[test]
    fn revocation_ends_the_grant() {
        let now = Utc::now();
        let mut g = grant(now - Duration::hours(1), now + Duration::hours(1));
        assert!(g.is_active_at(now));
        g.revoked_at = Some(now);
        assert!(!g.is_active_at(now));
    }
}
