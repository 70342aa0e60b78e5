use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::org::OrgSnapshot;
use crate::errors::{AppError, AppResult};
use crate::models::grant::{GrantCreateRequest, TemporaryAccessGrant};

/// Storage and matching for temporary access grants. Grants are immutable
/// after creation; revocation stamps `revoked_at` instead of deleting so
/// the audit trail survives.
#[derive(Debug, Clone)]
pub struct GrantStore {
    pool: SqlitePool,
}

impl GrantStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        req: &GrantCreateRequest,
        created_by_id: Uuid,
    ) -> AppResult<TemporaryAccessGrant> {
        if req.end_at < req.start_at {
            return Err(AppError::invalid_range("grant end_at precedes start_at"));
        }
        if req.field_key.trim().is_empty() {
            return Err(AppError::bad_request("grant field_key must not be empty"));
        }

        let grant = TemporaryAccessGrant {
            id: Uuid::new_v4(),
            grantee_id: req.grantee_id,
            resource: req.resource.clone(),
            field_key: req.field_key.clone(),
            action: req.action.clone(),
            start_at: req.start_at,
            end_at: req.end_at,
            allow_cross_boundary: req.allow_cross_boundary,
            scope_department_id: req.scope_department_id,
            created_by_id,
            revoked_at: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO temporary_access_grants
                (id, grantee_id, resource, field_key, action, start_at, end_at,
                 allow_cross_boundary, scope_department_id, created_by_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(grant.id.to_string())
        .bind(grant.grantee_id.to_string())
        .bind(&grant.resource)
        .bind(&grant.field_key)
        .bind(&grant.action)
        .bind(grant.start_at)
        .bind(grant.end_at)
        .bind(grant.allow_cross_boundary)
        .bind(grant.scope_department_id.map(|id| id.to_string()))
        .bind(grant.created_by_id.to_string())
        .bind(grant.created_at)
        .execute(&self.pool)
        .await?;

        Ok(grant)
    }

    pub async fn revoke(&self, grant_id: Uuid) -> AppResult<TemporaryAccessGrant> {
        let row = sqlx::query("SELECT * FROM temporary_access_grants WHERE id = ?")
            .bind(grant_id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("grant not found"))?;

        let mut grant = grant_from_row(&row)?;
        let now = Utc::now();

        sqlx::query("UPDATE temporary_access_grants SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL")
            .bind(now)
            .bind(grant_id.to_string())
            .execute(&self.pool)
            .await?;

        grant.revoked_at = Some(now);
        Ok(grant)
    }

    pub async fn list(&self) -> AppResult<Vec<TemporaryAccessGrant>> {
        let rows = sqlx::query("SELECT * FROM temporary_access_grants ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(grant_from_row).collect()
    }

    /// All currently-active grants for (grantee, resource, action),
    /// regardless of field key or scope. One query; callers match field
    /// keys and department scopes in memory to avoid N+1 lookups.
    pub async fn active_grants(
        &self,
        grantee_id: Uuid,
        resource: &str,
        action: &str,
    ) -> AppResult<Vec<TemporaryAccessGrant>> {
        let now = Utc::now();
        let rows = sqlx::query(
            r#"
            SELECT * FROM temporary_access_grants
            WHERE grantee_id = ? AND resource = ? AND action = ?
              AND revoked_at IS NULL AND start_at <= ? AND end_at >= ?
            "#,
        )
        .bind(grantee_id.to_string())
        .bind(resource)
        .bind(action)
        .bind(now)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(grant_from_row).collect()
    }

    /// Is there an active grant covering this exact field for this grantee?
    /// Department-scoped grants require a target whose department sits at
    /// or below the scope; without a target they cannot be satisfied.
    pub async fn has_active_grant(
        &self,
        org: &OrgSnapshot,
        grantee_id: Uuid,
        resource: &str,
        field_key: &str,
        action: &str,
        target_user_id: Option<Uuid>,
    ) -> AppResult<bool> {
        let grants = self.active_grants(grantee_id, resource, action).await?;
        let matching: Vec<&TemporaryAccessGrant> =
            grants.iter().filter(|g| g.field_key == field_key).collect();

        if matching.is_empty() {
            return Ok(false);
        }
        if matching.iter().any(|g| g.scope_department_id.is_none()) {
            return Ok(true);
        }

        let Some(target_id) = target_user_id else {
            return Ok(false);
        };
        let Some(target_dept) = self.target_department(target_id).await? else {
            return Ok(false);
        };

        Ok(matching.iter().any(|g| {
            g.scope_department_id
                .map(|scope| org.is_descendant_or_self(target_dept, scope))
                .unwrap_or(false)
        }))
    }

    /// The coarser check used to pierce company-boundary isolation: any
    /// active cross-boundary-flagged grant on the resource qualifies, no
    /// field key match required.
    pub async fn has_active_cross_boundary_grant(
        &self,
        grantee_id: Uuid,
        resource: &str,
        action: &str,
    ) -> AppResult<bool> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            SELECT 1 AS present FROM temporary_access_grants
            WHERE grantee_id = ? AND resource = ? AND action = ?
              AND allow_cross_boundary = 1
              AND revoked_at IS NULL AND start_at <= ? AND end_at >= ?
            LIMIT 1
            "#,
        )
        .bind(grantee_id.to_string())
        .bind(resource)
        .bind(action)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn target_department(&self, user_id: Uuid) -> AppResult<Option<Uuid>> {
        let row = sqlx::query("SELECT department_id FROM users WHERE id = ? AND deleted_at IS NULL")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => match r.try_get::<Option<String>, _>("department_id")? {
                Some(s) if !s.is_empty() => Ok(Some(
                    Uuid::parse_str(&s).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))?,
                )),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }
}

/// Does an (already active) grant apply to a target in `target_dept`?
/// Used by the visibility resolver after batch-loading active grants.
pub fn grant_scope_allows(
    grant: &TemporaryAccessGrant,
    org: &OrgSnapshot,
    has_target: bool,
    target_dept: Option<Uuid>,
) -> bool {
    match grant.scope_department_id {
        None => true,
        Some(scope) => {
            if !has_target {
                return false;
            }
            target_dept
                .map(|dept| org.is_descendant_or_self(dept, scope))
                .unwrap_or(false)
        }
    }
}

fn grant_from_row(row: &SqliteRow) -> AppResult<TemporaryAccessGrant> {
    let parse = |s: String| {
        Uuid::parse_str(&s).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))
    };

    let scope_department_id = match row.try_get::<Option<String>, _>("scope_department_id")? {
        Some(s) if !s.is_empty() => Some(parse(s)?),
        _ => None,
    };

    Ok(TemporaryAccessGrant {
        id: parse(row.try_get("id")?)?,
        grantee_id: parse(row.try_get("grantee_id")?)?,
        resource: row.try_get("resource")?,
        field_key: row.try_get("field_key")?,
        action: row.try_get("action")?,
        start_at: parse_datetime(row, "start_at")?,
        end_at: parse_datetime(row, "end_at")?,
        allow_cross_boundary: row.try_get("allow_cross_boundary")?,
        scope_department_id,
        created_by_id: parse(row.try_get("created_by_id")?)?,
        revoked_at: parse_opt_datetime(row, "revoked_at")?,
        created_at: parse_datetime(row, "created_at")?,
    })
}

fn parse_datetime(row: &SqliteRow, column: &str) -> AppResult<DateTime<Utc>> {
    row.try_get::<DateTime<Utc>, _>(column).map_err(AppError::from)
}

fn parse_opt_datetime(row: &SqliteRow, column: &str) -> AppResult<Option<DateTime<Utc>>> {
    row.try_get::<Option<DateTime<Utc>>, _>(column).map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scoped_grant(scope: Option<Uuid>) -> TemporaryAccessGrant {
        let now = Utc::now();
        TemporaryAccessGrant {
            id: Uuid::new_v4(),
            grantee_id: Uuid::new_v4(),
            resource: "user".into(),
            field_key: "salary".into(),
            action: "read".into(),
            start_at: now - Duration::hours(1),
            end_at: now + Duration::hours(1),
            allow_cross_boundary: false,
            scope_department_id: scope,
            created_by_id: Uuid::new_v4(),
            revoked_at: None,
            created_at: now,
        }
    }

    #[test]
    fn unscoped_grant_applies_without_target() {
        let org = OrgSnapshot::default();
        let g = scoped_grant(None);
        assert!(grant_scope_allows(&g, &org, false, None));
        assert!(grant_scope_allows(&g, &org, true, None));
    }

    #[test]
    fn scoped_grant_requires_target_in_scope() {
        let parent = Uuid::from_u128(1);
        let child = Uuid::from_u128(2);
        let sibling = Uuid::from_u128(3);
        let org = OrgSnapshot::new(vec![
            (parent, None, vec![]),
            (child, Some(parent), vec![]),
            (sibling, None, vec![]),
        ]);

        let g = scoped_grant(Some(parent));
        // no target at all: scope cannot be satisfied
        assert!(!grant_scope_allows(&g, &org, false, None));
        // target without a department: no match
        assert!(!grant_scope_allows(&g, &org, true, None));
        // descendant department matches, sibling does not
        assert!(grant_scope_allows(&g, &org, true, Some(child)));
        assert!(grant_scope_allows(&g, &org, true, Some(parent)));
        assert!(!grant_scope_allows(&g, &org, true, Some(sibling)));
    }
}
