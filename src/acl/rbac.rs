use std::collections::HashSet;

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::roles;
use crate::errors::{AppError, AppResult};

/// Role/permission evaluation over the relational model. Permission sets
/// change rarely, so every check re-reads the joins instead of caching.
#[derive(Debug, Clone)]
pub struct Rbac {
    pool: SqlitePool,
}

impl Rbac {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The universal bypass: holders of `super_admin` pass every check in
    /// the system. This must be the first question every higher-level
    /// decision asks.
    pub async fn is_super_admin(&self, user_id: Uuid) -> AppResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 AS present
            FROM roles r
            INNER JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ? AND r.name = ?
            LIMIT 1
            "#,
        )
        .bind(user_id.to_string())
        .bind(roles::SUPER_ADMIN)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    pub async fn role_names(&self, user_id: Uuid) -> AppResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT r.name
            FROM roles r
            INNER JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ?
            ORDER BY r.name
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("name").map_err(AppError::from))
            .collect()
    }

    /// Flattened, deduplicated permission names (`resource.action`) from
    /// every role the user holds.
    pub async fn permission_names(&self, user_id: Uuid) -> AppResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT p.resource, p.action
            FROM permissions p
            INNER JOIN role_permissions rp ON rp.permission_id = p.id
            INNER JOIN user_roles ur ON ur.role_id = rp.role_id
            WHERE ur.user_id = ?
            ORDER BY p.resource, p.action
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let resource: String = r.try_get("resource")?;
                let action: String = r.try_get("action")?;
                Ok(format!("{}.{}", resource, action))
            })
            .collect()
    }

    pub async fn has_permission(&self, user_id: Uuid, resource: &str, action: &str) -> AppResult<bool> {
        if self.is_super_admin(user_id).await? {
            return Ok(true);
        }

        let row = sqlx::query(
            r#"
            SELECT 1 AS present
            FROM permissions p
            INNER JOIN role_permissions rp ON rp.permission_id = p.id
            INNER JOIN user_roles ur ON ur.role_id = rp.role_id
            WHERE ur.user_id = ? AND p.resource = ? AND p.action = ?
            LIMIT 1
            "#,
        )
        .bind(user_id.to_string())
        .bind(resource)
        .bind(action)
        .fetch_optional(&self.pool)
        .await?;

        let allowed = row.is_some();
        tracing::debug!(
            user_id = %user_id,
            resource = %resource,
            action = %action,
            allowed,
            "permission check"
        );
        Ok(allowed)
    }

    /// Replace the user's role assignments with exactly the named roles.
    ///
    /// Names that resolve to no role are dropped silently (logged); an
    /// empty or fully-unmatched list therefore clears every role. That
    /// replace-with-whatever-resolves behavior is deliberate and under
    /// product review, so it is kept observable via warnings rather than
    /// rejected.
    ///
    /// Touching a high-privilege role in either direction requires the
    /// caller to be super-admin, regardless of any other permission the
    /// caller holds.
    pub async fn set_user_roles(
        &self,
        caller_id: Uuid,
        user_id: Uuid,
        role_names: &[String],
    ) -> AppResult<Vec<String>> {
        let current: HashSet<String> = self.role_names(user_id).await?.into_iter().collect();

        let mut resolved: Vec<(Uuid, String)> = Vec::new();
        for name in role_names {
            let row = sqlx::query("SELECT id, name FROM roles WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
            match row {
                Some(r) => {
                    let id = Uuid::parse_str(&r.try_get::<String, _>("id")?)
                        .map_err(|e| AppError::internal(format!("invalid role id: {}", e)))?;
                    resolved.push((id, r.try_get("name")?));
                }
                None => {
                    tracing::warn!(role = %name, user_id = %user_id, "unknown role name dropped from assignment");
                }
            }
        }

        let requested: HashSet<String> = resolved.iter().map(|(_, n)| n.clone()).collect();

        let touches_high_privilege = roles::HIGH_PRIVILEGE
            .iter()
            .any(|r| current.contains(*r) != requested.contains(*r));
        if touches_high_privilege && !self.is_super_admin(caller_id).await? {
            return Err(AppError::forbidden(
                "only super_admin may grant or revoke high-privilege roles",
            ));
        }

        if requested.is_empty() {
            tracing::warn!(user_id = %user_id, "role replacement resolved to an empty set; clearing all roles");
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        for (role_id, _) in &resolved {
            sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id, created_at) VALUES (?, ?, ?)")
                .bind(user_id.to_string())
                .bind(role_id.to_string())
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let mut names: Vec<String> = requested.into_iter().collect();
        names.sort();
        Ok(names)
    }
}
