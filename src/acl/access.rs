use std::collections::HashSet;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::org::OrgSnapshot;
use super::rbac::Rbac;
use crate::errors::{AppError, AppResult};
use crate::models::user::ViewScope;

/// The per-user columns every row-level decision needs, with the optional
/// visibility record already folded in (absence = not hidden, scope ALL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAclRow {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub hidden: bool,
    pub view_scope: ViewScope,
}

/// Scope refinement stacked on top of the base predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowScope {
    Any,
    SelfOnly(Uuid),
    Departments(HashSet<Uuid>),
}

/// Declarative row filter over the user table. The same value drives both
/// the point check (`matches`) and the SQL the listing consumer renders,
/// so `can_see_user` and filtered listings agree by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRowFilter {
    /// Super-admin: match everything, hidden rows included.
    All,
    /// Base predicate (not hidden, same company when known) plus a scope
    /// refinement. The company predicate is never relaxed by view scope.
    Scoped {
        company_id: Option<Uuid>,
        scope: RowScope,
    },
}

impl UserRowFilter {
    pub fn matches(&self, row: &UserAclRow) -> bool {
        match self {
            UserRowFilter::All => true,
            UserRowFilter::Scoped { company_id, scope } => {
                if row.hidden {
                    return false;
                }
                if let Some(company) = company_id {
                    if row.company_id != Some(*company) {
                        return false;
                    }
                }
                match scope {
                    RowScope::Any => true,
                    RowScope::SelfOnly(viewer) => row.id == *viewer,
                    RowScope::Departments(depts) => row
                        .department_id
                        .map(|d| depts.contains(&d))
                        .unwrap_or(false),
                }
            }
        }
    }

    /// Render to a SQL predicate over `users u LEFT JOIN user_visibility v`.
    /// Returns the clause and its positional string binds.
    pub fn to_sql(&self, user_alias: &str, vis_alias: &str) -> (String, Vec<String>) {
        match self {
            UserRowFilter::All => ("1 = 1".to_string(), Vec::new()),
            UserRowFilter::Scoped { company_id, scope } => {
                let mut clauses = vec![format!("COALESCE({}.hidden, 0) = 0", vis_alias)];
                let mut binds = Vec::new();

                if let Some(company) = company_id {
                    clauses.push(format!("{}.company_id = ?", user_alias));
                    binds.push(company.to_string());
                }

                match scope {
                    RowScope::Any => {}
                    RowScope::SelfOnly(viewer) => {
                        clauses.push(format!("{}.id = ?", user_alias));
                        binds.push(viewer.to_string());
                    }
                    RowScope::Departments(depts) => {
                        if depts.is_empty() {
                            clauses.push("1 = 0".to_string());
                        } else {
                            let placeholders = vec!["?"; depts.len()].join(", ");
                            clauses.push(format!(
                                "{}.department_id IN ({})",
                                user_alias, placeholders
                            ));
                            let mut sorted: Vec<String> =
                                depts.iter().map(|d| d.to_string()).collect();
                            sorted.sort();
                            binds.extend(sorted);
                        }
                    }
                }

                (clauses.join(" AND "), binds)
            }
        }
    }
}

/// Composition root for row-level decisions: RBAC + organization graph +
/// the viewer's visibility scope.
#[derive(Debug, Clone)]
pub struct AccessControl {
    pool: SqlitePool,
    rbac: Rbac,
}

impl AccessControl {
    pub fn new(pool: SqlitePool) -> Self {
        let rbac = Rbac::new(pool.clone());
        Self { pool, rbac }
    }

    pub fn rbac(&self) -> &Rbac {
        &self.rbac
    }

    pub async fn is_super_admin(&self, user_id: Uuid) -> AppResult<bool> {
        self.rbac.is_super_admin(user_id).await
    }

    pub async fn has_permission(&self, user_id: Uuid, resource: &str, action: &str) -> AppResult<bool> {
        self.rbac.has_permission(user_id, resource, action).await
    }

    /// Build the viewer's row filter, loading the department forest for
    /// this one decision.
    pub async fn accessible_user_where(&self, viewer_id: Uuid) -> AppResult<UserRowFilter> {
        let org = OrgSnapshot::load(&self.pool).await?;
        self.accessible_user_where_with(&org, viewer_id).await
    }

    /// Same as `accessible_user_where`, with the caller supplying the
    /// snapshot so one composite decision reads the forest once.
    pub async fn accessible_user_where_with(
        &self,
        org: &OrgSnapshot,
        viewer_id: Uuid,
    ) -> AppResult<UserRowFilter> {
        if self.rbac.is_super_admin(viewer_id).await? {
            return Ok(UserRowFilter::All);
        }

        // Degraded-but-safe default for an unknown viewer: hide hidden
        // rows, restrict nothing else.
        let Some(viewer) = load_user_acl_row(&self.pool, viewer_id).await? else {
            return Ok(UserRowFilter::Scoped {
                company_id: None,
                scope: RowScope::Any,
            });
        };

        let scope = match viewer.view_scope {
            ViewScope::All => RowScope::Any,
            ViewScope::SelfOnly => RowScope::SelfOnly(viewer_id),
            ViewScope::DeptOnly => {
                let mut depts = org.leader_scope(viewer_id);
                if let Some(own) = viewer.department_id {
                    depts.insert(own);
                    depts.extend(org.collect_descendants(&[own].into_iter().collect()));
                }
                if depts.is_empty() {
                    // No department and no leadership: the viewer only
                    // sees themselves.
                    RowScope::SelfOnly(viewer_id)
                } else {
                    RowScope::Departments(depts)
                }
            }
        };

        Ok(UserRowFilter::Scoped {
            company_id: viewer.company_id,
            scope,
        })
    }

    /// Point check, consistent with the filter: true iff the target row
    /// exists and satisfies `accessible_user_where(viewer)`. A missing
    /// target is "not visible", never an error; invisibility doubles as
    /// existence hiding.
    pub async fn can_see_user(&self, viewer_id: Uuid, target_user_id: Uuid) -> AppResult<bool> {
        let org = OrgSnapshot::load(&self.pool).await?;
        self.can_see_user_with(&org, viewer_id, target_user_id).await
    }

    pub async fn can_see_user_with(
        &self,
        org: &OrgSnapshot,
        viewer_id: Uuid,
        target_user_id: Uuid,
    ) -> AppResult<bool> {
        if self.rbac.is_super_admin(viewer_id).await? {
            return Ok(true);
        }

        let Some(target) = load_user_acl_row(&self.pool, target_user_id).await? else {
            return Ok(false);
        };

        let filter = self.accessible_user_where_with(org, viewer_id).await?;
        Ok(filter.matches(&target))
    }

    /// True iff the viewer leads the target's department or any of its
    /// ancestors. False when the target has no department.
    pub async fn is_leader_for_user(&self, viewer_id: Uuid, target_user_id: Uuid) -> AppResult<bool> {
        let Some(target) = load_user_acl_row(&self.pool, target_user_id).await? else {
            return Ok(false);
        };
        let Some(dept) = target.department_id else {
            return Ok(false);
        };

        let org = OrgSnapshot::load(&self.pool).await?;
        Ok(org.leads_chain(viewer_id, dept))
    }
}

/// Fetch the ACL-relevant columns for one user, visibility folded in.
pub async fn load_user_acl_row(pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<UserAclRow>> {
    let row = sqlx::query(
        r#"
        SELECT u.id, u.company_id, u.department_id,
               COALESCE(v.hidden, 0) AS hidden,
               COALESCE(v.view_scope, 'all') AS view_scope
        FROM users u
        LEFT JOIN user_visibility v ON v.user_id = u.id
        WHERE u.id = ? AND u.deleted_at IS NULL
        "#,
    )
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_acl_row_from_row).transpose()
}

pub fn user_acl_row_from_row(row: &SqliteRow) -> AppResult<UserAclRow> {
    let parse = |s: String| {
        Uuid::parse_str(&s).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))
    };
    let parse_opt = |s: Option<String>| match s {
        Some(s) if !s.is_empty() => parse(s).map(Some),
        _ => Ok(None),
    };

    let view_scope_str: String = row.try_get("view_scope")?;

    Ok(UserAclRow {
        id: parse(row.try_get("id")?)?,
        company_id: parse_opt(row.try_get("company_id")?)?,
        department_id: parse_opt(row.try_get("department_id")?)?,
        hidden: row.try_get("hidden")?,
        view_scope: ViewScope::parse(&view_scope_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u128, company: Option<u128>, dept: Option<u128>, hidden: bool) -> UserAclRow {
        UserAclRow {
            id: Uuid::from_u128(id),
            company_id: company.map(Uuid::from_u128),
            department_id: dept.map(Uuid::from_u128),
            hidden,
            view_scope: ViewScope::All,
        }
    }

    #[test]
    fn match_all_includes_hidden_rows() {
        let filter = UserRowFilter::All;
        assert!(filter.matches(&row(1, Some(1), None, true)));
    }

    #[test]
    fn hidden_rows_never_match_scoped_filters() {
        let filter = UserRowFilter::Scoped {
            company_id: None,
            scope: RowScope::Any,
        };
        assert!(filter.matches(&row(1, None, None, false)));
        assert!(!filter.matches(&row(1, None, None, true)));
    }

    #[test]
    fn company_predicate_is_strict() {
        let filter = UserRowFilter::Scoped {
            company_id: Some(Uuid::from_u128(7)),
            scope: RowScope::Any,
        };
        assert!(filter.matches(&row(1, Some(7), None, false)));
        assert!(!filter.matches(&row(1, Some(8), None, false)));
        // a target with no company is also outside the viewer's company
        assert!(!filter.matches(&row(1, None, None, false)));
    }

    #[test]
    fn self_only_restricts_to_the_viewer() {
        let filter = UserRowFilter::Scoped {
            company_id: None,
            scope: RowScope::SelfOnly(Uuid::from_u128(1)),
        };
        assert!(filter.matches(&row(1, None, None, false)));
        assert!(!filter.matches(&row(2, None, None, false)));
    }

    #[test]
    fn department_scope_requires_membership() {
        let depts: HashSet<Uuid> = [Uuid::from_u128(10)].into_iter().collect();
        let filter = UserRowFilter::Scoped {
            company_id: None,
            scope: RowScope::Departments(depts),
        };
        assert!(filter.matches(&row(1, None, Some(10), false)));
        assert!(!filter.matches(&row(1, None, Some(11), false)));
        assert!(!filter.matches(&row(1, None, None, false)));
    }

    #[test]
    fn sql_rendering_matches_point_semantics() {
        let filter = UserRowFilter::Scoped {
            company_id: Some(Uuid::from_u128(7)),
            scope: RowScope::SelfOnly(Uuid::from_u128(1)),
        };
        let (clause, binds) = filter.to_sql("u", "v");
        assert_eq!(clause, "COALESCE(v.hidden, 0) = 0 AND u.company_id = ? AND u.id = ?");
        assert_eq!(binds.len(), 2);

        let (all_clause, all_binds) = UserRowFilter::All.to_sql("u", "v");
        assert_eq!(all_clause, "1 = 1");
        assert!(all_binds.is_empty());
    }

    #[test]
    fn empty_department_set_renders_to_false() {
        let filter = UserRowFilter::Scoped {
            company_id: None,
            scope: RowScope::Departments(HashSet::new()),
        };
        let (clause, binds) = filter.to_sql("u", "v");
        assert!(clause.contains("1 = 0"));
        assert!(binds.is_empty());
        assert!(!filter.matches(&row(1, None, Some(10), false)));
    }
}
