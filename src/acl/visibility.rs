use std::collections::{BTreeSet, HashSet};

use sqlx::SqlitePool;
use uuid::Uuid;

use super::access::{load_user_acl_row, AccessControl};
use super::fields::FieldRegistry;
use super::grants::{grant_scope_allows, GrantStore};
use super::org::OrgSnapshot;
use super::{permissions, MANAGER_FIELD_WHITELIST};
use crate::errors::AppResult;
use crate::models::field::Classification;
use crate::models::grant::TemporaryAccessGrant;

/// One way a field can become readable. Each classification tier maps to
/// an ordered list of these, evaluated short-circuit; the per-tier
/// asymmetries (no self-view below INTERNAL, no leader carve-out for
/// SENSITIVE) are explicit in the table instead of buried in branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Viewer is reading their own record.
    SelfView,
    /// Viewer holds this (resource, action) permission.
    Permission(&'static str, &'static str),
    /// Viewer leads the target's department chain and the key is on the
    /// manager whitelist.
    LeaderWhitelist,
    /// An active temporary grant covers this exact field.
    TemporaryGrant,
}

/// Tier policy table. Order matters: cheapest and broadest first.
pub fn tier_rules(tier: Classification) -> &'static [FieldRule] {
    match tier {
        Classification::Public => &[],
        Classification::Internal => &[
            FieldRule::SelfView,
            FieldRule::Permission(permissions::CONTACT_READ.0, permissions::CONTACT_READ.1),
            FieldRule::LeaderWhitelist,
            FieldRule::TemporaryGrant,
        ],
        Classification::Sensitive => &[
            FieldRule::Permission(
                permissions::USER_SENSITIVE_READ.0,
                permissions::USER_SENSITIVE_READ.1,
            ),
            FieldRule::TemporaryGrant,
        ],
        Classification::HighlySensitive => &[
            FieldRule::Permission(
                permissions::USER_HIGHLY_SENSITIVE_READ.0,
                permissions::USER_HIGHLY_SENSITIVE_READ.1,
            ),
            FieldRule::TemporaryGrant,
        ],
    }
}

/// Everything the per-field rules need, gathered once per call.
pub struct RuleContext<'a> {
    pub is_self: bool,
    pub is_leader: bool,
    pub has_target: bool,
    pub target_department: Option<Uuid>,
    pub permission_names: HashSet<String>,
    pub active_grants: &'a [TemporaryAccessGrant],
    pub org: &'a OrgSnapshot,
}

pub fn rule_allows(rule: FieldRule, key: &str, ctx: &RuleContext<'_>) -> bool {
    match rule {
        FieldRule::SelfView => ctx.is_self,
        FieldRule::Permission(resource, action) => ctx
            .permission_names
            .contains(&format!("{}.{}", resource, action)),
        FieldRule::LeaderWhitelist => ctx.is_leader && MANAGER_FIELD_WHITELIST.contains(&key),
        FieldRule::TemporaryGrant => ctx.active_grants.iter().any(|g| {
            g.field_key == key
                && grant_scope_allows(g, ctx.org, ctx.has_target, ctx.target_department)
        }),
    }
}

/// Composes access control, the field catalog and the grant store into
/// "which field keys may this viewer read for this target".
#[derive(Debug, Clone)]
pub struct FieldVisibility {
    pool: SqlitePool,
    access: AccessControl,
    registry: FieldRegistry,
    grants: GrantStore,
}

impl FieldVisibility {
    pub fn new(pool: SqlitePool) -> Self {
        let access = AccessControl::new(pool.clone());
        let registry = FieldRegistry::new(pool.clone());
        let grants = GrantStore::new(pool.clone());
        Self { pool, access, registry, grants }
    }

    /// The central decision function. Field-level visibility never exceeds
    /// row-level visibility; every pre-check short-circuits to an empty
    /// set rather than an error.
    pub async fn visible_field_keys(
        &self,
        viewer_id: Uuid,
        resource: &str,
        target_user_id: Option<Uuid>,
    ) -> AppResult<BTreeSet<String>> {
        let definitions = self.registry.list_all().await?;
        if definitions.is_empty() {
            return Ok(BTreeSet::new());
        }

        // Classification tiers do not restrict the super-admin.
        if self.access.is_super_admin(viewer_id).await? {
            return Ok(definitions.into_iter().map(|d| d.key).collect());
        }

        let org = OrgSnapshot::load(&self.pool).await?;

        let mut is_self = false;
        let mut is_leader = false;
        let mut target_department = None;

        if let Some(target_id) = target_user_id {
            let Some(target) = load_user_acl_row(&self.pool, target_id).await? else {
                // Unknown target reads as invisible, hiding its existence.
                return Ok(BTreeSet::new());
            };
            let viewer = load_user_acl_row(&self.pool, viewer_id).await?;

            let crosses_company_boundary = match (
                viewer.as_ref().and_then(|v| v.company_id),
                target.company_id,
            ) {
                (Some(a), Some(b)) => a != b,
                _ => false,
            };

            if crosses_company_boundary {
                // No fields cross a company boundary without an active,
                // cross-boundary-flagged grant on the resource. When one
                // exists it stands in for the row-visibility check, which
                // by definition fails across companies.
                if !self
                    .grants
                    .has_active_cross_boundary_grant(viewer_id, resource, "read")
                    .await?
                {
                    tracing::debug!(
                        viewer = %viewer_id,
                        target = %target_id,
                        "cross-company field access denied: no cross-boundary grant"
                    );
                    return Ok(BTreeSet::new());
                }
            } else if !self
                .access
                .can_see_user_with(&org, viewer_id, target_id)
                .await?
            {
                return Ok(BTreeSet::new());
            }

            is_self = target_id == viewer_id;
            target_department = target.department_id;
            is_leader = target_department
                .map(|dept| org.leads_chain(viewer_id, dept))
                .unwrap_or(false);
        }

        let permission_names: HashSet<String> = self
            .access
            .rbac()
            .permission_names(viewer_id)
            .await?
            .into_iter()
            .collect();
        let active_grants = self.grants.active_grants(viewer_id, resource, "read").await?;

        let ctx = RuleContext {
            is_self,
            is_leader,
            has_target: target_user_id.is_some(),
            target_department,
            permission_names,
            active_grants: &active_grants,
            org: &org,
        };

        let mut visible = BTreeSet::new();
        for def in definitions {
            let allowed = match def.classification {
                Classification::Public => true,
                tier => tier_rules(tier)
                    .iter()
                    .any(|rule| rule_allows(*rule, &def.key, &ctx)),
            };
            if allowed {
                visible.insert(def.key);
            }
        }

        Ok(visible)
    }
}
