//! Role administration and effective-permission introspection.
//!
//! Role replacement is the one mutation here and carries its own gate:
//! touching a high-privilege role requires a super-admin caller, which is
//! enforced inside the RBAC service rather than this handler.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::db::row_parsers::{db_permission_from_row, db_role_from_row};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::rbac::{
    EffectivePermissions, Permission, Role, SetUserRolesRequest, UserRoleAssignment,
};

/// List all roles
#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    responses((status = 200, description = "List of roles", body = [Role])),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(State(state): State<AppState>, _auth: AuthUser) -> AppResult<Json<Vec<Role>>> {
    let rows = sqlx::query(
        "SELECT id, name, description, is_system, created_at, updated_at FROM roles ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    let roles = rows
        .iter()
        .map(|row| db_role_from_row(row).map(Role::from))
        .collect::<AppResult<Vec<Role>>>()?;
    Ok(Json(roles))
}

/// List the permission catalog
#[utoipa::path(
    get,
    path = "/rbac/permissions",
    tag = "RBAC",
    responses((status = 200, description = "List of permissions", body = [Permission])),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> AppResult<Json<Vec<Permission>>> {
    let rows = sqlx::query(
        "SELECT id, resource, action, description, created_at, updated_at FROM permissions ORDER BY resource, action",
    )
    .fetch_all(&state.pool)
    .await?;

    let permissions = rows
        .iter()
        .map(|row| db_permission_from_row(row).map(Permission::from))
        .collect::<AppResult<Vec<Permission>>>()?;
    Ok(Json(permissions))
}

/// Replace a user's role assignments
#[utoipa::path(
    put,
    path = "/users/{id}/roles",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = SetUserRolesRequest,
    responses(
        (status = 200, description = "Roles replaced", body = UserRoleAssignment),
        (status = 403, description = "High-privilege roles require a super-admin caller"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn set_user_roles(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<SetUserRolesRequest>,
) -> AppResult<Json<UserRoleAssignment>> {
    let user_exists = sqlx::query("SELECT 1 AS present FROM users WHERE id = ? AND deleted_at IS NULL")
        .bind(id.to_string())
        .fetch_optional(&state.pool)
        .await?
        .is_some();
    if !user_exists {
        return Err(AppError::not_found("user not found"));
    }

    let roles = state.rbac().set_user_roles(auth.user_id, id, &req.roles).await?;

    let assignment = UserRoleAssignment { user_id: id, roles };
    log_activity(&state.event_bus, "updated", Some(auth.user_id), &assignment);

    Ok(Json(assignment))
}

/// Get computed role and permission names for a user
#[utoipa::path(
    get,
    path = "/users/{id}/effective-permissions",
    tag = "RBAC",
    params(("id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "Effective permissions", body = EffectivePermissions)),
    security(("bearerAuth" = []))
)]
pub async fn get_effective_permissions(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EffectivePermissions>> {
    let rbac = state.rbac();
    let roles = rbac.role_names(id).await?;
    let permissions = rbac.permission_names(id).await?;

    Ok(Json(EffectivePermissions {
        user_id: id,
        roles,
        permissions,
    }))
}
