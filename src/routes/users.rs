use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::acl::permissions;
use crate::app::AppState;
use crate::db::row_parsers::db_user_from_row;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity_with_old;
use crate::jwt::AuthUser;
use crate::models::user::{
    User, UserProfile, UserVisibility, ViewScope, VisibilityUpdateRequest,
};

use super::require_permission;

/// List users the caller may see. The ACL core hands back a declarative
/// row filter; this handler renders it into the listing query.
#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses((status = 200, description = "Users visible to the caller", body = [User])),
    security(("bearerAuth" = []))
)]
pub async fn list_users(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<User>>> {
    let filter = state.access().accessible_user_where(auth.user_id).await?;
    let (clause, binds) = filter.to_sql("u", "v");

    let sql = format!(
        r#"
        SELECT u.id, u.name, u.email, u.company_id, u.department_id,
               u.created_at, u.updated_at, u.deleted_at
        FROM users u
        LEFT JOIN user_visibility v ON v.user_id = u.id
        WHERE u.deleted_at IS NULL AND {}
        ORDER BY u.name
        "#,
        clause
    );

    let mut query = sqlx::query(&sql);
    for bind in binds {
        query = query.bind(bind);
    }

    let rows = query.fetch_all(&state.pool).await?;
    let users = rows
        .iter()
        .map(|row| db_user_from_row(row).map(User::from))
        .collect::<AppResult<Vec<User>>>()?;
    Ok(Json(users))
}

/// Field values for one user, redacted to what the caller may read.
/// An out-of-scope target reads as nonexistent.
#[utoipa::path(
    get,
    path = "/users/{id}/profile",
    tag = "Users",
    params(("id" = Uuid, Path, description = "Target user id")),
    responses(
        (status = 200, description = "Visible profile fields", body = UserProfile),
        (status = 404, description = "User not visible to the caller"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserProfile>> {
    let visible = state
        .visibility()
        .visible_field_keys(auth.user_id, "user", Some(id))
        .await?;

    if visible.is_empty() {
        return Err(AppError::not_found("user not found"));
    }

    let rows = sqlx::query("SELECT field_key, value FROM user_field_values WHERE user_id = ?")
        .bind(id.to_string())
        .fetch_all(&state.pool)
        .await?;

    let mut fields = BTreeMap::new();
    for row in rows {
        let key: String = row.try_get("field_key")?;
        if visible.contains(&key) {
            fields.insert(key, row.try_get("value")?);
        }
    }

    Ok(Json(UserProfile { user_id: id, fields }))
}

/// Upsert the target's visibility record. Fields left out of the request
/// keep their previous value, or the default on first creation.
#[utoipa::path(
    put,
    path = "/users/{id}/visibility",
    tag = "Users",
    params(("id" = Uuid, Path, description = "Target user id")),
    request_body = VisibilityUpdateRequest,
    responses(
        (status = 200, description = "Visibility updated", body = UserVisibility),
        (status = 403, description = "Caller may not manage users"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_visibility(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<VisibilityUpdateRequest>,
) -> AppResult<Json<UserVisibility>> {
    require_permission(&state, auth.user_id, permissions::USER_MANAGE).await?;

    let existing =
        sqlx::query("SELECT hidden, view_scope, updated_at FROM user_visibility WHERE user_id = ?")
        .bind(id.to_string())
        .fetch_optional(&state.pool)
        .await?;

    let previous = match &existing {
        Some(row) => {
            let scope: String = row.try_get("view_scope")?;
            Some(UserVisibility {
                user_id: id,
                hidden: row.try_get::<bool, _>("hidden")?,
                view_scope: ViewScope::parse(&scope),
                updated_at: row.try_get("updated_at")?,
            })
        }
        None => None,
    };

    let visibility = UserVisibility {
        user_id: id,
        hidden: req
            .hidden
            .unwrap_or_else(|| previous.as_ref().map(|p| p.hidden).unwrap_or(false)),
        view_scope: req
            .view_scope
            .unwrap_or_else(|| previous.as_ref().map(|p| p.view_scope).unwrap_or_default()),
        updated_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO user_visibility (user_id, hidden, view_scope, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (user_id) DO UPDATE SET
            hidden = excluded.hidden,
            view_scope = excluded.view_scope,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(id.to_string())
    .bind(visibility.hidden)
    .bind(visibility.view_scope.as_str())
    .bind(visibility.updated_at)
    .execute(&state.pool)
    .await?;

    log_activity_with_old(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &visibility,
        previous.as_ref(),
    );

    Ok(Json(visibility))
}
