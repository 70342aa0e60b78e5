use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::acl::permissions;
use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::grant::{GrantCreateRequest, TemporaryAccessGrant};

use super::require_permission;

#[utoipa::path(
    get,
    path = "/grants",
    tag = "Grants",
    responses((status = 200, description = "All grants, newest first", body = [TemporaryAccessGrant])),
    security(("bearerAuth" = []))
)]
pub async fn list_grants(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<TemporaryAccessGrant>>> {
    require_permission(&state, auth.user_id, permissions::GRANT_MANAGE).await?;

    let grants = state.grants().list().await?;
    Ok(Json(grants))
}

#[utoipa::path(
    post,
    path = "/grants",
    tag = "Grants",
    request_body = GrantCreateRequest,
    responses(
        (status = 201, description = "Grant created", body = TemporaryAccessGrant),
        (status = 400, description = "end_at precedes start_at"),
        (status = 403, description = "Caller may not manage grants"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_grant(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<GrantCreateRequest>,
) -> AppResult<(StatusCode, Json<TemporaryAccessGrant>)> {
    require_permission(&state, auth.user_id, permissions::GRANT_MANAGE).await?;

    let grant = state.grants().create(&req, auth.user_id).await?;
    log_activity(&state.event_bus, "created", Some(auth.user_id), &grant);

    Ok((StatusCode::CREATED, Json(grant)))
}

/// Revoke a grant. The row survives with `revoked_at` stamped so the
/// audit trail keeps the full history.
#[utoipa::path(
    delete,
    path = "/grants/{id}",
    tag = "Grants",
    params(("id" = Uuid, Path, description = "Grant id")),
    responses(
        (status = 200, description = "Grant revoked", body = TemporaryAccessGrant),
        (status = 404, description = "No such grant"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_grant(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TemporaryAccessGrant>> {
    require_permission(&state, auth.user_id, permissions::GRANT_MANAGE).await?;

    let grant = state.grants().revoke(id).await?;
    log_activity(&state.event_bus, "revoked", Some(auth.user_id), &grant);

    Ok(Json(grant))
}
