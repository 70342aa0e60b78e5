use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::acl::permissions;
use crate::app::AppState;
use crate::errors::AppResult;
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::field::{FieldDefinition, FieldUpsertRequest};

use super::require_permission;

#[utoipa::path(
    get,
    path = "/fields",
    tag = "Fields",
    responses((status = 200, description = "Field catalog", body = [FieldDefinition])),
    security(("bearerAuth" = []))
)]
pub async fn list_fields(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> AppResult<Json<Vec<FieldDefinition>>> {
    let fields = state.fields().list_all().await?;
    Ok(Json(fields))
}

/// Create or replace a field definition under the given key.
#[utoipa::path(
    put,
    path = "/fields/{key}",
    tag = "Fields",
    params(("key" = String, Path, description = "Field key")),
    request_body = FieldUpsertRequest,
    responses(
        (status = 200, description = "Definition updated", body = FieldDefinition),
        (status = 201, description = "Definition created", body = FieldDefinition),
        (status = 403, description = "Caller may not manage the field catalog"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn upsert_field(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(key): Path<String>,
    Json(req): Json<FieldUpsertRequest>,
) -> AppResult<(StatusCode, Json<FieldDefinition>)> {
    require_permission(&state, auth.user_id, permissions::FIELD_MANAGE).await?;

    let (definition, created) = state
        .fields()
        .upsert(&key, &req.label, req.classification, req.self_editable)
        .await?;

    let action = if created { "created" } else { "updated" };
    log_activity(&state.event_bus, action, Some(auth.user_id), &definition);

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(definition)))
}

/// Remove a definition and every stored value for it.
#[utoipa::path(
    delete,
    path = "/fields/{key}",
    tag = "Fields",
    params(("key" = String, Path, description = "Field key")),
    responses(
        (status = 200, description = "Definition deleted", body = FieldDefinition),
        (status = 404, description = "No such field"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_field(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(key): Path<String>,
) -> AppResult<Json<FieldDefinition>> {
    require_permission(&state, auth.user_id, permissions::FIELD_MANAGE).await?;

    let definition = state.fields().delete(&key).await?;
    log_activity(&state.event_bus, "deleted", Some(auth.user_id), &definition);

    Ok(Json(definition))
}
