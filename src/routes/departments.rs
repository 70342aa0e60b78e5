use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::acl::permissions;
use crate::app::AppState;
use crate::db::row_parsers::db_department_from_row;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::jwt::AuthUser;
use crate::models::department::{Department, DepartmentCreateRequest, UpdateLeadersRequest};

use super::require_permission;

#[utoipa::path(
    get,
    path = "/departments",
    tag = "Departments",
    responses((status = 200, description = "All departments with leaders", body = [Department])),
    security(("bearerAuth" = []))
)]
pub async fn list_departments(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> AppResult<Json<Vec<Department>>> {
    let dept_rows = sqlx::query(
        "SELECT id, name, parent_id, company_id, created_at, updated_at FROM departments ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;
    let departments = dept_rows
        .iter()
        .map(db_department_from_row)
        .collect::<AppResult<Vec<_>>>()?;

    let leader_rows = sqlx::query("SELECT department_id, user_id FROM department_leaders")
        .fetch_all(&state.pool)
        .await?;

    let mut leaders: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for row in &leader_rows {
        let dept = parse_uuid(row.try_get("department_id")?)?;
        let user = parse_uuid(row.try_get("user_id")?)?;
        leaders.entry(dept).or_default().push(user);
    }

    let departments = departments
        .into_iter()
        .map(|d| {
            let leader_ids = leaders.remove(&d.id).unwrap_or_default();
            d.with_leaders(leader_ids)
        })
        .collect();

    Ok(Json(departments))
}

#[utoipa::path(
    post,
    path = "/departments",
    tag = "Departments",
    request_body = DepartmentCreateRequest,
    responses(
        (status = 201, description = "Department created", body = Department),
        (status = 403, description = "Caller may not manage departments"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_department(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<DepartmentCreateRequest>,
) -> AppResult<(StatusCode, Json<Department>)> {
    require_permission(&state, auth.user_id, permissions::DEPARTMENT_MANAGE).await?;

    if let Some(parent_id) = req.parent_id {
        let parent = sqlx::query("SELECT 1 AS present FROM departments WHERE id = ?")
            .bind(parent_id.to_string())
            .fetch_optional(&state.pool)
            .await?;
        if parent.is_none() {
            return Err(AppError::not_found("parent department not found"));
        }
    }

    let now = Utc::now();
    let department = Department {
        id: Uuid::new_v4(),
        name: req.name,
        parent_id: req.parent_id,
        company_id: req.company_id,
        leader_user_ids: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO departments (id, name, parent_id, company_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(department.id.to_string())
    .bind(&department.name)
    .bind(department.parent_id.map(|id| id.to_string()))
    .bind(department.company_id.to_string())
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    log_activity(&state.event_bus, "created", Some(auth.user_id), &department);

    Ok((StatusCode::CREATED, Json(department)))
}

/// Replace a department's leader set wholesale. Leader ids are weak
/// references, so no existence check against the user table is made.
#[utoipa::path(
    put,
    path = "/departments/{id}/leaders",
    tag = "Departments",
    params(("id" = Uuid, Path, description = "Department id")),
    request_body = UpdateLeadersRequest,
    responses(
        (status = 200, description = "Leaders replaced", body = Department),
        (status = 404, description = "Department not found"),
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_leaders(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLeadersRequest>,
) -> AppResult<Json<Department>> {
    require_permission(&state, auth.user_id, permissions::DEPARTMENT_MANAGE).await?;

    let row = sqlx::query(
        "SELECT id, name, parent_id, company_id, created_at, updated_at FROM departments WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("department not found"))?;
    let department = db_department_from_row(&row)?;

    let now = Utc::now();
    let mut tx = state.pool.begin().await?;

    sqlx::query("DELETE FROM department_leaders WHERE department_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

    for user_id in &req.leader_user_ids {
        sqlx::query(
            "INSERT OR IGNORE INTO department_leaders (department_id, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let department = department.with_leaders(req.leader_user_ids);
    log_activity(&state.event_bus, "updated", Some(auth.user_id), &department);

    Ok(Json(department))
}

fn parse_uuid(value: String) -> AppResult<Uuid> {
    Uuid::parse_str(&value).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))
}
