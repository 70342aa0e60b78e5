#![allow(dead_code)]

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use peoplecore::jwt::JwtConfig;

pub const TEST_SECRET: &str = "test-secret";

/// Temp-file sqlite pool with migrations applied. The TempDir must stay
/// alive for the duration of the test.
pub async fn setup_pool() -> Result<(TempDir, SqlitePool)> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", TEST_SECRET);

    Ok((dir, pool))
}

pub fn token_for(user_id: Uuid) -> Result<String> {
    let jwt = JwtConfig::new(TEST_SECRET.as_bytes().to_vec(), 24);
    Ok(jwt.encode(user_id)?)
}

pub async fn insert_user(
    pool: &SqlitePool,
    name: &str,
    company_id: Option<Uuid>,
    department_id: Option<Uuid>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, name, email, company_id, department_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(format!("{}-{}@example.com", name.to_lowercase().replace(' ', "."), id))
    .bind(company_id.map(|c| c.to_string()))
    .bind(department_id.map(|d| d.to_string()))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn insert_department(
    pool: &SqlitePool,
    name: &str,
    parent_id: Option<Uuid>,
    company_id: Uuid,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO departments (id, name, parent_id, company_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(parent_id.map(|p| p.to_string()))
    .bind(company_id.to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn set_leader(pool: &SqlitePool, department_id: Uuid, user_id: Uuid) -> Result<()> {
    sqlx::query(
        "INSERT INTO department_leaders (department_id, user_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(department_id.to_string())
    .bind(user_id.to_string())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_role(pool: &SqlitePool, name: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO roles (id, name, description, is_system, created_at, updated_at) VALUES (?, ?, NULL, 0, ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn assign_role(pool: &SqlitePool, user_id: Uuid, role_id: Uuid) -> Result<()> {
    sqlx::query("INSERT INTO user_roles (user_id, role_id, created_at) VALUES (?, ?, ?)")
        .bind(user_id.to_string())
        .bind(role_id.to_string())
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_permission(pool: &SqlitePool, resource: &str, action: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO permissions (id, resource, action, description, created_at, updated_at) VALUES (?, ?, ?, NULL, ?, ?)",
    )
    .bind(id.to_string())
    .bind(resource)
    .bind(action)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn link_role_permission(pool: &SqlitePool, role_id: Uuid, permission_id: Uuid) -> Result<()> {
    sqlx::query("INSERT INTO role_permissions (role_id, permission_id, created_at) VALUES (?, ?, ?)")
        .bind(role_id.to_string())
        .bind(permission_id.to_string())
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(())
}

/// Create a one-off role carrying exactly one permission and hand it to
/// the user. Convenient for tests that only care about a capability.
pub async fn give_permission(
    pool: &SqlitePool,
    user_id: Uuid,
    resource: &str,
    action: &str,
) -> Result<()> {
    let role_id = insert_role(pool, &format!("test_{}_{}_{}", resource, action, Uuid::new_v4())).await?;
    let permission_id = insert_permission(pool, resource, action).await?;
    link_role_permission(pool, role_id, permission_id).await?;
    assign_role(pool, user_id, role_id).await?;
    Ok(())
}

pub async fn give_role(pool: &SqlitePool, user_id: Uuid, role_name: &str) -> Result<Uuid> {
    let role_id = insert_role(pool, role_name).await?;
    assign_role(pool, user_id, role_id).await?;
    Ok(role_id)
}

pub async fn insert_field(
    pool: &SqlitePool,
    key: &str,
    classification: &str,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO field_definitions (key, label, classification, self_editable, created_at, updated_at) VALUES (?, ?, ?, 0, ?, ?)",
    )
    .bind(key)
    .bind(key)
    .bind(classification)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// The field catalog most visibility tests run against: a key in each
/// classification tier, with the manager whitelist represented.
pub async fn seed_field_catalog(pool: &SqlitePool) -> Result<()> {
    insert_field(pool, "name", "public").await?;
    insert_field(pool, "position", "public").await?;
    insert_field(pool, "join_date", "internal").await?;
    insert_field(pool, "employee_no", "internal").await?;
    insert_field(pool, "contact_phone", "internal").await?;
    insert_field(pool, "home_address", "sensitive").await?;
    insert_field(pool, "salary", "highly_sensitive").await?;
    Ok(())
}

pub async fn set_field_value(pool: &SqlitePool, user_id: Uuid, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO user_field_values (user_id, field_key, value, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id.to_string())
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_visibility(
    pool: &SqlitePool,
    user_id: Uuid,
    hidden: bool,
    view_scope: &str,
) -> Result<()> {
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
    .bind(user_id.to_string())
    .bind(hidden)
    .bind(view_scope)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_grant(
    pool: &SqlitePool,
    grantee_id: Uuid,
    field_key: &str,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    allow_cross_boundary: bool,
    scope_department_id: Option<Uuid>,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO temporary_access_grants
            (id, grantee_id, resource, field_key, action, start_at, end_at,
             allow_cross_boundary, scope_department_id, created_by_id, created_at)
        VALUES (?, ?, 'user', ?, 'read', ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(grantee_id.to_string())
    .bind(field_key)
    .bind(start_at)
    .bind(end_at)
    .bind(allow_cross_boundary)
    .bind(scope_department_id.map(|d| d.to_string()))
    .bind(Uuid::new_v4().to_string())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(id)
}
