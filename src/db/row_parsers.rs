//! Manual row parsers for structs carrying uuid columns. Uuids are stored
//! as TEXT; sqlite's uuid decode expects blobs, so every uuid column goes
//! through `try_get::<String>` plus `Uuid::parse_str`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::department::DbDepartment;
use crate::models::rbac::{DbPermission, DbRole};
use crate::models::user::DbUser;

pub fn parse_uuid(s: &str) -> AppResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))
}

pub fn parse_opt_uuid(s: Option<String>) -> AppResult<Option<Uuid>> {
    match s {
        Some(s) if !s.trim().is_empty() => parse_uuid(&s).map(Some),
        _ => Ok(None),
    }
}

pub fn db_user_from_row(row: &SqliteRow) -> AppResult<DbUser> {
    let id: String = row.try_get("id")?;
    let company_id: Option<String> = row.try_get("company_id")?;
    let department_id: Option<String> = row.try_get("department_id")?;

    Ok(DbUser {
        id: parse_uuid(&id)?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        company_id: parse_opt_uuid(company_id)?,
        department_id: parse_opt_uuid(department_id)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        deleted_at: row.try_get::<Option<DateTime<Utc>>, _>("deleted_at")?,
    })
}

pub fn db_department_from_row(row: &SqliteRow) -> AppResult<DbDepartment> {
    let id: String = row.try_get("id")?;
    let parent_id: Option<String> = row.try_get("parent_id")?;
    let company_id: String = row.try_get("company_id")?;

    Ok(DbDepartment {
        id: parse_uuid(&id)?,
        name: row.try_get("name")?,
        parent_id: parse_opt_uuid(parent_id)?,
        company_id: parse_uuid(&company_id)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

pub fn db_role_from_row(row: &SqliteRow) -> AppResult<DbRole> {
    let id: String = row.try_get("id")?;

    Ok(DbRole {
        id: parse_uuid(&id)?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        is_system: row.try_get("is_system")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

pub fn db_permission_from_row(row: &SqliteRow) -> AppResult<DbPermission> {
    let id: String = row.try_get("id")?;

    Ok(DbPermission {
        id: parse_uuid(&id)?,
        resource: row.try_get("resource")?,
        action: row.try_get("action")?,
        description: row.try_get("description")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn setup_pool() -> SqlitePool {
        SqlitePool::connect("sqlite::memory:").await.expect("connect")
    }

    #[tokio::test]
    async fn parse_user_row_text_uuid() {
        let pool = setup_pool().await;
        sqlx::query(
            "CREATE TABLE users (id TEXT, name TEXT, email TEXT, company_id TEXT, department_id TEXT, created_at TEXT, updated_at TEXT, deleted_at TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let id = Uuid::new_v4();
        let company_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query("INSERT INTO users VALUES (?, ?, ?, ?, ?, ?, ?, ?)")
            .bind(id.to_string())
            .bind("Ada")
            .bind("ada@example.com")
            .bind(company_id.to_string())
            .bind(Option::<String>::None)
            .bind(now)
            .bind(now)
            .bind(Option::<String>::None)
            .execute(&pool)
            .await
            .unwrap();

        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();

        let parsed = db_user_from_row(&row).expect("parse");
        assert_eq!(parsed.id, id);
        assert_eq!(parsed.company_id, Some(company_id));
        assert_eq!(parsed.department_id, None);
        assert!(parsed.deleted_at.is_none());
    }

    #[test]
    fn empty_string_uuid_columns_read_as_none() {
        assert_eq!(parse_opt_uuid(Some(String::new())).unwrap(), None);
        assert_eq!(parse_opt_uuid(None).unwrap(), None);
        assert!(parse_opt_uuid(Some("garbage".into())).is_err());
    }
}
