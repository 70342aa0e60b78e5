use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::errors::{AppError, AppResult};
use crate::models::field::{Classification, FieldDefinition};

/// Read-mostly catalog of data fields and their sensitivity tiers. The
/// visibility resolver trusts this completely: a field absent from the
/// registry is never returned as visible.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    pool: SqlitePool,
}

impl FieldRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_all(&self) -> AppResult<Vec<FieldDefinition>> {
        let rows = sqlx::query(
            "SELECT key, label, classification, self_editable, created_at, updated_at FROM field_definitions ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(field_from_row).collect()
    }

    pub async fn get(&self, key: &str) -> AppResult<Option<FieldDefinition>> {
        let row = sqlx::query(
            "SELECT key, label, classification, self_editable, created_at, updated_at FROM field_definitions WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(field_from_row).transpose()
    }

    /// Insert or update; returns the definition and whether it was new.
    pub async fn upsert(
        &self,
        key: &str,
        label: &str,
        classification: Classification,
        self_editable: bool,
    ) -> AppResult<(FieldDefinition, bool)> {
        let existing = self.get(key).await?;
        let now = Utc::now();
        let created = existing.is_none();

        sqlx::query(
            r#"
            INSERT INTO field_definitions (key, label, classification, self_editable, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET
                label = excluded.label,
                classification = excluded.classification,
                self_editable = excluded.self_editable,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(label)
        .bind(classification.as_str())
        .bind(self_editable)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let definition = FieldDefinition {
            key: key.to_string(),
            label: label.to_string(),
            classification,
            self_editable,
            created_at: existing.map(|e| e.created_at).unwrap_or(now),
            updated_at: now,
        };

        Ok((definition, created))
    }

    /// Remove a definition and cascade to every stored value for it.
    pub async fn delete(&self, key: &str) -> AppResult<FieldDefinition> {
        let definition = self
            .get(key)
            .await?
            .ok_or_else(|| AppError::not_found("field definition not found"))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_field_values WHERE field_key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM field_definitions WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(definition)
    }
}

fn field_from_row(row: &SqliteRow) -> AppResult<FieldDefinition> {
    let classification_str: String = row.try_get("classification")?;
    let classification = Classification::parse(&classification_str).ok_or_else(|| {
        AppError::internal(format!("unknown field classification: {}", classification_str))
    })?;

    Ok(FieldDefinition {
        key: row.try_get("key")?,
        label: row.try_get("label")?,
        classification,
        self_editable: row.try_get("self_editable")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
