//! Bulk import audit records.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ImportLog {
    pub id: i64,
    pub imported_by: i64,
    pub filename: Option<String>,
    pub success_count: i64,
    pub failed_count: i64,
    /// JSON array of row error messages, possibly truncated
    pub errors: String,
    pub created_at: String,
}

impl ImportLog {
    pub fn error_list(&self) -> Vec<String> {
        serde_json::from_str(&self.errors).unwrap_or_default()
    }

    pub async fn insert(
        db: &SqlitePool,
        imported_by: i64,
        filename: Option<&str>,
        success_count: i64,
        failed_count: i64,
        errors: &[String],
        now: &str,
    ) -> Result<i64, sqlx::Error> {
        let errors_json = serde_json::to_string(errors).unwrap_or_else(|_| "[]".to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO import_logs (imported_by, filename, success_count, failed_count, errors, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(imported_by)
        .bind(filename)
        .bind(success_count)
        .bind(failed_count)
        .bind(&errors_json)
        .bind(now)
        .execute(db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_id(db: &SqlitePool, id: i64) -> Result<Option<ImportLog>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, imported_by, filename, success_count, failed_count, errors, created_at FROM import_logs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn list_recent(db: &SqlitePool, limit: i64) -> Result<Vec<ImportLog>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, imported_by, filename, success_count, failed_count, errors, created_at
            FROM import_logs
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(db)
        .await
    }
}
