//! Suggested content revisions for prayer requests.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Approved => "approved",
            SuggestionStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SuggestedUpdate {
    pub id: i64,
    pub prayer_request_id: i64,
    pub suggested_by: i64,
    pub suggested_content: String,
    pub status: SuggestionStatus,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

/// Suggestion with the suggester's username, for per-prayer listings
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SuggestionWithAuthor {
    pub id: i64,
    pub prayer_request_id: i64,
    pub suggested_by: i64,
    pub suggested_by_username: String,
    pub suggested_content: String,
    pub status: SuggestionStatus,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

/// Review queue entry
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PendingSuggestion {
    pub id: i64,
    pub prayer_request_id: i64,
    pub prayer_title: String,
    pub current_content: String,
    pub suggested_content: String,
    pub suggested_by_username: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct SuggestUpdateRequest {
    #[serde(default)]
    pub suggested_content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub admin_notes: Option<String>,
}

const SUGGESTION_COLUMNS: &str = "id, prayer_request_id, suggested_by, suggested_content, status, \
     admin_notes, reviewed_by, reviewed_at, created_at";

impl SuggestedUpdate {
    pub async fn get_by_id(
        db: &SqlitePool,
        id: i64,
    ) -> Result<Option<SuggestedUpdate>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM suggested_updates WHERE id = ?",
            SUGGESTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn insert(
        db: &SqlitePool,
        prayer_request_id: i64,
        suggested_by: i64,
        content: &str,
        now: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO suggested_updates (prayer_request_id, suggested_by, suggested_content, status, created_at)
            VALUES (?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(prayer_request_id)
        .bind(suggested_by)
        .bind(content)
        .bind(now)
        .execute(db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list_for_prayer(
        db: &SqlitePool,
        prayer_request_id: i64,
    ) -> Result<Vec<SuggestionWithAuthor>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT su.id, su.prayer_request_id, su.suggested_by, u.username AS suggested_by_username,
                   su.suggested_content, su.status, su.admin_notes, su.reviewed_by, su.reviewed_at,
                   su.created_at
            FROM suggested_updates su
            JOIN users u ON su.suggested_by = u.id
            WHERE su.prayer_request_id = ?
            ORDER BY su.created_at DESC, su.id DESC
            "#,
        )
        .bind(prayer_request_id)
        .fetch_all(db)
        .await
    }

    pub async fn list_pending(db: &SqlitePool) -> Result<Vec<PendingSuggestion>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT su.id, su.prayer_request_id, pr.title AS prayer_title, pr.content AS current_content,
                   su.suggested_content, u.username AS suggested_by_username, su.created_at
            FROM suggested_updates su
            JOIN prayer_requests pr ON su.prayer_request_id = pr.id
            JOIN users u ON su.suggested_by = u.id
            WHERE su.status = 'pending'
            ORDER BY su.created_at ASC, su.id ASC
            "#,
        )
        .fetch_all(db)
        .await
    }
}
