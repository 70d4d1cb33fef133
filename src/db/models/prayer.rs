//! Prayer request models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PrayerStatus {
    Active,
    Answered,
    Archived,
}

impl PrayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrayerStatus::Active => "active",
            PrayerStatus::Answered => "answered",
            PrayerStatus::Archived => "archived",
        }
    }
}

impl std::str::FromStr for PrayerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(PrayerStatus::Active),
            "answered" => Ok(PrayerStatus::Answered),
            "archived" => Ok(PrayerStatus::Archived),
            _ => Err(format!("Unknown prayer status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PrayerRequest {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub requester_name: String,
    pub requester_email: Option<String>,
    /// `None` for guest submissions
    pub submitted_by: Option<i64>,
    pub category: String,
    pub status: PrayerStatus,
    pub is_private: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl PrayerRequest {
    /// Most recent of creation and last update
    pub fn last_activity(&self) -> &str {
        if self.updated_at > self.created_at {
            &self.updated_at
        } else {
            &self.created_at
        }
    }
}

/// Submission form for members and guests
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrayerRequestForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub requester_name: String,
    #[serde(default)]
    pub requester_email: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub is_private: bool,
}

/// Direct admin edit; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrayerEdit {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub is_private: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePrayerStatusRequest {
    pub status: String,
}

/// Validated row ready for insertion
pub struct NewPrayerRequest<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub requester_name: &'a str,
    pub requester_email: Option<&'a str>,
    pub submitted_by: Option<i64>,
    pub category: &'a str,
    pub is_private: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrayerListQuery {
    pub category: Option<String>,
}

const PRAYER_COLUMNS: &str = "id, title, content, requester_name, requester_email, submitted_by, \
     category, status, is_private, created_at, updated_at";

impl PrayerRequest {
    pub async fn get_by_id(db: &SqlitePool, id: i64) -> Result<Option<PrayerRequest>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM prayer_requests WHERE id = ?",
            PRAYER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn insert(
        db: &SqlitePool,
        new: &NewPrayerRequest<'_>,
        now: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO prayer_requests
                (title, content, requester_name, requester_email, submitted_by, category, status, is_private, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 'active', ?, ?, ?)
            "#,
        )
        .bind(new.title)
        .bind(new.content)
        .bind(new.requester_name)
        .bind(new.requester_email)
        .bind(new.submitted_by)
        .bind(new.category)
        .bind(new.is_private)
        .bind(now)
        .bind(now)
        .execute(db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Non-archived requests, optionally narrowed to one category.
    /// Private requests are included only when `include_private` is set.
    pub async fn list_visible(
        db: &SqlitePool,
        category: Option<&str>,
        include_private: bool,
    ) -> Result<Vec<PrayerRequest>, sqlx::Error> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM prayer_requests WHERE status != 'archived'",
            PRAYER_COLUMNS
        ));

        if !include_private {
            query.push(" AND is_private = 0");
        }

        if let Some(category) = category {
            query.push(" AND category = ").push_bind(category);
        }

        query.push(" ORDER BY id");
        query.build_query_as().fetch_all(db).await
    }

    /// Active (not answered, not archived) requests last touched before `cutoff`
    pub async fn list_stale(
        db: &SqlitePool,
        cutoff: &str,
    ) -> Result<Vec<PrayerRequest>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM prayer_requests WHERE status = 'active' AND updated_at < ? ORDER BY updated_at ASC",
            PRAYER_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(db)
        .await
    }

    pub async fn update_status(
        db: &SqlitePool,
        id: i64,
        status: PrayerStatus,
        now: &str,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("UPDATE prayer_requests SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status)
                .bind(now)
                .bind(id)
                .execute(db)
                .await?;
        Ok(result.rows_affected())
    }

    pub async fn update_fields(
        db: &SqlitePool,
        id: i64,
        edit: &PrayerEdit,
        now: &str,
    ) -> Result<u64, sqlx::Error> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE prayer_requests SET updated_at = ");
        query.push_bind(now);

        if let Some(title) = &edit.title {
            query.push(", title = ").push_bind(title.trim());
        }
        if let Some(content) = &edit.content {
            query.push(", content = ").push_bind(content.trim());
        }
        if let Some(category) = &edit.category {
            query.push(", category = ").push_bind(category.trim());
        }
        if let Some(is_private) = edit.is_private {
            query.push(", is_private = ").push_bind(is_private);
        }

        query.push(" WHERE id = ").push_bind(id);

        let result = query.build().execute(db).await?;
        Ok(result.rows_affected())
    }
}
