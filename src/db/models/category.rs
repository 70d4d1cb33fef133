//! Prayer categories.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PrayerCategory {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub color: String,
    pub icon: String,
    pub sort_order: i64,
    pub is_active: bool,
    pub created_at: String,
}

impl PrayerCategory {
    pub async fn list_active(db: &SqlitePool) -> Result<Vec<PrayerCategory>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, name, description, color, icon, sort_order, is_active, created_at
            FROM prayer_categories
            WHERE is_active = 1
            ORDER BY sort_order, name
            "#,
        )
        .fetch_all(db)
        .await
    }
}

/// Number of visible requests in a category
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CategoryCount {
    pub category: String,
    pub total: i64,
    pub active: i64,
    pub answered: i64,
}
