//! Read-side aggregations and exports.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::PrayerService;
use crate::db::{timestamp, CategoryCount, PrayerRequest, PrayerStatus};
use crate::{Error, Result};

/// A request in the recent-activity feed with its suggestion counts
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActivityEntry {
    pub id: i64,
    pub title: String,
    pub category: String,
    pub status: PrayerStatus,
    pub is_private: bool,
    pub requester_name: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_activity: String,
    pub pending_count: i64,
    pub approved_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, FromRow)]
pub struct DashboardSummary {
    pub active: i64,
    pub answered: i64,
    pub archived: i64,
    pub private: i64,
    pub pending_suggestions: i64,
}

/// An active request flattened for export, with the text of every approved
/// update, newest review first
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub requester_name: String,
    pub category: String,
    pub is_private: bool,
    pub created_at: String,
    pub updated_at: String,
    pub approved_updates: Vec<String>,
}

#[derive(FromRow)]
struct ApprovedText {
    prayer_request_id: i64,
    suggested_content: String,
}

impl PrayerService {
    /// Request counts per category over non-archived requests, in category
    /// priority order
    pub async fn category_stats(&self) -> Result<Vec<CategoryCount>> {
        let mut counts: Vec<CategoryCount> = sqlx::query_as(
            r#"
            SELECT category,
                   COUNT(*) AS total,
                   SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END) AS active,
                   SUM(CASE WHEN status = 'answered' THEN 1 ELSE 0 END) AS answered
            FROM prayer_requests
            WHERE status != 'archived'
            GROUP BY category
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        counts.sort_by(|a, b| {
            self.config
                .category_rank(&a.category)
                .cmp(&self.config.category_rank(&b.category))
                .then_with(|| a.category.cmp(&b.category))
        });
        Ok(counts)
    }

    /// Most recently created or updated requests first
    pub async fn recent_activity(&self, limit: i64) -> Result<Vec<ActivityEntry>> {
        let entries = sqlx::query_as(
            r#"
            SELECT pr.id, pr.title, pr.category, pr.status, pr.is_private, pr.requester_name,
                   pr.created_at, pr.updated_at,
                   MAX(pr.created_at, pr.updated_at) AS last_activity,
                   (SELECT COUNT(*) FROM suggested_updates su
                     WHERE su.prayer_request_id = pr.id AND su.status = 'pending') AS pending_count,
                   (SELECT COUNT(*) FROM suggested_updates su
                     WHERE su.prayer_request_id = pr.id AND su.status = 'approved') AS approved_count
            FROM prayer_requests pr
            WHERE pr.status != 'archived'
            ORDER BY last_activity DESC, pr.id DESC
            LIMIT ?
            "#,
        )
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }

    /// Active requests not updated within `threshold_days`, oldest first
    pub async fn stale_requests(
        &self,
        threshold_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<PrayerRequest>> {
        if threshold_days < 0 {
            return Err(Error::validation("days", "Threshold must not be negative"));
        }
        let cutoff = Duration::try_days(threshold_days)
            .and_then(|age| now.checked_sub_signed(age))
            .ok_or_else(|| Error::validation("days", "Threshold is out of range"))?;
        let cutoff = timestamp(cutoff);
        Ok(PrayerRequest::list_stale(&self.db, &cutoff).await?)
    }

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let summary = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0) AS active,
                COALESCE(SUM(CASE WHEN status = 'answered' THEN 1 ELSE 0 END), 0) AS answered,
                COALESCE(SUM(CASE WHEN status = 'archived' THEN 1 ELSE 0 END), 0) AS archived,
                COALESCE(SUM(CASE WHEN is_private = 1 AND status != 'archived' THEN 1 ELSE 0 END), 0) AS private,
                (SELECT COUNT(*) FROM suggested_updates WHERE status = 'pending') AS pending_suggestions
            FROM prayer_requests
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        Ok(summary)
    }

    /// Active requests with their approved update texts, in listing order
    pub async fn export_rows(&self) -> Result<Vec<ExportRow>> {
        let mut prayers: Vec<PrayerRequest> = sqlx::query_as(
            r#"
            SELECT id, title, content, requester_name, requester_email, submitted_by,
                   category, status, is_private, created_at, updated_at
            FROM prayer_requests
            WHERE status = 'active'
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        prayers.sort_by(|a, b| {
            self.config
                .category_rank(&a.category)
                .cmp(&self.config.category_rank(&b.category))
                .then_with(|| b.last_activity().cmp(a.last_activity()))
                .then_with(|| b.id.cmp(&a.id))
        });

        let approved: Vec<ApprovedText> = sqlx::query_as(
            r#"
            SELECT su.prayer_request_id, su.suggested_content
            FROM suggested_updates su
            JOIN prayer_requests pr ON pr.id = su.prayer_request_id
            WHERE su.status = 'approved' AND pr.status = 'active'
            ORDER BY su.reviewed_at DESC, su.id DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut updates: HashMap<i64, Vec<String>> = HashMap::new();
        for row in approved {
            updates
                .entry(row.prayer_request_id)
                .or_default()
                .push(row.suggested_content);
        }

        Ok(prayers
            .into_iter()
            .map(|p| ExportRow {
                approved_updates: updates.remove(&p.id).unwrap_or_default(),
                id: p.id,
                title: p.title,
                content: p.content,
                requester_name: p.requester_name,
                category: p.category,
                is_private: p.is_private,
                created_at: p.created_at,
                updated_at: p.updated_at,
            })
            .collect())
    }
}

/// Flatten export rows into CSV; approved updates share one cell
pub fn render_csv(rows: &[ExportRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |e: csv::Error| Error::Internal(format!("CSV export failed: {}", e));

    writer
        .write_record([
            "id",
            "title",
            "content",
            "requester_name",
            "category",
            "private",
            "created_at",
            "updated_at",
            "approved_updates",
        ])
        .map_err(csv_err)?;

    for row in rows {
        let id = row.id.to_string();
        let updates = row.approved_updates.join(" | ");
        writer
            .write_record([
                id.as_str(),
                row.title.as_str(),
                row.content.as_str(),
                row.requester_name.as_str(),
                row.category.as_str(),
                if row.is_private { "yes" } else { "no" },
                row.created_at.as_str(),
                row.updated_at.as_str(),
                updates.as_str(),
            ])
            .map_err(csv_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("CSV export failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Internal(format!("CSV export failed: {}", e)))
}

/// Plain-text prayer list grouped by category, for printing
pub fn render_print(rows: &[ExportRow], generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "PRAYER LIST");
    let _ = writeln!(out, "Generated {}", generated_at.format("%B %-d, %Y %H:%M UTC"));
    let _ = writeln!(out, "{} active requests", rows.len());

    let mut current_category: Option<&str> = None;
    for row in rows {
        if current_category != Some(row.category.as_str()) {
            current_category = Some(row.category.as_str());
            let _ = writeln!(out);
            let _ = writeln!(out, "== {} ==", row.category);
        }

        let _ = writeln!(out);
        let private = if row.is_private { " (private)" } else { "" };
        let _ = writeln!(out, "* {}{}", row.title, private);
        let _ = writeln!(out, "  For: {}", row.requester_name);
        for line in row.content.lines() {
            let _ = writeln!(out, "  {}", line);
        }
        for update in &row.approved_updates {
            let _ = writeln!(out, "  Update: {}", update);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{at, user_with_role};
    use crate::db::{PrayerRequestForm, Role};
    use crate::engine::test_support::service;

    fn form(title: &str, category: &str) -> PrayerRequestForm {
        PrayerRequestForm {
            title: title.to_string(),
            content: format!("{} content", title),
            requester_name: "Jo".to_string(),
            requester_email: None,
            category: category.to_string(),
            is_private: false,
        }
    }

    #[tokio::test]
    async fn test_category_stats_and_summary() {
        let db = crate::db::connect_memory().await.unwrap();
        let prayers = service(&db);
        let alice = user_with_role(&db, "alice", Role::Member).await;
        let t = at("2026-08-01T00:00:00Z");

        let a = prayers.create_prayer_request(form("A", "Healing"), None, t).await.unwrap();
        prayers.create_prayer_request(form("B", "Healing"), None, t).await.unwrap();
        prayers.create_prayer_request(form("C", "Praise Report"), None, t).await.unwrap();
        let d = prayers.create_prayer_request(form("D", "Family"), None, t).await.unwrap();
        let mut private = form("E", "Family");
        private.is_private = true;
        prayers.create_prayer_request(private, Some(&alice), t).await.unwrap();

        prayers.update_prayer_status(a, PrayerStatus::Answered, t).await.unwrap();
        prayers.update_prayer_status(d, PrayerStatus::Archived, t).await.unwrap();
        prayers.create_suggested_update(a, "Update", &alice, t).await.unwrap();

        let stats = prayers.category_stats().await.unwrap();
        let names: Vec<&str> = stats.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, vec!["Praise Report", "Healing", "Family"]);
        assert_eq!(stats[1].total, 2);
        assert_eq!(stats[1].active, 1);
        assert_eq!(stats[1].answered, 1);
        assert_eq!(stats[2].total, 1);

        let summary = prayers.dashboard_summary().await.unwrap();
        assert_eq!(summary.active, 3);
        assert_eq!(summary.answered, 1);
        assert_eq!(summary.archived, 1);
        assert_eq!(summary.private, 1);
        assert_eq!(summary.pending_suggestions, 1);
    }

    #[tokio::test]
    async fn test_empty_summary_is_zero() {
        let db = crate::db::connect_memory().await.unwrap();
        let summary = service(&db).dashboard_summary().await.unwrap();
        assert_eq!(summary.active, 0);
        assert_eq!(summary.pending_suggestions, 0);
    }

    #[tokio::test]
    async fn test_recent_activity_counts_suggestions() {
        let db = crate::db::connect_memory().await.unwrap();
        let prayers = service(&db);
        let alice = user_with_role(&db, "alice", Role::Member).await;
        let admin = user_with_role(&db, "carol", Role::Admin).await;
        let t = at("2026-08-01T00:00:00Z");

        let old = prayers.create_prayer_request(form("Old", "General"), None, t).await.unwrap();
        let new = prayers
            .create_prayer_request(form("New", "General"), None, t + Duration::days(1))
            .await
            .unwrap();

        let s1 = prayers.create_suggested_update(old, "One", &alice, t).await.unwrap();
        prayers.create_suggested_update(old, "Two", &alice, t).await.unwrap();
        prayers
            .approve_suggested_update(s1, &admin, None, t + Duration::days(2))
            .await
            .unwrap();

        let feed = prayers.recent_activity(10).await.unwrap();
        assert_eq!(feed.iter().map(|e| e.id).collect::<Vec<_>>(), vec![old, new]);
        assert_eq!(feed[0].pending_count, 1);
        assert_eq!(feed[0].approved_count, 1);
        assert_eq!(feed[1].pending_count, 0);

        assert_eq!(prayers.recent_activity(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_requests() {
        let db = crate::db::connect_memory().await.unwrap();
        let prayers = service(&db);
        let now = at("2026-08-31T00:00:00Z");

        let stale = prayers
            .create_prayer_request(form("Stale", "General"), None, now - Duration::days(45))
            .await
            .unwrap();
        let answered = prayers
            .create_prayer_request(form("Answered", "General"), None, now - Duration::days(45))
            .await
            .unwrap();
        prayers
            .update_prayer_status(answered, PrayerStatus::Answered, now - Duration::days(40))
            .await
            .unwrap();
        prayers
            .create_prayer_request(form("Fresh", "General"), None, now - Duration::days(3))
            .await
            .unwrap();

        let found = prayers.stale_requests(30, now).await.unwrap();
        assert_eq!(found.iter().map(|p| p.id).collect::<Vec<_>>(), vec![stale]);

        assert_eq!(prayers.stale_requests(0, now).await.unwrap().len(), 2);
        assert!(prayers.stale_requests(-1, now).await.is_err());
    }

    #[tokio::test]
    async fn test_stale_requests_rejects_huge_threshold() {
        let db = crate::db::connect_memory().await.unwrap();
        let prayers = service(&db);
        let now = at("2026-08-31T00:00:00Z");

        for days in [100_000_000, i64::MAX] {
            let err = prayers.stale_requests(days, now).await.unwrap_err();
            assert!(matches!(err, Error::Validation { field: "days", .. }));
        }
    }

    #[tokio::test]
    async fn test_export_includes_approved_updates() {
        let db = crate::db::connect_memory().await.unwrap();
        let prayers = service(&db);
        let alice = user_with_role(&db, "alice", Role::Member).await;
        let admin = user_with_role(&db, "carol", Role::Admin).await;
        let t = at("2026-08-01T00:00:00Z");

        let id = prayers
            .create_prayer_request(form("Surgery, Tuesday", "Healing"), None, t)
            .await
            .unwrap();
        let archived = prayers
            .create_prayer_request(form("Gone", "Healing"), None, t)
            .await
            .unwrap();
        prayers
            .update_prayer_status(archived, PrayerStatus::Archived, t)
            .await
            .unwrap();

        let first = prayers.create_suggested_update(id, "Went well", &alice, t).await.unwrap();
        let second = prayers
            .create_suggested_update(id, "Home now", &alice, t)
            .await
            .unwrap();
        prayers
            .approve_suggested_update(first, &admin, None, t + Duration::hours(1))
            .await
            .unwrap();
        prayers
            .approve_suggested_update(second, &admin, None, t + Duration::hours(2))
            .await
            .unwrap();

        let rows = prayers.export_rows().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].approved_updates, vec!["Home now", "Went well"]);

        let csv = render_csv(&rows).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("id,title,content,requester_name,category,private,created_at,updated_at,approved_updates")
        );
        let data = lines.next().unwrap();
        assert!(data.contains("\"Surgery, Tuesday\""));
        assert!(data.contains("Home now | Went well"));

        let print = render_print(&rows, t);
        assert!(print.starts_with("PRAYER LIST\n"));
        assert!(print.contains("== Healing =="));
        assert!(print.contains("* Surgery, Tuesday"));
        assert!(print.contains("  Update: Home now"));
    }
}
