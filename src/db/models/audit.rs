//! Audit log models for tracking administrative actions.

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub resource_name: Option<String>,
    pub user_id: Option<i64>,
    pub ip_address: Option<String>,
    pub details: Option<String>,
    pub created_at: String,
}

/// Response for listing audit logs with pagination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogListResponse {
    pub items: Vec<AuditLog>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// Query parameters for filtering audit logs
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditLogQuery {
    /// Filter by action (e.g., "suggestion.approve")
    pub action: Option<String>,
    /// Filter by resource type (e.g., "prayer", "user")
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub user_id: Option<i64>,
    /// Start date for filtering (RFC 3339)
    pub start_date: Option<String>,
    /// End date for filtering (RFC 3339)
    pub end_date: Option<String>,
    /// Page number (1-indexed, defaults to 1)
    pub page: Option<i64>,
    /// Items per page (defaults to 50, max 100)
    pub per_page: Option<i64>,
}

pub mod actions {
    pub const AUTH_LOGIN: &str = "auth.login";
    pub const AUTH_PASSWORD_RESET: &str = "auth.password_reset";

    pub const PRAYER_UPDATE: &str = "prayer.update";
    pub const PRAYER_STATUS: &str = "prayer.status";
    pub const PRAYER_DELETE: &str = "prayer.delete";
    pub const PRAYER_IMPORT: &str = "prayer.import";

    pub const SUGGESTION_APPROVE: &str = "suggestion.approve";
    pub const SUGGESTION_REJECT: &str = "suggestion.reject";

    pub const USER_CREATE: &str = "user.create";
    pub const USER_ROLE_CHANGE: &str = "user.role_change";
    pub const USER_STATUS_CHANGE: &str = "user.status_change";
}

pub mod resource_types {
    pub const PRAYER: &str = "prayer";
    pub const SUGGESTION: &str = "suggestion";
    pub const USER: &str = "user";
    pub const IMPORT: &str = "import";
}

/// Fields of one audit entry
#[derive(Debug, Clone, Default)]
pub struct AuditEntry<'a> {
    pub action: &'a str,
    pub resource_type: &'a str,
    pub resource_id: Option<String>,
    pub resource_name: Option<&'a str>,
    pub user_id: Option<i64>,
    pub ip_address: Option<&'a str>,
    pub details: Option<serde_json::Value>,
}

/// Log an audit event to the database
pub async fn log_audit(db: &SqlitePool, entry: &AuditEntry<'_>) -> Result<(), sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = crate::db::timestamp(chrono::Utc::now());
    let details_json = entry.details.as_ref().map(|d| d.to_string());

    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, action, resource_type, resource_id, resource_name, user_id, ip_address, details, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(entry.action)
    .bind(entry.resource_type)
    .bind(&entry.resource_id)
    .bind(entry.resource_name)
    .bind(entry.user_id)
    .bind(entry.ip_address)
    .bind(&details_json)
    .bind(&now)
    .execute(db)
    .await?;

    tracing::debug!(
        action = entry.action,
        resource_type = entry.resource_type,
        resource_id = entry.resource_id.as_deref(),
        user_id = entry.user_id,
        "Audit log recorded"
    );

    Ok(())
}

/// Record an audit entry; failures are logged and never fail the caller
pub async fn record_audit(db: &SqlitePool, entry: AuditEntry<'_>) {
    if let Err(e) = log_audit(db, &entry).await {
        tracing::warn!(
            action = entry.action,
            resource_type = entry.resource_type,
            error = %e,
            "Failed to create audit log entry"
        );
    }
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, query: &'a AuditLogQuery) {
    builder.push(" WHERE 1 = 1");

    if let Some(action) = &query.action {
        builder.push(" AND action = ").push_bind(action);
    }
    if let Some(resource_type) = &query.resource_type {
        builder.push(" AND resource_type = ").push_bind(resource_type);
    }
    if let Some(resource_id) = &query.resource_id {
        builder.push(" AND resource_id = ").push_bind(resource_id);
    }
    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(start_date) = &query.start_date {
        builder.push(" AND created_at >= ").push_bind(start_date);
    }
    if let Some(end_date) = &query.end_date {
        builder.push(" AND created_at <= ").push_bind(end_date);
    }
}

/// List audit logs with filtering and pagination
pub async fn list_audit_logs(
    db: &SqlitePool,
    query: &AuditLogQuery,
) -> Result<AuditLogListResponse, sqlx::Error> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(50).clamp(1, 100);
    let offset = (page - 1) * per_page;

    let mut count_query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM audit_logs");
    push_filters(&mut count_query, query);
    let total: i64 = count_query.build_query_scalar().fetch_one(db).await?;

    let mut list_query: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, action, resource_type, resource_id, resource_name, user_id, ip_address, details, created_at FROM audit_logs",
    );
    push_filters(&mut list_query, query);
    list_query
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(per_page)
        .push(" OFFSET ")
        .push_bind(offset);

    let items: Vec<AuditLog> = list_query.build_query_as().fetch_all(db).await?;

    let total_pages = (total + per_page - 1) / per_page;

    Ok(AuditLogListResponse {
        items,
        total,
        page,
        per_page,
        total_pages,
    })
}
