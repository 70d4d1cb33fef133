//! Admin panel endpoints: prayer management, bulk import, export and reports.

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{
    actions, record_audit, resource_types, AuditEntry, CategoryCount, ImportLog, PrayerEdit,
    PrayerRequest, PrayerStatus, UpdatePrayerStatusRequest,
};
use crate::engine::{parse_csv, render_csv, render_print, ActivityEntry, DashboardSummary, ImportResult};
use crate::AppState;

use super::error::ApiError;
use super::guards::CurrentUser;
use super::rate_limit::ClientIp;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StaleQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    /// Name recorded in the import log for raw-body uploads
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: i64,
    pub suggestions_removed: u64,
}

// ---------------------------------------------------------------------------
// Prayer management
// ---------------------------------------------------------------------------

/// PUT /api/admin/prayers/:id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    CurrentUser(admin): CurrentUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i64>,
    Json(request): Json<UpdatePrayerStatusRequest>,
) -> Result<Json<PrayerRequest>, ApiError> {
    let status: PrayerStatus = request
        .status
        .parse()
        .map_err(|e: String| ApiError::validation_field("status", e))?;

    let prayer = state
        .prayers()
        .update_prayer_status(id, status, Utc::now())
        .await?;

    let ip = ip.to_string();
    record_audit(
        &state.db,
        AuditEntry {
            action: actions::PRAYER_STATUS,
            resource_type: resource_types::PRAYER,
            resource_id: Some(prayer.id.to_string()),
            resource_name: Some(&prayer.title),
            user_id: Some(admin.id),
            ip_address: Some(&ip),
            details: Some(serde_json::json!({ "status": status.as_str() })),
        },
    )
    .await;

    Ok(Json(prayer))
}

/// PUT /api/admin/prayers/:id
pub async fn edit_prayer(
    State(state): State<Arc<AppState>>,
    CurrentUser(admin): CurrentUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i64>,
    Json(edit): Json<PrayerEdit>,
) -> Result<Json<PrayerRequest>, ApiError> {
    let prayer = state
        .prayers()
        .edit_prayer_request(id, edit, Utc::now())
        .await?;

    let ip = ip.to_string();
    record_audit(
        &state.db,
        AuditEntry {
            action: actions::PRAYER_UPDATE,
            resource_type: resource_types::PRAYER,
            resource_id: Some(prayer.id.to_string()),
            resource_name: Some(&prayer.title),
            user_id: Some(admin.id),
            ip_address: Some(&ip),
            details: None,
        },
    )
    .await;

    Ok(Json(prayer))
}

/// DELETE /api/admin/prayers/:id
pub async fn delete_prayer(
    State(state): State<Arc<AppState>>,
    CurrentUser(admin): CurrentUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let suggestions_removed = state.prayers().delete_prayer_request(id).await?;

    let ip = ip.to_string();
    record_audit(
        &state.db,
        AuditEntry {
            action: actions::PRAYER_DELETE,
            resource_type: resource_types::PRAYER,
            resource_id: Some(id.to_string()),
            resource_name: None,
            user_id: Some(admin.id),
            ip_address: Some(&ip),
            details: Some(serde_json::json!({ "suggestions_removed": suggestions_removed })),
        },
    )
    .await;

    Ok(Json(DeleteResponse {
        id,
        suggestions_removed,
    }))
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Pull the CSV out of a multipart upload: the `file` field, or the first
/// field carrying a filename
async fn read_multipart(mut multipart: Multipart) -> Result<(Bytes, Option<String>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") && field.file_name().is_none() {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
        return Ok((data, filename));
    }

    Err(ApiError::validation_field("file", "No CSV file was uploaded"))
}

/// POST /api/admin/import
///
/// Accepts `multipart/form-data` with a `file` field, or the CSV as the raw
/// request body.
pub async fn import_prayers(
    State(state): State<Arc<AppState>>,
    CurrentUser(admin): CurrentUser,
    ClientIp(ip): ClientIp,
    Query(query): Query<ImportQuery>,
    request: Request<Body>,
) -> Result<Json<ImportResult>, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("multipart/form-data"))
        .unwrap_or(false);

    let (data, filename) = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        read_multipart(multipart).await?
    } else {
        let data = Bytes::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        (data, query.filename)
    };

    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::validation_field("file", "The uploaded file is empty"));
    }

    let rows = parse_csv(&data)?;
    let result = state
        .prayers()
        .bulk_import(rows, &admin, filename.as_deref(), Utc::now())
        .await?;

    let ip = ip.to_string();
    record_audit(
        &state.db,
        AuditEntry {
            action: actions::PRAYER_IMPORT,
            resource_type: resource_types::IMPORT,
            resource_id: Some(result.import_log_id.to_string()),
            resource_name: filename.as_deref(),
            user_id: Some(admin.id),
            ip_address: Some(&ip),
            details: Some(serde_json::json!({
                "success_count": result.success_count,
                "failed_count": result.failed_count,
            })),
        },
    )
    .await;

    Ok(Json(result))
}

/// GET /api/admin/import-logs
pub async fn list_import_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ImportLog>>, ApiError> {
    let limit = query.limit.unwrap_or(50);
    Ok(Json(state.prayers().list_import_logs(limit).await?))
}

/// GET /api/admin/import-logs/:id
pub async fn get_import_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ImportLog>, ApiError> {
    Ok(Json(state.prayers().get_import_log(id).await?))
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// GET /api/admin/export.csv
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.prayers().export_rows().await?;
    let body = render_csv(&rows)?;
    let disposition = format!(
        "attachment; filename=\"prayer-list-{}.csv\"",
        Utc::now().format("%Y-%m-%d")
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

/// GET /api/admin/export/print
pub async fn export_print(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.prayers().export_rows().await?;
    let body = render_print(&rows, Utc::now());
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    ))
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// GET /api/reports/categories
pub async fn category_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategoryCount>>, ApiError> {
    Ok(Json(state.prayers().category_stats().await?))
}

/// GET /api/reports/activity
pub async fn recent_activity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ActivityEntry>>, ApiError> {
    let prayers = state.prayers();
    let limit = query
        .limit
        .unwrap_or(prayers.config().recent_activity_limit);
    Ok(Json(prayers.recent_activity(limit).await?))
}

/// GET /api/reports/stale
pub async fn stale_requests(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StaleQuery>,
) -> Result<Json<Vec<PrayerRequest>>, ApiError> {
    let prayers = state.prayers();
    let days = query.days.unwrap_or(prayers.config().stale_after_days);
    Ok(Json(prayers.stale_requests(days, Utc::now()).await?))
}

/// GET /api/reports/dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardSummary>, ApiError> {
    Ok(Json(state.prayers().dashboard_summary().await?))
}
