//! Audit log endpoints.

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::db::{list_audit_logs, AuditLogListResponse, AuditLogQuery};
use crate::AppState;

use super::error::ApiError;

/// GET /api/audit
///
/// Filters: action, resource_type, resource_id, user_id, start_date,
/// end_date (RFC 3339). Paged with `page` (from 1) and `per_page` (max 100).
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<AuditLogListResponse>, ApiError> {
    let result = list_audit_logs(&state.db, &query).await?;
    Ok(Json(result))
}

/// GET /api/audit/actions
pub async fn list_action_types(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<String>>, ApiError> {
    let actions: Vec<String> =
        sqlx::query_scalar("SELECT DISTINCT action FROM audit_logs ORDER BY action")
            .fetch_all(&state.db)
            .await?;

    Ok(Json(actions))
}
