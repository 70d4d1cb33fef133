//! Review queue for member-suggested updates.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::db::{
    actions, record_audit, resource_types, AuditEntry, PendingSuggestion, ReviewRequest,
    SuggestedUpdate, SuggestionWithAuthor, User,
};
use crate::engine::Review;
use crate::validation::non_blank;
use crate::AppState;

use super::error::ApiError;
use super::guards::CurrentUser;
use super::rate_limit::ClientIp;

/// GET /api/moderation/pending
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PendingSuggestion>>, ApiError> {
    Ok(Json(state.prayers().list_pending_suggestions().await?))
}

/// GET /api/moderation/prayers/:id/suggestions
pub async fn list_for_prayer(
    State(state): State<Arc<AppState>>,
    Path(prayer_id): Path<i64>,
) -> Result<Json<Vec<SuggestionWithAuthor>>, ApiError> {
    let prayers = state.prayers();
    // Private requests are fine here; reviewers are always signed in
    prayers.get_prayer_request(prayer_id, true).await?;
    Ok(Json(prayers.list_suggestions_for(prayer_id).await?))
}

/// POST /api/moderation/suggestions/:id/approve
pub async fn approve(
    State(state): State<Arc<AppState>>,
    CurrentUser(reviewer): CurrentUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i64>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<SuggestedUpdate>, ApiError> {
    review(&state, Review::Approve, &reviewer, &ip.to_string(), id, request).await
}

/// POST /api/moderation/suggestions/:id/reject
pub async fn reject(
    State(state): State<Arc<AppState>>,
    CurrentUser(reviewer): CurrentUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i64>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<SuggestedUpdate>, ApiError> {
    review(&state, Review::Reject, &reviewer, &ip.to_string(), id, request).await
}

async fn review(
    state: &AppState,
    decision: Review,
    reviewer: &User,
    ip: &str,
    id: i64,
    request: ReviewRequest,
) -> Result<Json<SuggestedUpdate>, ApiError> {
    let prayers = state.prayers();
    let notes = non_blank(request.admin_notes.as_deref());
    let now = Utc::now();

    let (suggestion, action) = match decision {
        Review::Approve => (
            prayers.approve_suggested_update(id, reviewer, notes, now).await?,
            actions::SUGGESTION_APPROVE,
        ),
        Review::Reject => (
            prayers.reject_suggested_update(id, reviewer, notes, now).await?,
            actions::SUGGESTION_REJECT,
        ),
    };

    record_audit(
        &state.db,
        AuditEntry {
            action,
            resource_type: resource_types::SUGGESTION,
            resource_id: Some(suggestion.id.to_string()),
            resource_name: None,
            user_id: Some(reviewer.id),
            ip_address: Some(ip),
            details: Some(serde_json::json!({
                "prayer_request_id": suggestion.prayer_request_id,
                "admin_notes": suggestion.admin_notes,
            })),
        },
    )
    .await;

    Ok(Json(suggestion))
}
