//! Prayer wall endpoints for guests and members.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::db::{
    PrayerCategory, PrayerListQuery, PrayerRequest, PrayerRequestForm, SuggestUpdateRequest,
};
use crate::AppState;

use super::error::ApiError;
use super::guards::{CurrentUser, MaybeUser};

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: i64,
}

/// Guests never see who to contact
fn for_viewer(mut prayer: PrayerRequest, authenticated: bool) -> PrayerRequest {
    if !authenticated {
        prayer.requester_email = None;
    }
    prayer
}

/// GET /api/prayers
pub async fn list_prayers(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Query(query): Query<PrayerListQuery>,
) -> Result<Json<Vec<PrayerRequest>>, ApiError> {
    let authenticated = viewer.is_authenticated();
    let prayers = state
        .prayers()
        .list_prayer_requests(query.category.as_deref(), authenticated)
        .await?
        .into_iter()
        .map(|p| for_viewer(p, authenticated))
        .collect();
    Ok(Json(prayers))
}

/// GET /api/prayers/:id
pub async fn get_prayer(
    State(state): State<Arc<AppState>>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<PrayerRequest>, ApiError> {
    let authenticated = viewer.is_authenticated();
    let prayer = state
        .prayers()
        .get_prayer_request(id, authenticated)
        .await?;
    Ok(Json(for_viewer(prayer, authenticated)))
}

/// POST /api/prayers/public
///
/// Guest submission. The request is stored public regardless of the form.
pub async fn create_public_prayer(
    State(state): State<Arc<AppState>>,
    Json(form): Json<PrayerRequestForm>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let id = state
        .prayers()
        .create_prayer_request(form, None, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// POST /api/prayers
pub async fn create_prayer(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(form): Json<PrayerRequestForm>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let id = state
        .prayers()
        .create_prayer_request(form, Some(&user), Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// POST /api/prayers/:id/suggestions
pub async fn suggest_update(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(request): Json<SuggestUpdateRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let suggestion_id = state
        .prayers()
        .create_suggested_update(id, &request.suggested_content, &user, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: suggestion_id })))
}

/// GET /api/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PrayerCategory>>, ApiError> {
    Ok(Json(state.prayers().list_categories().await?))
}
