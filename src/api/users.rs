//! User management (super-admin only)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{
    actions, record_audit, resource_types, AuditEntry, CreateUserRequest, Permission, Role,
    UpdateRoleRequest, UpdateStatusRequest, User, UserResponse, UserStats, UserStatus,
};
use crate::AppState;

use super::error::ApiError;
use super::guards::CurrentUser;
use super::rate_limit::ClientIp;

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

async fn audit_user_change(
    state: &AppState,
    action: &str,
    actor: &User,
    target: &User,
    ip: &str,
    details: serde_json::Value,
) {
    record_audit(
        &state.db,
        AuditEntry {
            action,
            resource_type: resource_types::USER,
            resource_id: Some(target.id.to_string()),
            resource_name: Some(&target.username),
            user_id: Some(actor.id),
            ip_address: Some(ip),
            details: Some(details),
        },
    )
    .await;
}

/// GET /api/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let per_page = query.per_page.unwrap_or(50).clamp(1, 200);
    let page = query.page.unwrap_or(1).max(1);

    let users = state
        .auth()
        .list_users(per_page, (page - 1) * per_page)
        .await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// GET /api/users/stats
pub async fn user_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UserStats>, ApiError> {
    Ok(Json(state.auth().user_stats().await?))
}

/// GET /api/users/permissions
///
/// Permission catalogue, for the role editor
pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    Ok(Json(state.auth().list_permissions().await?))
}

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(state.auth().get_user(id).await?.into()))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    ClientIp(ip): ClientIp,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state.auth().create_user(request, &actor, Utc::now()).await?;

    audit_user_change(
        &state,
        actions::USER_CREATE,
        &actor,
        &user,
        &ip.to_string(),
        serde_json::json!({ "role": user.role.as_str() }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(user.into())))
}

/// PUT /api/users/:id/role
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i64>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let role: Role = request
        .role
        .parse()
        .map_err(|e: String| ApiError::validation_field("role", e))?;

    let user = state.auth().change_role(&actor, id, role).await?;

    audit_user_change(
        &state,
        actions::USER_ROLE_CHANGE,
        &actor,
        &user,
        &ip.to_string(),
        serde_json::json!({ "role": role.as_str() }),
    )
    .await;

    Ok(Json(user.into()))
}

/// PUT /api/users/:id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    CurrentUser(actor): CurrentUser,
    ClientIp(ip): ClientIp,
    Path(id): Path<i64>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let status: UserStatus = request
        .status
        .parse()
        .map_err(|e: String| ApiError::validation_field("status", e))?;

    let user = state.auth().set_status(&actor, id, status).await?;

    audit_user_change(
        &state,
        actions::USER_STATUS_CHANGE,
        &actor,
        &user,
        &ip.to_string(),
        serde_json::json!({ "status": status.as_str() }),
    )
    .await;

    Ok(Json(user.into()))
}
