//! Login, registration, logout and password reset endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{actions, record_audit, resource_types, AuditEntry, LoginRequest, RegisterRequest, UserResponse};
use crate::notifications::reset_link;
use crate::AppState;

use super::error::ApiError;
use super::guards::{CurrentUser, SESSION_COOKIE};
use super::rate_limit::ClientIp;

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    /// Username or email address
    pub identifier: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    pub confirm_password: String,
}

const RESET_REQUESTED: &str =
    "If an account matches, a password reset link has been sent";

fn session_cookie(token: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = state.auth();
    let now = Utc::now();

    let user = auth
        .authenticate_user(&request.username, &request.password, now)
        .await
        .map_err(|e| match e {
            crate::Error::Unauthorized => ApiError::unauthorized("Invalid username or password"),
            other => other.into(),
        })?;
    let token = auth.create_session(user.id, now).await?;

    let ip = ip.to_string();
    record_audit(
        &state.db,
        AuditEntry {
            action: actions::AUTH_LOGIN,
            resource_type: resource_types::USER,
            resource_id: Some(user.id.to_string()),
            resource_name: Some(&user.username),
            user_id: Some(user.id),
            ip_address: Some(&ip),
            details: None,
        },
    )
    .await;

    let cookie = session_cookie(
        token,
        auth.session_ttl().num_seconds(),
        state.config.server.secure_cookies,
    );

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            user: UserResponse::from(user),
        }),
    ))
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state.auth().register_member(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.auth().delete_session(cookie.value()).await?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MeResponse>, ApiError> {
    let permissions = state
        .auth()
        .role_permissions(user.role)
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();

    Ok(Json(MeResponse {
        user: UserResponse::from(user),
        permissions,
    }))
}

/// POST /api/auth/forgot-password
///
/// Answers the same way, and as quickly, whether or not the account exists.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let now = Utc::now();

    if let Some(reset) = state
        .auth()
        .request_password_reset(&request.identifier, now)
        .await?
    {
        let url = reset_link(&state.config.server.public_url, &reset.token);
        let minutes = (reset.expires_at - now).num_minutes();
        state.mailer.spawn_password_reset(reset.user, url, minutes);
    }

    Ok(Json(MessageResponse {
        message: RESET_REQUESTED.to_string(),
    }))
}

/// POST /api/auth/reset-password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = state
        .auth()
        .reset_password(
            &request.token,
            &request.password,
            &request.confirm_password,
            Utc::now(),
        )
        .await?;

    let ip = ip.to_string();
    record_audit(
        &state.db,
        AuditEntry {
            action: actions::AUTH_PASSWORD_RESET,
            resource_type: resource_types::USER,
            resource_id: Some(user.id.to_string()),
            resource_name: Some(&user.username),
            user_id: Some(user.id),
            ip_address: Some(&ip),
            details: None,
        },
    )
    .await;

    Ok(Json(MessageResponse {
        message: "Password updated, please sign in".to_string(),
    }))
}
