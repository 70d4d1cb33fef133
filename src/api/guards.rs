//! Route guards.
//!
//! `require_auth` resolves the `session_id` cookie and stores the user in the
//! request extensions. The role and permission guards read that identity and
//! must therefore be layered inside `require_auth` (added before it).
//! A guest is redirected to `/login`; a signed-in user without the required
//! role gets a plain 403 page.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use std::sync::Arc;

use crate::db::{Permission, Role, User};
use crate::AppState;

use super::error::ApiError;

pub const SESSION_COOKIE: &str = "session_id";

/// Authenticated identity for the current request
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Identity for routes that serve guests and members alike
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn is_authenticated(&self) -> bool {
        self.0.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Admin,
    SuperAdmin,
    Permission(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// No identity: send the client to the login page
    Login,
    Deny,
}

/// Decide whether `identity` satisfies `requirement`.
///
/// `granted` lists the roles the permission table grants the permission to;
/// a role passes when it sits at or above any of them.
pub fn authorize(identity: Option<&User>, requirement: Requirement, granted: &[Role]) -> Decision {
    let Some(user) = identity else {
        return Decision::Login;
    };

    let allowed = match requirement {
        Requirement::Authenticated => true,
        Requirement::Admin => user.is_admin(),
        Requirement::SuperAdmin => user.is_super_admin(),
        Requirement::Permission(_) => granted.iter().any(|g| user.role.has_at_least(*g)),
    };

    if allowed {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

fn access_denied() -> Response {
    (
        StatusCode::FORBIDDEN,
        Html(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Access Denied</title></head>
<body>
    <h1>Access Denied</h1>
    <p>You do not have access to this page.</p>
    <p><a href="/">Back to the prayer wall</a></p>
</body>
</html>"#,
        ),
    )
        .into_response()
}

async fn resolve_session(state: &AppState, jar: &CookieJar) -> Result<Option<User>, ApiError> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };
    let user = state
        .auth()
        .get_user_by_session(cookie.value(), Utc::now())
        .await?;
    Ok(user)
}

pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let user = match resolve_session(&state, &jar).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    match user {
        Some(user) => {
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        None => Redirect::to("/login").into_response(),
    }
}

fn identity(request: &Request<Body>) -> Option<&User> {
    request
        .extensions()
        .get::<CurrentUser>()
        .map(|CurrentUser(user)| user)
}

async fn guard(requirement: Requirement, granted: &[Role], request: Request<Body>, next: Next) -> Response {
    let decision = authorize(identity(&request), requirement, granted);
    if decision != Decision::Allow {
        if let Some(user) = identity(&request) {
            tracing::debug!(user_id = user.id, ?requirement, "Access denied");
        }
    }
    match decision {
        Decision::Allow => next.run(request).await,
        Decision::Login => Redirect::to("/login").into_response(),
        Decision::Deny => access_denied(),
    }
}

pub async fn require_admin(request: Request<Body>, next: Next) -> Response {
    guard(Requirement::Admin, &[], request, next).await
}

pub async fn require_super_admin(request: Request<Body>, next: Next) -> Response {
    guard(Requirement::SuperAdmin, &[], request, next).await
}

/// Permission guard; mount with
/// `from_fn_with_state((state, names::APPROVE_UPDATES), require_permission)`
pub async fn require_permission(
    State((state, permission)): State<(Arc<AppState>, &'static str)>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let granted = match Permission::granted_roles(&state.db, permission).await {
        Ok(roles) => roles,
        Err(e) => return ApiError::from(e).into_response(),
    };
    guard(Requirement::Permission(permission), &granted, request, next).await
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let jar = CookieJar::from_headers(&parts.headers);
        resolve_session(state, &jar)
            .await?
            .map(CurrentUser)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(CurrentUser(user)) = parts.extensions.get::<CurrentUser>() {
            return Ok(MaybeUser(Some(user.clone())));
        }

        let jar = CookieJar::from_headers(&parts.headers);
        Ok(MaybeUser(resolve_session(state, &jar).await?))
    }
}
