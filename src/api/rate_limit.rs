//! Per-client request throttling.
//!
//! Each client IP gets a sliding window of requests per tier. The auth tier
//! covers login, registration and password reset and is much tighter than the
//! general API tier.

use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header::HeaderName, request::Parts, HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::AppState;

use super::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitTier {
    Api,
    Auth,
}

impl RateLimitTier {
    fn as_str(&self) -> &'static str {
        match self {
            RateLimitTier::Api => "api",
            RateLimitTier::Auth => "auth",
        }
    }
}

#[derive(Debug, Clone)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: u64,
}

pub struct RateLimiter {
    windows: DashMap<(IpAddr, RateLimitTier), Window>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    fn limit_for(&self, tier: RateLimitTier) -> u32 {
        match tier {
            RateLimitTier::Api => self.config.api_requests_per_window,
            RateLimitTier::Auth => self.config.auth_requests_per_window,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_seconds.max(1))
    }

    pub fn check_rate_limit(&self, ip: IpAddr, tier: RateLimitTier) -> RateLimitInfo {
        let limit = self.limit_for(tier);
        let window = self.window();

        if !self.config.enabled {
            return RateLimitInfo {
                allowed: true,
                limit,
                remaining: limit,
                reset_after: 0,
            };
        }

        let now = Instant::now();
        let mut entry = self.windows.entry((ip, tier)).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= window {
            entry.started = now;
            entry.count = 0;
        }

        let reset_after = window
            .saturating_sub(now.duration_since(entry.started))
            .as_secs();

        if entry.count >= limit {
            return RateLimitInfo {
                allowed: false,
                limit,
                remaining: 0,
                reset_after,
            };
        }

        entry.count += 1;
        RateLimitInfo {
            allowed: true,
            limit,
            remaining: limit - entry.count,
            reset_after,
        }
    }

    /// Drop windows that have fully elapsed
    pub fn cleanup(&self) {
        let window = self.window();
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < window);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, "Rate limit windows cleaned up");
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Client address: proxy headers first, then the socket peer
pub(crate) fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(ip) = forwarded
            .split(',')
            .next()
            .and_then(|first| first.trim().parse().ok())
        {
            return ip;
        }
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
    {
        return ip;
    }

    peer.map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub(crate) fn request_ip<B>(request: &Request<B>) -> IpAddr {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_ip(request.headers(), peer)
}

/// Client address of the current request, for audit records
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(ClientIp(client_ip(&parts.headers, peer)))
    }
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: HeaderValue) {
    headers.insert(HeaderName::from_static(name), value);
}

fn apply_headers(headers: &mut HeaderMap, info: &RateLimitInfo) {
    set_header(headers, "x-ratelimit-limit", HeaderValue::from(info.limit));
    set_header(headers, "x-ratelimit-remaining", HeaderValue::from(info.remaining));
    set_header(headers, "x-ratelimit-reset", HeaderValue::from(info.reset_after));
}

async fn rate_limit_with_tier(
    state: Arc<AppState>,
    tier: RateLimitTier,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = request_ip(&request);
    let info = state.rate_limiter.check_rate_limit(ip, tier);

    if !info.allowed {
        tracing::warn!(ip = %ip, tier = tier.as_str(), "Rate limit exceeded");
        let mut response = ApiError::rate_limited("Too many requests, please slow down")
            .into_response();
        apply_headers(response.headers_mut(), &info);
        set_header(
            response.headers_mut(),
            "retry-after",
            HeaderValue::from(info.reset_after),
        );
        return response;
    }

    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &info);
    response
}

pub async fn rate_limit_api(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    rate_limit_with_tier(state, RateLimitTier::Api, request, next).await
}

pub async fn rate_limit_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    rate_limit_with_tier(state, RateLimitTier::Auth, request, next).await
}

pub fn spawn_cleanup_task(rate_limiter: Arc<RateLimiter>, interval_secs: u64) {
    if interval_secs == 0 {
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            rate_limiter.cleanup();
        }
    });
}
