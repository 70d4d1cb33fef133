mod admin;
mod audit;
pub mod auth;
pub mod error;
pub mod guards;
mod moderation;
mod prayers;
pub mod rate_limit;
mod users;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::db::names;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Layers run outermost-last: the session guard is always added after the
    // role and permission guards that read the identity it resolves.
    let session = || middleware::from_fn_with_state(state.clone(), guards::require_auth);
    let permission = |name: &'static str| {
        middleware::from_fn_with_state((state.clone(), name), guards::require_permission)
    };

    // Login, registration and password reset share the tight auth budget
    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me).route_layer(session()));

    // Guests and members
    let prayer_routes = Router::new()
        .route(
            "/prayers",
            get(prayers::list_prayers).merge(post(prayers::create_prayer).route_layer(session())),
        )
        .route("/prayers/public", post(prayers::create_public_prayer))
        .route("/prayers/:id", get(prayers::get_prayer))
        .route(
            "/prayers/:id/suggestions",
            post(prayers::suggest_update).route_layer(session()),
        )
        .route("/categories", get(prayers::list_categories));

    let moderation_routes = Router::new()
        .route("/pending", get(moderation::list_pending))
        .route("/prayers/:id/suggestions", get(moderation::list_for_prayer))
        .route("/suggestions/:id/approve", post(moderation::approve))
        .route("/suggestions/:id/reject", post(moderation::reject))
        .route_layer(permission(names::APPROVE_UPDATES))
        .route_layer(session());

    let report_routes = Router::new()
        .route("/categories", get(admin::category_stats))
        .route("/activity", get(admin::recent_activity))
        .route("/stale", get(admin::stale_requests))
        .route("/dashboard", get(admin::dashboard))
        .route_layer(permission(names::VIEW_REPORTS))
        .route_layer(session());

    // Admin panel: every route needs an admin role plus its own permission
    let manage_routes = Router::new()
        .route("/prayers/:id", put(admin::edit_prayer))
        .route("/prayers/:id", delete(admin::delete_prayer))
        .route("/prayers/:id/status", put(admin::update_status))
        .route_layer(permission(names::MANAGE_PRAYERS));
    let import_routes = Router::new()
        .route("/import", post(admin::import_prayers))
        .route("/import-logs", get(admin::list_import_logs))
        .route("/import-logs/:id", get(admin::get_import_log))
        .route_layer(permission(names::IMPORT_PRAYERS));
    let export_routes = Router::new()
        .route("/export.csv", get(admin::export_csv))
        .route("/export/print", get(admin::export_print))
        .route_layer(permission(names::EXPORT_PRAYERS));
    let admin_routes = Router::new()
        .merge(manage_routes)
        .merge(import_routes)
        .merge(export_routes)
        .route_layer(middleware::from_fn(guards::require_admin))
        .route_layer(session());

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/", post(users::create_user))
        .route("/stats", get(users::user_stats))
        .route("/permissions", get(users::list_permissions))
        .route("/:id", get(users::get_user))
        .route("/:id/role", put(users::update_role))
        .route("/:id/status", put(users::update_status))
        .route_layer(permission(names::MANAGE_USERS))
        .route_layer(middleware::from_fn(guards::require_super_admin))
        .route_layer(session());

    let audit_routes = Router::new()
        .route("/", get(audit::list_logs))
        .route("/actions", get(audit::list_action_types))
        .route_layer(permission(names::VIEW_AUDIT_LOG))
        .route_layer(middleware::from_fn(guards::require_super_admin))
        .route_layer(session());

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .merge(prayer_routes)
        .nest("/moderation", moderation_routes)
        .nest("/reports", report_routes)
        .nest("/admin", admin_routes)
        .nest("/users", user_routes)
        .nest("/audit", audit_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::user_with_role;
    use crate::config::Config;
    use crate::db::{PrayerRequestForm, Role, User};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn setup() -> Arc<AppState> {
        let db = crate::db::connect_memory().await.unwrap();
        Arc::new(AppState::new(Config::default(), db))
    }

    async fn cookie_for(state: &AppState, user: &User) -> String {
        let token = state
            .auth()
            .create_session(user.id, Utc::now())
            .await
            .unwrap();
        format!("{}={}", guards::SESSION_COOKIE, token)
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, cookie: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> axum::response::Response {
        create_router(state.clone()).oneshot(request).await.unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn add_prayer(state: &AppState, title: &str, submitter: Option<&User>, private: bool) -> i64 {
        state
            .prayers()
            .create_prayer_request(
                PrayerRequestForm {
                    title: title.to_string(),
                    content: format!("{} content", title),
                    requester_name: "Ruth".to_string(),
                    requester_email: None,
                    category: "Healing".to_string(),
                    is_private: private,
                },
                submitter,
                Utc::now(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let state = setup().await;
        let response = send(&state, get("/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_guest_listing_hides_private_requests() {
        let state = setup().await;
        let alice = user_with_role(&state.db, "alice", Role::Member).await;
        add_prayer(&state, "Open", Some(&alice), false).await;
        let hidden = add_prayer(&state, "Hidden", Some(&alice), true).await;

        let guest = json_body(send(&state, get("/api/prayers", None)).await).await;
        let titles: Vec<&str> = guest
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["Open"]);

        let cookie = cookie_for(&state, &alice).await;
        let member = json_body(send(&state, get("/api/prayers", Some(&cookie))).await).await;
        assert_eq!(member.as_array().unwrap().len(), 2);

        let direct = send(&state, get(&format!("/api/prayers/{}", hidden), None)).await;
        assert_eq!(direct.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_guest_submission_is_forced_public() {
        let state = setup().await;
        let response = send(
            &state,
            post_json(
                "/api/prayers/public",
                None,
                serde_json::json!({
                    "title": "Job search",
                    "content": "Pray for an interview",
                    "requester_name": "Guest",
                    "category": "Provision",
                    "is_private": true,
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json_body(response).await["id"].as_i64().unwrap();

        let listed = json_body(send(&state, get(&format!("/api/prayers/{}", id), None)).await).await;
        assert_eq!(listed["is_private"], false);
    }

    #[tokio::test]
    async fn test_member_routes_redirect_guests_to_login() {
        let state = setup().await;
        let response = send(
            &state,
            post_json("/api/prayers", None, serde_json::json!({ "title": "x" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn test_role_hierarchy_through_router() {
        let state = setup().await;
        let root = user_with_role(&state.db, "root", Role::SuperAdmin).await;
        let member = user_with_role(&state.db, "mary", Role::Member).await;
        let root_cookie = cookie_for(&state, &root).await;
        let member_cookie = cookie_for(&state, &member).await;

        // Admin area and super-admin area both open for super_admin
        let export = send(&state, get("/api/admin/export.csv", Some(&root_cookie))).await;
        assert_eq!(export.status(), StatusCode::OK);
        assert!(export.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
        let users = send(&state, get("/api/users", Some(&root_cookie))).await;
        assert_eq!(users.status(), StatusCode::OK);
        let catalogue = json_body(send(&state, get("/api/users/permissions", Some(&root_cookie))).await).await;
        assert_eq!(catalogue.as_array().unwrap().len(), 7);

        // And closed for a member, without naming what was missing
        let export = send(&state, get("/api/admin/export.csv", Some(&member_cookie))).await;
        assert_eq!(export.status(), StatusCode::FORBIDDEN);
        let users = send(&state, get("/api/users", Some(&member_cookie))).await;
        assert_eq!(users.status(), StatusCode::FORBIDDEN);
        let body = users.into_body().collect().await.unwrap().to_bytes();
        let page = String::from_utf8(body.to_vec()).unwrap();
        assert!(page.contains("Access Denied"));
        assert!(!page.contains("manage_users"));
    }

    #[tokio::test]
    async fn test_moderator_reviews_but_cannot_export() {
        let state = setup().await;
        let moderator = user_with_role(&state.db, "mod", Role::Moderator).await;
        let cookie = cookie_for(&state, &moderator).await;

        let pending = send(&state, get("/api/moderation/pending", Some(&cookie))).await;
        assert_eq!(pending.status(), StatusCode::OK);
        let export = send(&state, get("/api/admin/export.csv", Some(&cookie))).await;
        assert_eq!(export.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_login_failures_look_the_same() {
        let state = setup().await;
        user_with_role(&state.db, "alice", Role::Member).await;

        let unknown = send(
            &state,
            post_json(
                "/api/auth/login",
                None,
                serde_json::json!({ "username": "nobody", "password": "whatever-pass" }),
            ),
        )
        .await;
        let wrong = send(
            &state,
            post_json(
                "/api/auth/login",
                None,
                serde_json::json!({ "username": "alice", "password": "wrong-password" }),
            ),
        )
        .await;

        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(unknown).await, json_body(wrong).await);
    }

    #[tokio::test]
    async fn test_login_sets_session_cookie() {
        let state = setup().await;
        user_with_role(&state.db, "alice", Role::Member).await;

        let response = send(
            &state,
            post_json(
                "/api/auth/login",
                None,
                serde_json::json!({ "username": "alice", "password": "alice-password" }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(set_cookie.starts_with("session_id="));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Strict"));
        assert!(set_cookie.contains("Max-Age=86400"));

        let cookie = set_cookie.split(';').next().unwrap().to_string();
        let me = send(&state, get("/api/auth/me", Some(&cookie))).await;
        assert_eq!(me.status(), StatusCode::OK);
        let me = json_body(me).await;
        assert_eq!(me["user"]["username"], "alice");
        assert_eq!(me["permissions"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_suggestion_review_end_to_end() {
        let state = setup().await;
        let alice = user_with_role(&state.db, "alice", Role::Member).await;
        let bob = user_with_role(&state.db, "bob", Role::Member).await;
        let carol = user_with_role(&state.db, "carol", Role::Admin).await;
        let alice_cookie = cookie_for(&state, &alice).await;
        let bob_cookie = cookie_for(&state, &bob).await;
        let carol_cookie = cookie_for(&state, &carol).await;

        let created = send(
            &state,
            post_json(
                "/api/prayers",
                Some(&alice_cookie),
                serde_json::json!({
                    "title": "Healing",
                    "content": "Please pray for recovery",
                    "requester_name": "Alice",
                    "category": "Healing",
                }),
            ),
        )
        .await;
        assert_eq!(created.status(), StatusCode::CREATED);
        let prayer_id = json_body(created).await["id"].as_i64().unwrap();

        let suggested = send(
            &state,
            post_json(
                &format!("/api/prayers/{}/suggestions", prayer_id),
                Some(&bob_cookie),
                serde_json::json!({ "suggested_content": "Recovered, praise God" }),
            ),
        )
        .await;
        assert_eq!(suggested.status(), StatusCode::CREATED);
        let suggestion_id = json_body(suggested).await["id"].as_i64().unwrap();

        // Members cannot review
        let denied = send(
            &state,
            post_json(
                &format!("/api/moderation/suggestions/{}/approve", suggestion_id),
                Some(&bob_cookie),
                serde_json::json!({}),
            ),
        )
        .await;
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let approve_uri = format!("/api/moderation/suggestions/{}/approve", suggestion_id);
        let approved = send(
            &state,
            post_json(&approve_uri, Some(&carol_cookie), serde_json::json!({ "admin_notes": "Amen" })),
        )
        .await;
        assert_eq!(approved.status(), StatusCode::OK);
        let approved = json_body(approved).await;
        assert_eq!(approved["status"], "approved");
        assert_eq!(approved["reviewed_by"], carol.id);

        let prayer = json_body(
            send(&state, get(&format!("/api/prayers/{}", prayer_id), Some(&alice_cookie))).await,
        )
        .await;
        assert_eq!(prayer["content"], "Recovered, praise God");

        let again = send(
            &state,
            post_json(&approve_uri, Some(&carol_cookie), serde_json::json!({})),
        )
        .await;
        assert_eq!(again.status(), StatusCode::CONFLICT);

        let audit = crate::db::list_audit_logs(
            &state.db,
            &crate::db::AuditLogQuery {
                action: Some(crate::db::actions::SUGGESTION_APPROVE.to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(audit.total, 1);
    }

    #[tokio::test]
    async fn test_raw_csv_import() {
        let state = setup().await;
        let admin = user_with_role(&state.db, "carol", Role::Admin).await;
        let cookie = cookie_for(&state, &admin).await;

        let csv = "name,content,requester_name,category\n\
                   Surgery,Knee surgery Tuesday,Tom,Healing\n\
                   Exams,,Jane,\n";
        let request = Request::builder()
            .method("POST")
            .uri("/api/admin/import?filename=list.csv")
            .header(header::COOKIE, &cookie)
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from(csv))
            .unwrap();

        let response = send(&state, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let result = json_body(response).await;
        assert_eq!(result["success_count"], 1);
        assert_eq!(result["failed_count"], 1);
        assert_eq!(result["errors"][0], "Row 2: Content is required");

        let logs = json_body(send(&state, get("/api/admin/import-logs", Some(&cookie))).await).await;
        assert_eq!(logs[0]["filename"], "list.csv");
    }

    #[tokio::test]
    async fn test_forgot_password_answers_identically() {
        let state = setup().await;
        user_with_role(&state.db, "alice", Role::Member).await;

        let known = send(
            &state,
            post_json(
                "/api/auth/forgot-password",
                None,
                serde_json::json!({ "identifier": "alice@example.org" }),
            ),
        )
        .await;
        let unknown = send(
            &state,
            post_json(
                "/api/auth/forgot-password",
                None,
                serde_json::json!({ "identifier": "ghost" }),
            ),
        )
        .await;

        assert_eq!(known.status(), StatusCode::OK);
        assert_eq!(unknown.status(), StatusCode::OK);
        assert_eq!(json_body(known).await, json_body(unknown).await);
    }

    #[tokio::test]
    async fn test_forgot_password_does_not_wait_for_smtp() {
        // Accepts connections but never sends an SMTP greeting
        let smtp = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = smtp.local_addr().unwrap().port();

        let mut config = Config::default();
        config.email.smtp_host = Some("127.0.0.1".to_string());
        config.email.smtp_port = port;
        config.email.smtp_tls = false;
        config.email.from_address = Some("office@example.org".to_string());
        let db = crate::db::connect_memory().await.unwrap();
        let state = Arc::new(AppState::new(config, db));
        user_with_role(&state.db, "alice", Role::Member).await;

        let request = post_json(
            "/api/auth/forgot-password",
            None,
            serde_json::json!({ "identifier": "alice" }),
        );
        let response = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            send(&state, request),
        )
        .await
        .expect("forgot-password blocked on mail delivery");
        assert_eq!(response.status(), StatusCode::OK);
        drop(smtp);
    }

    #[tokio::test]
    async fn test_register_creates_member() {
        let state = setup().await;
        let response = send(
            &state,
            post_json(
                "/api/auth/register",
                None,
                serde_json::json!({
                    "username": "naomi",
                    "password": "naomi-password",
                    "confirm_password": "naomi-password",
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["username"], "naomi");
        assert_eq!(body["role"], "member");
    }

    #[tokio::test]
    async fn test_stale_report_rejects_out_of_range_days() {
        let state = setup().await;
        let moderator = user_with_role(&state.db, "mod", Role::Moderator).await;
        let cookie = cookie_for(&state, &moderator).await;

        let ok = send(&state, get("/api/reports/stale?days=30", Some(&cookie))).await;
        assert_eq!(ok.status(), StatusCode::OK);

        let huge = send(&state, get("/api/reports/stale?days=100000000", Some(&cookie))).await;
        assert_eq!(huge.status(), StatusCode::BAD_REQUEST);
        let body = json_body(huge).await;
        assert!(body["error"]["details"]["days"].is_array());
    }

    #[tokio::test]
    async fn test_validation_errors_name_the_field() {
        let state = setup().await;
        let response = send(
            &state,
            post_json(
                "/api/prayers/public",
                None,
                serde_json::json!({
                    "title": "",
                    "content": "Something",
                    "requester_name": "Guest",
                    "category": "General",
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "validation_error");
        assert!(body["error"]["details"]["title"].is_array());
    }
}
