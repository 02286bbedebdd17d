use std::net::SocketAddr;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, users};

pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(state.config.frontend_url.as_deref());
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(users::router())
                .route("/health", get(health))
                .route("/test", get(|| async { Json(json!({ "message": "Backend is working" })) })),
        )
        .route("/", get(|| async { "User Management System Backend" }))
        .fallback(not_found)
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

/// Only the configured frontend may send credentials; without one, anything goes.
fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    let Some(url) = frontend_url else {
        return CorsLayer::permissive();
    };
    match HeaderValue::from_str(url.trim_end_matches('/')) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        Err(e) => {
            tracing::warn!(error = %e, frontend_url = %url, "unusable FRONTEND_URL; CORS left permissive");
            CorsLayer::permissive()
        }
    }
}

async fn health() -> impl IntoResponse {
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
    Json(json!({ "status": "OK", "timestamp": timestamp }))
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Endpoint not found" })))
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "5000".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, extract::FromRef, http::Request};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        auth::{password::HashedPassword, services::AuthService},
        users::repo_types::{NewUser, Role},
    };

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();
        send(app, req).await
    }

    async fn signup(app: &Router, name: &str, email: &str, password: &str) -> (StatusCode, Value) {
        call(
            app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({ "fullName": name, "email": email, "password": password })),
        )
        .await
    }

    async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
        call(
            app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await
    }

    /// App with one seeded admin; returns the admin's token.
    async fn app_with_admin() -> (Router, AppState, String) {
        let state = AppState::fake();
        AuthService::from_ref(&state)
            .ensure_admin("Admin User", "admin@example.com", "adminpass")
            .await
            .unwrap();
        let app = build_app(state.clone());
        let (status, body) = login(&app, "admin@example.com", "adminpass").await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();
        (app, state, token)
    }

    #[tokio::test]
    async fn health_and_banner() {
        let app = build_app(AppState::fake());
        let (status, body) = call(&app, Method::GET, "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");

        let (status, body) = call(&app, Method::GET, "/api/test", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Backend is working");
    }

    #[tokio::test]
    async fn unknown_path_is_json_404() {
        let app = build_app(AppState::fake());
        let (status, body) = call(&app, Method::GET, "/api/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Endpoint not found");
    }

    #[tokio::test]
    async fn signup_returns_created_user_without_hash() {
        let app = build_app(AppState::fake());
        let (status, body) = signup(&app, "Jane Doe", "jane@example.com", "secret1").await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["token"].is_string());
        assert_eq!(body["user"]["fullName"], "Jane Doe");
        assert_eq!(body["user"]["email"], "jane@example.com");
        assert_eq!(body["user"]["role"], "user");
        assert_eq!(body["user"]["status"], "active");
        assert!(body["user"].get("passwordHash").is_none());
        assert!(body["user"].get("password").is_none());
    }

    #[tokio::test]
    async fn signup_rejections_are_400_with_message() {
        let app = build_app(AppState::fake());
        signup(&app, "Jane", "jane@example.com", "secret1").await;

        let (status, body) = signup(&app, "Other", "JANE@example.com", "secret1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("already"));

        let (status, body) = signup(&app, "Test", "t@example.com", "123").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("at least 6 characters"));
        assert_eq!(body["field"], "password");

        let (status, body) = signup(&app, "Test", "invalid-email", "secret1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("Invalid email"));

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({ "password": "Password123" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_wrong_password_and_unknown_email_match() {
        let app = build_app(AppState::fake());
        signup(&app, "Jane", "jane@example.com", "secret1").await;

        let (status, wrong) = login(&app, "jane@example.com", "wrong").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(wrong["message"].as_str().unwrap().contains("Invalid credentials"));

        let (status, unknown) = login(&app, "nobody@example.com", "secret1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(wrong["message"], unknown["message"]);

        let (status, body) = login(&app, "Jane@Example.com", "secret1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], "jane@example.com");
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let app = build_app(AppState::fake());

        let (status, body) = call(&app, Method::GET, "/api/users/profile", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].as_str().unwrap().contains("No token"));

        let (status, body) = call(&app, Method::GET, "/api/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].as_str().unwrap().contains("No token"));

        let (status, body) =
            call(&app, Method::GET, "/api/users/profile", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].as_str().unwrap().contains("not valid"));
    }

    #[tokio::test]
    async fn profile_read_update_and_password_change() {
        let (app, _, _) = app_with_admin().await;
        let (_, body) = signup(&app, "Regular User", "user@example.com", "secret1").await;
        let token = body["token"].as_str().unwrap().to_string();

        let (status, me) = call(&app, Method::GET, "/api/users/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["fullName"], "Regular User");
        assert!(me.get("passwordHash").is_none());

        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/users/profile",
            Some(&token),
            Some(json!({ "email": "admin@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("already in use"));

        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/users/profile",
            Some(&token),
            Some(json!({ "fullName": "Updated Name", "email": "updated@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("updated"));
        assert_eq!(body["user"]["fullName"], "Updated Name");
        assert_eq!(body["user"]["email"], "updated@example.com");

        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/users/change-password",
            Some(&token),
            Some(json!({ "currentPassword": "wrong1", "newPassword": "another1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("Current password is incorrect"));

        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/users/change-password",
            Some(&token),
            Some(json!({ "currentPassword": "secret1", "newPassword": "another1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Password updated successfully");

        let (status, _) = login(&app, "updated@example.com", "another1").await;
        assert_eq!(status, StatusCode::OK);
        // old token keeps working after the change
        let (status, _) = call(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_routes_refuse_regular_users() {
        let (app, _, _) = app_with_admin().await;
        let (_, body) = signup(&app, "Regular", "user@example.com", "secret1").await;
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) = call(&app, Method::GET, "/api/users", Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["message"].as_str().unwrap().contains("Admin access only"));

        let (status, _) = call(&app, Method::GET, "/api/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_lists_users_by_page() {
        let (app, state, admin_token) = app_with_admin().await;
        for i in 1..=15 {
            state
                .store
                .create(NewUser {
                    full_name: format!("User {i}"),
                    email: format!("user{i}@example.com"),
                    password_hash: HashedPassword::for_tests("$argon2id$stub"),
                    role: Role::User,
                })
                .await
                .unwrap();
        }

        let (status, body) = call(
            &app,
            Method::GET,
            "/api/users?page=1&limit=10",
            Some(&admin_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["users"].as_array().unwrap().len(), 10);
        assert_eq!(body["pagination"]["page"], 1);
        assert_eq!(body["pagination"]["limit"], 10);
        let total = body["pagination"]["total"].as_i64().unwrap();
        assert!(total >= 15);
        assert_eq!(body["pagination"]["pages"].as_i64().unwrap(), (total + 9) / 10);
        assert!(body["users"][0].get("passwordHash").is_none());

        let (status, body) = call(
            &app,
            Method::GET,
            "/api/users?page=zz&limit=",
            Some(&admin_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["page"], 1);
        assert_eq!(body["pagination"]["limit"], 10);
    }

    #[tokio::test]
    async fn deactivation_blocks_login_but_not_existing_token() {
        let (app, state, admin_token) = app_with_admin().await;
        AuthService::from_ref(&state)
            .ensure_admin("Second Admin", "second@example.com", "secondpass")
            .await
            .unwrap();
        let (_, body) = login(&app, "second@example.com", "secondpass").await;
        let second_token = body["token"].as_str().unwrap().to_string();
        let second_id = body["user"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            Method::PATCH,
            &format!("/api/users/{second_id}/deactivate"),
            Some(&admin_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User deactivated");
        assert_eq!(body["user"]["status"], "inactive");

        // no revocation: the token issued before deactivation still works
        let (status, _) = call(&app, Method::GET, "/api/users", Some(&second_token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = login(&app, "second@example.com", "secondpass").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].as_str().unwrap().contains("inactive"));

        let (status, body) = call(
            &app,
            Method::PATCH,
            &format!("/api/users/{second_id}/activate"),
            Some(&admin_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User activated");
        let (status, _) = login(&app, "second@example.com", "secondpass").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn status_change_for_unknown_user_is_404() {
        let (app, _, admin_token) = app_with_admin().await;
        let unknown = uuid::Uuid::new_v4();
        let (status, body) = call(
            &app,
            Method::PATCH,
            &format!("/api/users/{unknown}/activate"),
            Some(&admin_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "User not found");

        let (status, _) = call(
            &app,
            Method::PATCH,
            "/api/users/not-a-uuid/deactivate",
            Some(&admin_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    async fn post_raw(
        app: &Router,
        uri: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(Method::POST).uri(uri);
        if let Some(content_type) = content_type {
            req = req.header(header::CONTENT_TYPE, content_type);
        }
        send(app, req.body(Body::from(body.to_string())).unwrap()).await
    }

    #[tokio::test]
    async fn unreadable_bodies_are_400_with_message() {
        let app = build_app(AppState::fake());
        let cases = [
            (
                Some("application/json"),
                r#"{"fullName": null, "email": "n@example.com", "password": "secret1"}"#,
            ),
            (
                Some("application/json"),
                r#"{"fullName": "Num", "email": 5, "password": "secret1"}"#,
            ),
            (Some("application/json"), "{not json"),
            (None, r#"{"fullName": "Jo", "email": "jo@example.com", "password": "secret1"}"#),
            (Some("text/plain"), r#"{"email": "jo@example.com", "password": "secret1"}"#),
        ];
        for (content_type, body) in cases {
            let (status, json) = post_raw(&app, "/api/auth/signup", content_type, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{content_type:?} {body}");
            assert!(json["message"].is_string(), "{content_type:?} {body} -> {json}");
        }

        let (status, json) = post_raw(&app, "/api/auth/login", None, "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["message"].as_str().unwrap().contains("Content-Type"));
    }

    #[tokio::test]
    async fn unreadable_profile_bodies_are_400_with_message() {
        let app = build_app(AppState::fake());
        let (_, body) = signup(&app, "Jane", "jane@example.com", "secret1").await;
        let token = body["token"].as_str().unwrap().to_string();

        for uri in ["/api/users/profile", "/api/users/change-password"] {
            let req = Request::builder()
                .method(Method::PUT)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"fullName": 7, "currentPassword": null}"#))
                .unwrap();
            let (status, json) = send(&app, req).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(json["message"].is_string(), "{uri} -> {json}");
        }
    }

    fn app_with_frontend(frontend_url: &str) -> Router {
        let fake = AppState::fake();
        let mut config = (*fake.config).clone();
        config.frontend_url = Some(frontend_url.to_string());
        build_app(AppState::from_parts(Arc::new(config), fake.store.clone()).unwrap())
    }

    #[tokio::test]
    async fn cors_preflight_allows_only_the_configured_origin() {
        let app = app_with_frontend("http://localhost:3000/");
        let preflight = |origin: &str| {
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/auth/login")
                .header(header::ORIGIN, origin)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,authorization")
                .body(Body::empty())
                .unwrap()
        };

        let resp = app.clone().oneshot(preflight("http://localhost:3000")).await.unwrap();
        assert!(resp.status().is_success());
        let headers = resp.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

        let resp = app.clone().oneshot(preflight("http://evil.example")).await.unwrap();
        assert!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn cors_is_permissive_without_frontend() {
        let app = build_app(AppState::fake());
        let req = Request::builder()
            .uri("/api/health")
            .header(header::ORIGIN, "http://anywhere.example")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
