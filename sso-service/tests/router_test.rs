mod common;

use common::{test_config, TestApp, TEST_ADMIN_API_KEY};
use serde_json::json;
use service_core::axum::http::StatusCode;

async fn register_and_login(app: &TestApp, email: &str) -> serde_json::Value {
    let (status, _) = app
        .request(
            "POST",
            "/auth/register",
            Some(json!({ "email": email, "password": "pw" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .request(
            "POST",
            "/auth/login",
            Some(json!({ "email": email, "password": "pw", "app_id": app.app_id() })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn register_returns_created_with_user_id() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .request(
            "POST",
            "/auth/register",
            Some(json!({ "email": "a@example.com", "password": "pw" })),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body["user_id"].as_str().is_some());

    let (status, body) = app
        .request(
            "POST",
            "/auth/register",
            Some(json!({ "email": "a@example.com", "password": "pw" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "User already exists");
}

#[tokio::test]
async fn invalid_email_is_unprocessable() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .request(
            "POST",
            "/auth/register",
            Some(json!({ "email": "not-an-email", "password": "pw" })),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Validation error");
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .request("POST", "/auth/login", Some(json!({ "email": 5 })), None)
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_refresh_logout_over_http() {
    let app = TestApp::spawn().await;
    let pair = register_and_login(&app, "b@example.com").await;
    assert_eq!(pair["token_type"], "Bearer");

    let refresh_body = json!({ "refresh_token": pair["refresh_token"], "app_id": app.app_id() });
    let (status, _) = app
        .request("POST", "/auth/refresh", Some(refresh_body.clone()), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .request("POST", "/auth/refresh", Some(refresh_body), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token revoked");

    let logout = json!({ "email": "b@example.com", "app_id": app.app_id() });
    let (status, body) = app
        .request("POST", "/auth/logout", Some(logout.clone()), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = app.request("POST", "/auth/logout", Some(logout), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::spawn().await;
    register_and_login(&app, "c@example.com").await;

    let (status, body) = app
        .request(
            "POST",
            "/auth/login",
            Some(json!({ "email": "c@example.com", "password": "nope", "app_id": app.app_id() })),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password");
}

#[tokio::test]
async fn exhausted_bucket_is_too_many_requests() {
    let mut config = test_config();
    config.rate_limit.register_burst = 1;
    config.rate_limit.register_refill_seconds = 3600;
    let app = TestApp::with_config(config).await;

    let (first, _) = app
        .request(
            "POST",
            "/auth/register",
            Some(json!({ "email": "d1@example.com", "password": "pw" })),
            None,
        )
        .await;
    let (second, _) = app
        .request(
            "POST",
            "/auth/register",
            Some(json!({ "email": "d2@example.com", "password": "pw" })),
            None,
        )
        .await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn cache_outage_is_service_unavailable() {
    let app = TestApp::spawn().await;
    app.request(
        "POST",
        "/auth/register",
        Some(json!({ "email": "e@example.com", "password": "pw" })),
        None,
    )
    .await;

    app.cache.fail_writes(true);
    let (status, _) = app
        .request(
            "POST",
            "/auth/login",
            Some(json!({ "email": "e@example.com", "password": "pw", "app_id": app.app_id() })),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn admin_routes_require_api_key() {
    let app = TestApp::spawn().await;
    let uri = format!("/apps/{}/permissions", app.app_id());

    let (status, _) = app
        .request("POST", &uri, Some(json!({ "name": "read" })), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request("POST", &uri, Some(json!({ "name": "read" })), Some("wrong-key"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .request(
            "POST",
            &uri,
            Some(json!({ "name": "read" })),
            Some(TEST_ADMIN_API_KEY),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["permission_id"].as_str().is_some());
}

#[tokio::test]
async fn permission_and_grant_lifecycle_over_http() {
    let app = TestApp::spawn().await;
    register_and_login(&app, "f@example.com").await;
    let base = format!("/apps/{}", app.app_id());

    let (status, body) = app
        .request(
            "POST",
            &format!("{}/permissions", base),
            Some(json!({ "name": "reports:view" })),
            Some(TEST_ADMIN_API_KEY),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let permission_id = body["permission_id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(
            "POST",
            &format!("{}/permissions", base),
            Some(json!({ "name": "reports:view" })),
            Some(TEST_ADMIN_API_KEY),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .request(
            "GET",
            &format!("{}/permissions", base),
            None,
            Some(TEST_ADMIN_API_KEY),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["name"], "reports:view");

    let grant = json!({ "email": "f@example.com", "permission_id": permission_id });
    let (status, pair) = app
        .request(
            "POST",
            &format!("{}/grants", base),
            Some(grant.clone()),
            Some(TEST_ADMIN_API_KEY),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, introspected) = app
        .request(
            "POST",
            "/auth/introspect",
            Some(json!({ "token": pair["access_token"], "app_id": app.app_id() })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(introspected["active"], true);
    assert_eq!(introspected["permissions"], json!(["reports:view"]));

    let (status, _) = app
        .request(
            "DELETE",
            &format!("{}/grants", base),
            Some(grant),
            Some(TEST_ADMIN_API_KEY),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .request(
            "DELETE",
            &format!("{}/permissions/{}", base, permission_id),
            None,
            Some(TEST_ADMIN_API_KEY),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = app
        .request(
            "DELETE",
            &format!("{}/permissions/{}", base, permission_id),
            None,
            Some(TEST_ADMIN_API_KEY),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_application_is_not_found_for_admin_routes() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .request(
            "GET",
            &format!("/apps/{}/permissions", uuid::Uuid::new_v4()),
            None,
            Some(TEST_ADMIN_API_KEY),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Application not found");
}

#[tokio::test]
async fn health_reports_dependencies() {
    let app = TestApp::spawn().await;

    let (status, body) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "sso-service-test");

    app.store.set_unavailable(true);
    let (status, _) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::spawn().await;

    let (status, body) = app
        .request("GET", "/.well-known/openapi.json", None, None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/auth/login"].is_object());
    assert!(body["paths"]["/apps/{app_id}/grants"].is_object());
}

#[tokio::test]
async fn responses_carry_request_id_and_security_headers() {
    use service_core::axum::{body::Body, http::Request};
    use tower::ServiceExt;

    let app = TestApp::spawn().await;
    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-forwarded-for", "10.9.9.9")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("req-123")
    );
    assert_eq!(
        response
            .headers()
            .get("x-content-type-options")
            .and_then(|v| v.to_str().ok()),
        Some("nosniff")
    );
}
