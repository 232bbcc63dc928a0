use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use subtle::ConstantTimeEq;

pub const ADMIN_API_KEY_HEADER: &str = "x-admin-api-key";

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let api_key = headers
        .get(ADMIN_API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    let expected = state.config.security.admin_api_key.as_bytes();
    match api_key {
        Some(key) if bool::from(key.as_bytes().ct_eq(expected)) => next.run(request).await,
        _ => {
            tracing::warn!(path = %request.uri().path(), "Failed admin authentication attempt");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized: Invalid or missing admin API key" })),
            )
                .into_response()
        }
    }
}
