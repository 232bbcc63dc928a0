pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Json, Router,
};
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    request_id::{request_id_middleware, REQUEST_ID_HEADER},
    security_headers::security_headers_middleware,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::SsoConfig;
use crate::services::{AuthService, JwtService, PermissionStore, RateGate, RefreshCache};
use service_core::error::AppError;
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::refresh,
        handlers::auth::introspect,
        handlers::permission::create_permission,
        handlers::permission::list_permissions,
        handlers::permission::delete_permission,
        handlers::permission::grant_permission,
        handlers::permission::revoke_permission,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LogoutRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::IntrospectRequest,
            dtos::auth::IntrospectResponse,
            dtos::auth::OperationResponse,
            dtos::permission::CreatePermissionRequest,
            dtos::permission::CreatePermissionResponse,
            dtos::permission::GrantRequest,
            models::TokenPair,
            models::Permission,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, login and token rotation"),
        (name = "Permissions", description = "Per-application permissions and grants"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    middleware::ADMIN_API_KEY_HEADER,
                ))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: SsoConfig,
    pub auth_service: AuthService,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire the orchestrator from its collaborators and the configured
    /// limits.
    pub fn new(
        config: SsoConfig,
        store: Arc<dyn PermissionStore>,
        cache: Arc<dyn RefreshCache>,
    ) -> Self {
        let jwt = JwtService::from_config(&config.jwt);
        let rate_gate = RateGate::new(&config.rate_limit);
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        Self {
            auth_service: AuthService::new(store, cache, jwt, rate_gate),
            ip_rate_limiter,
            config,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/apps/:app_id/permissions",
            post(handlers::create_permission).get(handlers::list_permissions),
        )
        .route(
            "/apps/:app_id/permissions/:permission_id",
            delete(handlers::delete_permission),
        )
        .route(
            "/apps/:app_id/grants",
            post(handlers::grant_permission).delete(handlers::revoke_permission),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/introspect", post(handlers::introspect))
        .merge(admin_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(middleware::ADMIN_API_KEY_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ]);

    // Only reachable outside prod; config validation rejects it there
    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Store and cache reachable"),
        (status = 503, description = "A dependency is down")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.auth_service.health_check().await?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "postgres": "up",
            "redis": "up"
        }
    })))
}
