use service_core::{
    axum::{extract::State, http::StatusCode, response::IntoResponse, Json},
    error::AppError,
};

use crate::{
    dtos::auth::{
        IntrospectRequest, LoginRequest, LogoutRequest, OperationResponse, RefreshRequest,
        RegisterRequest, RegisterResponse,
    },
    utils::{Password, ValidatedJson},
    AppState,
};

/// Register a new user
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many registrations", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = state
        .auth_service
        .register(&req.email, Password::new(req.password))
        .await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })))
}

/// Login with email and password for one application
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenPair),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many login attempts", body = ErrorResponse),
        (status = 503, description = "Session cache unavailable", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = state
        .auth_service
        .login(&req.email, Password::new(req.password), req.app_id)
        .await?;
    Ok((StatusCode::OK, Json(pair)))
}

/// End the session of a user in one application
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out", body = OperationResponse),
        (status = 503, description = "Session cache unavailable", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LogoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.logout(&req.email, req.app_id).await?;
    Ok((StatusCode::OK, Json(OperationResponse { success: true })))
}

/// Exchange the active refresh token for a new pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed", body = TokenPair),
        (status = 401, description = "Invalid, expired or superseded token", body = ErrorResponse),
        (status = 503, description = "Session cache unavailable", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = state
        .auth_service
        .refresh(&req.refresh_token, req.app_id)
        .await?;
    Ok((StatusCode::OK, Json(pair)))
}

/// Check whether an access token is active
#[utoipa::path(
    post,
    path = "/auth/introspect",
    request_body = IntrospectRequest,
    responses(
        (status = 200, description = "Introspection result", body = IntrospectResponse)
    ),
    tag = "Authentication"
)]
pub async fn introspect(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<IntrospectRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.introspect(&req.token, req.app_id).await;
    Ok((StatusCode::OK, Json(res)))
}
