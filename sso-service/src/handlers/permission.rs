use service_core::{
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        Json,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    dtos::{
        auth::OperationResponse,
        permission::{CreatePermissionRequest, CreatePermissionResponse, GrantRequest},
    },
    utils::ValidatedJson,
    AppState,
};

/// Create a permission in an application
#[utoipa::path(
    post,
    path = "/apps/{app_id}/permissions",
    params(("app_id" = Uuid, Path, description = "Application id")),
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Permission created", body = CreatePermissionResponse),
        (status = 401, description = "Missing or invalid admin API key"),
        (status = 404, description = "Application not found", body = ErrorResponse),
        (status = 409, description = "Permission name taken", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("admin_api_key" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    Path(app_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreatePermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let permission_id = state.auth_service.add_permission(app_id, &req.name).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatePermissionResponse { permission_id }),
    ))
}

/// List the permissions of an application
#[utoipa::path(
    get,
    path = "/apps/{app_id}/permissions",
    params(("app_id" = Uuid, Path, description = "Application id")),
    responses(
        (status = 200, description = "Permissions ordered by name", body = [Permission]),
        (status = 401, description = "Missing or invalid admin API key"),
        (status = 404, description = "Application not found", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("admin_api_key" = []))
)]
pub async fn list_permissions(
    State(state): State<AppState>,
    Path(app_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let permissions = state.auth_service.list_permissions(app_id).await?;
    Ok((StatusCode::OK, Json(permissions)))
}

/// Delete a permission and every grant of it
#[utoipa::path(
    delete,
    path = "/apps/{app_id}/permissions/{permission_id}",
    params(
        ("app_id" = Uuid, Path, description = "Application id"),
        ("permission_id" = Uuid, Path, description = "Permission id")
    ),
    responses(
        (status = 200, description = "Permission deleted", body = OperationResponse),
        (status = 401, description = "Missing or invalid admin API key"),
        (status = 404, description = "Permission not found", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("admin_api_key" = []))
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    Path((app_id, permission_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    state
        .auth_service
        .remove_permission(app_id, permission_id)
        .await?;
    Ok((StatusCode::OK, Json(OperationResponse { success: true })))
}

/// Grant a permission and reissue the user's token pair
#[utoipa::path(
    post,
    path = "/apps/{app_id}/grants",
    params(("app_id" = Uuid, Path, description = "Application id")),
    request_body = GrantRequest,
    responses(
        (status = 200, description = "Granted; fresh pair for the user", body = TokenPair),
        (status = 401, description = "Missing or invalid admin API key"),
        (status = 404, description = "User, application or permission not found", body = ErrorResponse),
        (status = 503, description = "Session cache unavailable", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("admin_api_key" = []))
)]
pub async fn grant_permission(
    State(state): State<AppState>,
    Path(app_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<GrantRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = state
        .auth_service
        .grant_permission(&req.email, app_id, req.permission_id)
        .await?;
    Ok((StatusCode::OK, Json(pair)))
}

/// Revoke a permission and reissue the user's token pair
#[utoipa::path(
    delete,
    path = "/apps/{app_id}/grants",
    params(("app_id" = Uuid, Path, description = "Application id")),
    request_body = GrantRequest,
    responses(
        (status = 200, description = "Revoked; fresh pair for the user", body = TokenPair),
        (status = 401, description = "Missing or invalid admin API key"),
        (status = 404, description = "User, application or permission not found", body = ErrorResponse),
        (status = 503, description = "Session cache unavailable", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("admin_api_key" = []))
)]
pub async fn revoke_permission(
    State(state): State<AppState>,
    Path(app_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<GrantRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = state
        .auth_service
        .revoke_permission(&req.email, app_id, req.permission_id)
        .await?;
    Ok((StatusCode::OK, Json(pair)))
}
