use service_core::error::AppError;
use thiserror::Error;

use super::database::{Entity, StoreError};
use super::jwt::TokenError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Too many requests")]
    RateLimited,

    #[error("User already exists")]
    UserExists,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Cache unavailable during {op}: {source}")]
    CacheUnavailable {
        op: &'static str,
        source: anyhow::Error,
    },

    #[error("Store unavailable during {op}: {source}")]
    StoreUnavailable {
        op: &'static str,
        source: anyhow::Error,
    },

    #[error("Permission not found")]
    PermissionNotFound,

    #[error("Permission already exists")]
    PermissionExists,

    #[error("User not found")]
    UserNotFound,

    #[error("Application not found")]
    ApplicationNotFound,

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn cache(op: &'static str, source: anyhow::Error) -> Self {
        ServiceError::CacheUnavailable { op, source }
    }

    /// Map a store failure that has no domain meaning for the calling
    /// operation.
    pub fn store(op: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(source) => ServiceError::StoreUnavailable { op, source },
            StoreError::NotFound(Entity::User) => ServiceError::UserNotFound,
            StoreError::NotFound(Entity::Permission) => ServiceError::PermissionNotFound,
            StoreError::NotFound(Entity::Application) => ServiceError::ApplicationNotFound,
            StoreError::AlreadyExists(Entity::User) => ServiceError::UserExists,
            StoreError::AlreadyExists(Entity::Permission) => ServiceError::PermissionExists,
            StoreError::AlreadyExists(Entity::Application) => ServiceError::Internal(
                anyhow::anyhow!("{}: application already exists", op),
            ),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => ServiceError::TokenInvalid,
            TokenError::Expired => ServiceError::TokenExpired,
            TokenError::Signing(msg) => ServiceError::Signing(msg),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::RateLimited => {
                AppError::TooManyRequests("Too many requests".to_string(), None)
            }
            ServiceError::UserExists => AppError::Conflict(anyhow::anyhow!("User already exists")),
            ServiceError::PermissionExists => {
                AppError::Conflict(anyhow::anyhow!("Permission already exists"))
            }
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::TokenInvalid => AppError::AuthError(anyhow::anyhow!("Invalid token")),
            ServiceError::TokenExpired => AppError::AuthError(anyhow::anyhow!("Token expired")),
            ServiceError::TokenRevoked => AppError::AuthError(anyhow::anyhow!("Token revoked")),
            ServiceError::PermissionNotFound => {
                AppError::NotFound(anyhow::anyhow!("Permission not found"))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::ApplicationNotFound => {
                AppError::NotFound(anyhow::anyhow!("Application not found"))
            }
            ServiceError::CacheUnavailable { op, source } => {
                tracing::error!(op, error = %source, "Refresh cache unavailable");
                AppError::ServiceUnavailable("Session cache unavailable, retry".to_string())
            }
            ServiceError::StoreUnavailable { op, source } => {
                tracing::error!(op, error = %source, "Permission store unavailable");
                AppError::ServiceUnavailable("Database unavailable, retry".to_string())
            }
            ServiceError::Signing(msg) => {
                AppError::InternalError(anyhow::anyhow!("Token signing failed: {}", msg))
            }
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::http::StatusCode;

    #[test]
    fn credential_and_token_errors_are_unauthorized() {
        for err in [
            ServiceError::InvalidCredentials,
            ServiceError::TokenInvalid,
            ServiceError::TokenExpired,
            ServiceError::TokenRevoked,
        ] {
            assert_eq!(AppError::from(err).status_code(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn adapter_failures_are_service_unavailable() {
        let cache = ServiceError::cache("rotate.set_active", anyhow::anyhow!("connection reset"));
        assert_eq!(
            AppError::from(cache).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let store = ServiceError::store(
            "register.create_user",
            StoreError::Unavailable(anyhow::anyhow!("pool timed out")),
        );
        assert_eq!(
            AppError::from(store).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn store_not_found_maps_to_domain_kind() {
        assert!(matches!(
            ServiceError::store("grant", StoreError::NotFound(Entity::Permission)),
            ServiceError::PermissionNotFound
        ));
        assert!(matches!(
            ServiceError::store("register", StoreError::AlreadyExists(Entity::User)),
            ServiceError::UserExists
        ));
    }

    #[test]
    fn rate_limited_is_429() {
        assert_eq!(
            AppError::from(ServiceError::RateLimited).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
