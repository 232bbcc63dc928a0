//! Services layer for sso-service.
//!
//! The orchestrator ([`AuthService`]) plus the collaborators it drives:
//! permission store, refresh cache, token issuer and rate gate.

mod auth;
pub mod database;
pub mod error;
mod jwt;
pub mod rate_gate;
pub mod redis;

pub use auth::AuthService;
pub use database::{Database, Entity, InMemoryStore, PermissionStore, StoreError};
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, RefreshTokenClaims, TokenError, TokenUse};
pub use rate_gate::{Operation, RateGate};
pub use redis::{MockRefreshCache, RedisService, RefreshCache, SessionKey};
