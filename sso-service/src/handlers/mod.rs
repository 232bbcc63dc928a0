//! HTTP handlers for sso-service.

pub mod auth;
pub mod permission;

pub use auth::*;
pub use permission::*;
