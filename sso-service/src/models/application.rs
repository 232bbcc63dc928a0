//! Application model - relying parties that tokens are issued for.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Relying party; `signing_secret` is the HMAC key for its tokens.
#[derive(Clone, FromRow)]
pub struct Application {
    pub app_id: Uuid,
    pub app_name: String,
    pub signing_secret: String,
    pub created_utc: DateTime<Utc>,
}

impl Application {
    /// Build an application, rejecting a nil id, empty name or empty secret.
    pub fn new(app_id: Uuid, app_name: String, signing_secret: String) -> Option<Self> {
        if app_id.is_nil() || app_name.trim().is_empty() || signing_secret.is_empty() {
            return None;
        }
        Some(Self {
            app_id,
            app_name,
            signing_secret,
            created_utc: Utc::now(),
        })
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("app_id", &self.app_id)
            .field("app_name", &self.app_name)
            .field("signing_secret", &"[REDACTED]")
            .field("created_utc", &self.created_utc)
            .finish()
    }
}
