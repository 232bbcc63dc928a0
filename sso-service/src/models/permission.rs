//! Permission model - named rights scoped to one application.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Permission entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow, ToSchema)]
pub struct Permission {
    pub permission_id: Uuid,
    pub app_id: Uuid,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

impl Permission {
    /// Create a new permission with a freshly generated id.
    pub fn new(app_id: Uuid, name: String) -> Self {
        Self {
            permission_id: Uuid::new_v4(),
            app_id,
            name,
            created_utc: Utc::now(),
        }
    }
}
