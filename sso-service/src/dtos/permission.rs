use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePermissionRequest {
    #[validate(length(min = 1, max = 128, message = "Permission name is required"))]
    #[schema(example = "invoices:read")]
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatePermissionResponse {
    pub permission_id: Uuid,
}

/// Grant or revoke one permission for a user of the application in the path.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GrantRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    pub permission_id: Uuid,
}
