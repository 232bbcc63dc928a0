//! User model - identities that can sign in to any registered application.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// User entity.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_utc: DateTime<Utc>,
}

impl User {
    /// Create a new user with a freshly generated id.
    pub fn new(email: String, password_hash: String) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email,
            password_hash,
            created_utc: Utc::now(),
        }
    }
}

/// A user together with the permissions granted to them in one application.
#[derive(Debug, Clone)]
pub struct UserWithGrants {
    pub user: User,
    pub permissions: Vec<super::Permission>,
}

impl UserWithGrants {
    /// Sorted, de-duplicated permission names embedded into access tokens.
    pub fn permission_snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.permissions.iter().map(|p| p.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Permission;

    #[test]
    fn snapshot_is_sorted_and_unique() {
        let app_id = Uuid::new_v4();
        let grants = UserWithGrants {
            user: User::new("a@example.com".to_string(), "hash".to_string()),
            permissions: vec![
                Permission::new(app_id, "write".to_string()),
                Permission::new(app_id, "admin".to_string()),
                Permission::new(app_id, "write".to_string()),
            ],
        };

        assert_eq!(grants.permission_snapshot(), vec!["admin", "write"]);
    }
}
