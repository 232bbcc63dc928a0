//! Durable store for users, applications, permissions and grants.
//!
//! [`PermissionStore`] is the capability the orchestrator consumes.
//! [`Database`] implements it on PostgreSQL with sqlx; [`InMemoryStore`]
//! implements it for tests.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{Application, Permission, User, UserWithGrants};

/// Entity a store error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Application,
    Permission,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::User => f.write_str("user"),
            Entity::Application => f.write_str("application"),
            Entity::Permission => f.write_str("permission"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(Entity),

    #[error("{0} already exists")]
    AlreadyExists(Entity),

    #[error("store unavailable: {0}")]
    Unavailable(anyhow::Error),
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// The user plus the permissions granted to them inside `app_id`.
    async fn get_user_with_grants(
        &self,
        email: &str,
        app_id: Uuid,
    ) -> Result<UserWithGrants, StoreError>;

    async fn create_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_application(&self, app_id: Uuid) -> Result<Application, StoreError>;

    /// Insert the application or refresh its name and secret.
    async fn ensure_application(&self, app: &Application) -> Result<(), StoreError>;

    async fn create_permission(&self, permission: &Permission) -> Result<(), StoreError>;

    /// Delete a permission of `app_id`; its grants go with it.
    async fn delete_permission(&self, app_id: Uuid, permission_id: Uuid)
        -> Result<(), StoreError>;

    /// Grant is a set insert: granting twice is not an error.
    async fn add_grant(
        &self,
        email: &str,
        app_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError>;

    /// Removing an absent grant is not an error.
    async fn remove_grant(
        &self,
        email: &str,
        app_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn list_application_permissions(
        &self,
        app_id: Uuid,
    ) -> Result<Vec<Permission>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(anyhow::Error::new(e))
}

fn classify(e: sqlx::Error, entity: Entity, parent: Entity) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return StoreError::AlreadyExists(entity);
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::NotFound(parent);
        }
    }
    unavailable(e)
}

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Wrap an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open the permission store's pool. Connections are recycled every half
    /// hour so a failed-over primary is picked up.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            "Connecting permission store to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.url)
            .await?;

        Ok(Self::new(pool))
    }

    /// Bring the users, applications, permissions and grants tables up to
    /// date.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Permission store schema is current");
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_user_id(
        conn: &mut sqlx::PgConnection,
        email: &str,
    ) -> Result<Uuid, StoreError> {
        sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(conn)
            .await
            .map_err(unavailable)?
            .ok_or(StoreError::NotFound(Entity::User))
    }

    async fn ensure_permission_in_app(
        conn: &mut sqlx::PgConnection,
        app_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT permission_id FROM permissions WHERE permission_id = $1 AND app_id = $2",
        )
        .bind(permission_id)
        .bind(app_id)
        .fetch_optional(conn)
        .await
        .map_err(unavailable)?
        .map(|_| ())
        .ok_or(StoreError::NotFound(Entity::Permission))
    }
}

#[async_trait]
impl PermissionStore for Database {
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT user_id, email, password_hash, created_utc FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?
        .ok_or(StoreError::NotFound(Entity::User))
    }

    async fn get_user_with_grants(
        &self,
        email: &str,
        app_id: Uuid,
    ) -> Result<UserWithGrants, StoreError> {
        let user = self.get_user_by_email(email).await?;

        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.permission_id, p.app_id, p.name, p.created_utc
            FROM permissions p
            JOIN user_permissions up ON up.permission_id = p.permission_id
            WHERE up.user_id = $1 AND p.app_id = $2
            ORDER BY p.name
            "#,
        )
        .bind(user.user_id)
        .bind(app_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(UserWithGrants { user, permissions })
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, password_hash, created_utc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, Entity::User, Entity::User))?;
        Ok(())
    }

    async fn get_application(&self, app_id: Uuid) -> Result<Application, StoreError> {
        sqlx::query_as::<_, Application>(
            "SELECT app_id, app_name, signing_secret, created_utc FROM applications WHERE app_id = $1",
        )
        .bind(app_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?
        .ok_or(StoreError::NotFound(Entity::Application))
    }

    async fn ensure_application(&self, app: &Application) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO applications (app_id, app_name, signing_secret, created_utc)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (app_id) DO UPDATE
            SET app_name = EXCLUDED.app_name, signing_secret = EXCLUDED.signing_secret
            "#,
        )
        .bind(app.app_id)
        .bind(&app.app_name)
        .bind(&app.signing_secret)
        .bind(app.created_utc)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn create_permission(&self, permission: &Permission) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO permissions (permission_id, app_id, name, created_utc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(permission.permission_id)
        .bind(permission.app_id)
        .bind(&permission.name)
        .bind(permission.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, Entity::Permission, Entity::Application))?;
        Ok(())
    }

    async fn delete_permission(
        &self,
        app_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM permissions WHERE permission_id = $1 AND app_id = $2")
            .bind(permission_id)
            .bind(app_id)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(Entity::Permission));
        }
        Ok(())
    }

    async fn add_grant(
        &self,
        email: &str,
        app_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let user_id = Self::find_user_id(&mut tx, email).await?;
        Self::ensure_permission_in_app(&mut tx, app_id, permission_id).await?;

        sqlx::query(
            r#"
            INSERT INTO user_permissions (user_id, permission_id, app_id, granted_utc)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, permission_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(permission_id)
        .bind(app_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify(e, Entity::Permission, Entity::Permission))?;

        tx.commit().await.map_err(unavailable)
    }

    async fn remove_grant(
        &self,
        email: &str,
        app_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let user_id = Self::find_user_id(&mut tx, email).await?;
        Self::ensure_permission_in_app(&mut tx, app_id, permission_id).await?;

        sqlx::query("DELETE FROM user_permissions WHERE user_id = $1 AND permission_id = $2")
            .bind(user_id)
            .bind(permission_id)
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)
    }

    async fn list_application_permissions(
        &self,
        app_id: Uuid,
    ) -> Result<Vec<Permission>, StoreError> {
        sqlx::query_as::<_, Permission>(
            "SELECT permission_id, app_id, name, created_utc FROM permissions WHERE app_id = $1 ORDER BY name",
        )
        .bind(app_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                unavailable(e)
            })?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    applications: HashMap<Uuid, Application>,
    permissions: HashMap<Uuid, Permission>,
    grants: HashSet<(Uuid, Uuid)>,
}

impl MemoryState {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
    }

    fn permission_in_app(&self, app_id: Uuid, permission_id: Uuid) -> Option<&Permission> {
        self.permissions
            .get(&permission_id)
            .filter(|p| p.app_id == app_id)
    }
}

/// In-process [`PermissionStore`] with the same semantics as [`Database`].
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(anyhow::anyhow!(
                "in-memory store marked unavailable"
            )));
        }
        self.state.lock().map_err(|e| {
            StoreError::Unavailable(anyhow::anyhow!("In-memory store mutex poisoned: {}", e))
        })
    }
}

#[async_trait]
impl PermissionStore for InMemoryStore {
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.lock()?
            .user_by_email(email)
            .cloned()
            .ok_or(StoreError::NotFound(Entity::User))
    }

    async fn get_user_with_grants(
        &self,
        email: &str,
        app_id: Uuid,
    ) -> Result<UserWithGrants, StoreError> {
        let state = self.lock()?;
        let user = state
            .user_by_email(email)
            .cloned()
            .ok_or(StoreError::NotFound(Entity::User))?;

        let mut permissions: Vec<Permission> = state
            .grants
            .iter()
            .filter(|(user_id, _)| *user_id == user.user_id)
            .filter_map(|(_, permission_id)| state.permission_in_app(app_id, *permission_id))
            .cloned()
            .collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(UserWithGrants { user, permissions })
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.user_by_email(&user.email).is_some() || state.users.contains_key(&user.user_id) {
            return Err(StoreError::AlreadyExists(Entity::User));
        }
        state.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn get_application(&self, app_id: Uuid) -> Result<Application, StoreError> {
        self.lock()?
            .applications
            .get(&app_id)
            .cloned()
            .ok_or(StoreError::NotFound(Entity::Application))
    }

    async fn ensure_application(&self, app: &Application) -> Result<(), StoreError> {
        self.lock()?.applications.insert(app.app_id, app.clone());
        Ok(())
    }

    async fn create_permission(&self, permission: &Permission) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.applications.contains_key(&permission.app_id) {
            return Err(StoreError::NotFound(Entity::Application));
        }
        let duplicate = state
            .permissions
            .values()
            .any(|p| p.app_id == permission.app_id && p.name == permission.name);
        if duplicate || state.permissions.contains_key(&permission.permission_id) {
            return Err(StoreError::AlreadyExists(Entity::Permission));
        }
        state
            .permissions
            .insert(permission.permission_id, permission.clone());
        Ok(())
    }

    async fn delete_permission(
        &self,
        app_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.permission_in_app(app_id, permission_id).is_none() {
            return Err(StoreError::NotFound(Entity::Permission));
        }
        state.permissions.remove(&permission_id);
        state.grants.retain(|(_, granted)| *granted != permission_id);
        Ok(())
    }

    async fn add_grant(
        &self,
        email: &str,
        app_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let user_id = state
            .user_by_email(email)
            .map(|u| u.user_id)
            .ok_or(StoreError::NotFound(Entity::User))?;
        if state.permission_in_app(app_id, permission_id).is_none() {
            return Err(StoreError::NotFound(Entity::Permission));
        }
        state.grants.insert((user_id, permission_id));
        Ok(())
    }

    async fn remove_grant(
        &self,
        email: &str,
        app_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let user_id = state
            .user_by_email(email)
            .map(|u| u.user_id)
            .ok_or(StoreError::NotFound(Entity::User))?;
        if state.permission_in_app(app_id, permission_id).is_none() {
            return Err(StoreError::NotFound(Entity::Permission));
        }
        state.grants.remove(&(user_id, permission_id));
        Ok(())
    }

    async fn list_application_permissions(
        &self,
        app_id: Uuid,
    ) -> Result<Vec<Permission>, StoreError> {
        let state = self.lock()?;
        let mut permissions: Vec<Permission> = state
            .permissions
            .values()
            .filter(|p| p.app_id == app_id)
            .cloned()
            .collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> Application {
        Application::new(Uuid::new_v4(), "billing".into(), "secret".into()).unwrap()
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let store = InMemoryStore::new();
        let user = User::new("Alice@Example.com".into(), "hash".into());
        store.create_user(&user).await.unwrap();

        let found = store.get_user_by_email("alice@example.com").await.unwrap();
        assert_eq!(found.user_id, user.user_id);

        let dup = User::new("ALICE@example.com".into(), "hash".into());
        assert!(matches!(
            store.create_user(&dup).await,
            Err(StoreError::AlreadyExists(Entity::User))
        ));
    }

    #[tokio::test]
    async fn grants_are_scoped_to_their_application() {
        let store = InMemoryStore::new();
        let billing = app();
        let other = app();
        store.ensure_application(&billing).await.unwrap();
        store.ensure_application(&other).await.unwrap();

        let user = User::new("bob@example.com".into(), "hash".into());
        store.create_user(&user).await.unwrap();

        let read = Permission::new(billing.app_id, "read".into());
        store.create_permission(&read).await.unwrap();

        assert!(matches!(
            store
                .add_grant("bob@example.com", other.app_id, read.permission_id)
                .await,
            Err(StoreError::NotFound(Entity::Permission))
        ));

        store
            .add_grant("bob@example.com", billing.app_id, read.permission_id)
            .await
            .unwrap();
        store
            .add_grant("bob@example.com", billing.app_id, read.permission_id)
            .await
            .unwrap();

        let in_billing = store
            .get_user_with_grants("bob@example.com", billing.app_id)
            .await
            .unwrap();
        assert_eq!(in_billing.permission_snapshot(), vec!["read"]);

        let in_other = store
            .get_user_with_grants("bob@example.com", other.app_id)
            .await
            .unwrap();
        assert!(in_other.permissions.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_permission_drops_its_grants() {
        let store = InMemoryStore::new();
        let billing = app();
        store.ensure_application(&billing).await.unwrap();
        let user = User::new("carol@example.com".into(), "hash".into());
        store.create_user(&user).await.unwrap();
        let write = Permission::new(billing.app_id, "write".into());
        store.create_permission(&write).await.unwrap();
        store
            .add_grant("carol@example.com", billing.app_id, write.permission_id)
            .await
            .unwrap();

        store
            .delete_permission(billing.app_id, write.permission_id)
            .await
            .unwrap();

        let grants = store
            .get_user_with_grants("carol@example.com", billing.app_id)
            .await
            .unwrap();
        assert!(grants.permissions.is_empty());
        assert!(matches!(
            store
                .delete_permission(billing.app_id, write.permission_id)
                .await,
            Err(StoreError::NotFound(Entity::Permission))
        ));
    }

    #[tokio::test]
    async fn duplicate_permission_names_rejected_per_app() {
        let store = InMemoryStore::new();
        let billing = app();
        store.ensure_application(&billing).await.unwrap();

        store
            .create_permission(&Permission::new(billing.app_id, "read".into()))
            .await
            .unwrap();
        assert!(matches!(
            store
                .create_permission(&Permission::new(billing.app_id, "read".into()))
                .await,
            Err(StoreError::AlreadyExists(Entity::Permission))
        ));
        assert!(matches!(
            store
                .create_permission(&Permission::new(Uuid::new_v4(), "read".into()))
                .await,
            Err(StoreError::NotFound(Entity::Application))
        ));
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.health_check().await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
