use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
    dtos::auth::IntrospectResponse,
    models::{Application, Permission, TokenPair, User},
    services::{
        database::{Entity, PermissionStore, StoreError},
        rate_gate::{Operation, RateGate},
        redis::{RefreshCache, SessionKey},
        JwtService, ServiceError,
    },
    utils::{hash_password, verify_password_or_decoy, Password, PasswordHashString},
};

/// Sequences the store, cache, issuer and rate gate for every
/// authenticated operation.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn PermissionStore>,
    cache: Arc<dyn RefreshCache>,
    jwt: JwtService,
    rate_gate: RateGate,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn PermissionStore>,
        cache: Arc<dyn RefreshCache>,
        jwt: JwtService,
        rate_gate: RateGate,
    ) -> Self {
        Self {
            store,
            cache,
            jwt,
            rate_gate,
        }
    }

    pub async fn register(&self, email: &str, password: Password) -> Result<Uuid, ServiceError> {
        if !self.rate_gate.admit(Operation::Registration) {
            tracing::warn!("Registration rate limit exceeded");
            return Err(ServiceError::RateLimited);
        }

        match self.store.get_user_by_email(email).await {
            Ok(_) => return Err(ServiceError::UserExists),
            Err(StoreError::NotFound(Entity::User)) => {}
            Err(e) => return Err(ServiceError::store("auth.register.get_user_by_email", e)),
        }

        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Hashing task failed: {}", e)))?
            .map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("Password hashing error: {}", e))
            })?;

        let user = User::new(email.trim().to_string(), password_hash.into_string());

        // A concurrent registration that wins the unique index also lands here
        self.store
            .create_user(&user)
            .await
            .map_err(|e| ServiceError::store("auth.register.create_user", e))?;

        tracing::info!(user_id = %user.user_id, "User registered");

        Ok(user.user_id)
    }

    pub async fn login(
        &self,
        email: &str,
        password: Password,
        app_id: Uuid,
    ) -> Result<TokenPair, ServiceError> {
        if !self.rate_gate.admit(Operation::Login) {
            tracing::warn!("Login rate limit exceeded");
            return Err(ServiceError::RateLimited);
        }

        let app = match self.store.get_application(app_id).await {
            Ok(app) => Some(app),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(ServiceError::store("auth.login.get_application", e)),
        };

        let grants = match &app {
            Some(_) => match self.store.get_user_with_grants(email, app_id).await {
                Ok(grants) => Some(grants),
                Err(StoreError::NotFound(_)) => None,
                Err(e) => return Err(ServiceError::store("auth.login.get_user_with_grants", e)),
            },
            None => None,
        };

        // Every rejection below costs one argon2 verification
        let hash = grants
            .as_ref()
            .map(|g| PasswordHashString::new(g.user.password_hash.clone()));
        let verified = tokio::task::spawn_blocking(move || {
            verify_password_or_decoy(&password, hash.as_ref())
        })
        .await
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Verification task failed: {}", e)))?;

        let (app, grants) = match (app, grants) {
            (Some(app), Some(grants)) => (app, grants),
            (None, _) => {
                tracing::warn!(%app_id, "Login for unknown application");
                return Err(ServiceError::InvalidCredentials);
            }
            (Some(_), None) => {
                tracing::warn!(%app_id, "Login for unknown email");
                return Err(ServiceError::InvalidCredentials);
            }
        };

        if !verified {
            tracing::warn!(user_id = %grants.user.user_id, %app_id, "Invalid password");
            return Err(ServiceError::InvalidCredentials);
        }

        let permissions = grants.permission_snapshot();
        let pair = self
            .rotate("auth.login", &grants.user, &app, &permissions)
            .await?;

        tracing::info!(user_id = %grants.user.user_id, %app_id, "User logged in");

        Ok(pair)
    }

    /// Drop the active refresh token for `(email, app_id)`. Succeeds when
    /// there is none.
    pub async fn logout(&self, email: &str, app_id: Uuid) -> Result<(), ServiceError> {
        let key = SessionKey::new(email, app_id);
        self.cache
            .clear(&key)
            .await
            .map_err(|e| ServiceError::cache("auth.logout.clear", e))?;

        tracing::info!(%app_id, "User logged out");
        Ok(())
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        app_id: Uuid,
    ) -> Result<TokenPair, ServiceError> {
        let app = match self.store.get_application(app_id).await {
            Ok(app) => app,
            Err(StoreError::NotFound(_)) => return Err(ServiceError::TokenInvalid),
            Err(e) => return Err(ServiceError::store("auth.refresh.get_application", e)),
        };

        let claims = self.jwt.verify_refresh(refresh_token, &app)?;
        let key = SessionKey::new(&claims.email, app_id);

        let active = self
            .cache
            .get_active(&key)
            .await
            .map_err(|e| ServiceError::cache("auth.refresh.get_active", e))?;

        let matches = active
            .as_deref()
            .map(|current| bool::from(current.as_bytes().ct_eq(refresh_token.as_bytes())))
            .unwrap_or(false);
        if !matches {
            tracing::warn!(user_id = %claims.sub, %app_id, "Superseded refresh token presented");
            return Err(ServiceError::TokenRevoked);
        }

        let grants = match self.store.get_user_with_grants(&claims.email, app_id).await {
            Ok(grants) if grants.user.user_id == claims.sub => grants,
            Ok(_) | Err(StoreError::NotFound(_)) => {
                tracing::warn!(user_id = %claims.sub, %app_id, "Refresh for removed user");
                return Err(ServiceError::TokenRevoked);
            }
            Err(e) => return Err(ServiceError::store("auth.refresh.get_user_with_grants", e)),
        };

        let permissions = grants.permission_snapshot();
        let pair = self
            .rotate("auth.refresh", &grants.user, &app, &permissions)
            .await?;

        tracing::info!(user_id = %grants.user.user_id, %app_id, "Token refreshed");

        Ok(pair)
    }

    /// Report whether an access token is currently valid for `app_id`.
    /// Never fails: anything unverifiable is inactive.
    pub async fn introspect(&self, access_token: &str, app_id: Uuid) -> IntrospectResponse {
        let app = match self.store.get_application(app_id).await {
            Ok(app) => app,
            Err(StoreError::NotFound(_)) => return IntrospectResponse::default(),
            Err(e) => {
                tracing::error!(error = %e, "Store error during introspection");
                return IntrospectResponse::default();
            }
        };

        match self.jwt.verify_access(access_token, &app) {
            Ok(claims) => IntrospectResponse {
                active: true,
                sub: Some(claims.sub),
                email: Some(claims.email),
                permissions: Some(claims.permissions),
                exp: Some(claims.exp),
            },
            Err(_) => IntrospectResponse::default(),
        }
    }

    pub async fn add_permission(&self, app_id: Uuid, name: &str) -> Result<Uuid, ServiceError> {
        self.require_application("auth.add_permission.get_application", app_id)
            .await?;

        let permission = Permission::new(app_id, name.trim().to_string());
        self.store
            .create_permission(&permission)
            .await
            .map_err(|e| ServiceError::store("auth.add_permission.create_permission", e))?;

        tracing::info!(%app_id, permission_id = %permission.permission_id, "Permission created");

        Ok(permission.permission_id)
    }

    /// Delete a permission; its grants go with it. Tokens already issued keep
    /// the old snapshot until they next rotate.
    pub async fn remove_permission(
        &self,
        app_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.store
            .delete_permission(app_id, permission_id)
            .await
            .map_err(|e| ServiceError::store("auth.remove_permission.delete_permission", e))?;

        tracing::info!(%app_id, %permission_id, "Permission removed");
        Ok(())
    }

    pub async fn list_permissions(&self, app_id: Uuid) -> Result<Vec<Permission>, ServiceError> {
        self.require_application("auth.list_permissions.get_application", app_id)
            .await?;

        self.store
            .list_application_permissions(app_id)
            .await
            .map_err(|e| ServiceError::store("auth.list_permissions.list", e))
    }

    pub async fn grant_permission(
        &self,
        email: &str,
        app_id: Uuid,
        permission_id: Uuid,
    ) -> Result<TokenPair, ServiceError> {
        let app = self
            .require_application("auth.grant.get_application", app_id)
            .await?;

        self.store
            .add_grant(email, app_id, permission_id)
            .await
            .map_err(|e| ServiceError::store("auth.grant.add_grant", e))?;

        tracing::info!(%app_id, %permission_id, "Permission granted");

        self.reissue("auth.grant", email, &app).await
    }

    pub async fn revoke_permission(
        &self,
        email: &str,
        app_id: Uuid,
        permission_id: Uuid,
    ) -> Result<TokenPair, ServiceError> {
        let app = self
            .require_application("auth.revoke.get_application", app_id)
            .await?;

        self.store
            .remove_grant(email, app_id, permission_id)
            .await
            .map_err(|e| ServiceError::store("auth.revoke.remove_grant", e))?;

        tracing::info!(%app_id, %permission_id, "Permission revoked");

        self.reissue("auth.revoke", email, &app).await
    }

    /// Insert the application or update its name and secret.
    pub async fn ensure_application(&self, app: &Application) -> Result<(), ServiceError> {
        self.store
            .ensure_application(app)
            .await
            .map_err(|e| ServiceError::store("auth.ensure_application", e))?;

        tracing::info!(app_id = %app.app_id, app_name = %app.app_name, "Application ensured");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), ServiceError> {
        self.store
            .health_check()
            .await
            .map_err(|e| ServiceError::store("health.store", e))?;
        self.cache
            .health_check()
            .await
            .map_err(|e| ServiceError::cache("health.cache", e))
    }

    async fn require_application(
        &self,
        op: &'static str,
        app_id: Uuid,
    ) -> Result<Application, ServiceError> {
        self.store
            .get_application(app_id)
            .await
            .map_err(|e| ServiceError::store(op, e))
    }

    async fn reissue(
        &self,
        op: &'static str,
        email: &str,
        app: &Application,
    ) -> Result<TokenPair, ServiceError> {
        let grants = self
            .store
            .get_user_with_grants(email, app.app_id)
            .await
            .map_err(|e| ServiceError::store(op, e))?;

        let permissions = grants.permission_snapshot();
        self.rotate(op, &grants.user, app, &permissions).await
    }

    /// Mint a pair, then clear the old entry, then cache the new refresh
    /// token. Any cache failure drops the pair.
    async fn rotate(
        &self,
        op: &'static str,
        user: &User,
        app: &Application,
        permissions: &[String],
    ) -> Result<TokenPair, ServiceError> {
        let pair = self.jwt.issue_pair(user, app, permissions)?;
        let key = SessionKey::new(&user.email, app.app_id);

        self.cache.clear(&key).await.map_err(|e| {
            tracing::error!(op, app_id = %app.app_id, "Failed to clear previous refresh token");
            ServiceError::cache(op, e)
        })?;

        let ttl = u64::try_from(self.jwt.refresh_ttl_seconds()).unwrap_or(0);
        self.cache
            .set_active(&key, &pair.refresh_token, ttl)
            .await
            .map_err(|e| {
                tracing::error!(op, app_id = %app.app_id, "Failed to cache new refresh token");
                ServiceError::cache(op, e)
            })?;

        Ok(pair)
    }
}
