use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Cache slot for the single active refresh token of one user in one
/// application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    email: String,
    app_id: Uuid,
}

impl SessionKey {
    pub fn new(email: &str, app_id: Uuid) -> Self {
        Self {
            email: email.trim().to_lowercase(),
            app_id,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn app_id(&self) -> Uuid {
        self.app_id
    }

    pub fn redis_key(&self) -> String {
        format!("refresh:{}:{}", self.email, self.app_id)
    }
}

#[async_trait]
pub trait RefreshCache: Send + Sync {
    /// Overwrite the active token for `key`, resetting its TTL.
    async fn set_active(
        &self,
        key: &SessionKey,
        refresh_token: &str,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error>;

    async fn get_active(&self, key: &SessionKey) -> Result<Option<String>, anyhow::Error>;

    /// Remove the active token; clearing an empty slot succeeds.
    async fn clear(&self, key: &SessionKey) -> Result<(), anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisService {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisService {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!("Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects on its own
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl RefreshCache for RedisService {
    async fn set_active(
        &self,
        key: &SessionKey,
        refresh_token: &str,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key.redis_key())
            .arg(refresh_token)
            .arg("EX")
            .arg(ttl_seconds.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to store refresh token: {}", e))
    }

    async fn get_active(&self, key: &SessionKey) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key.redis_key())
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read refresh token: {}", e))
    }

    async fn clear(&self, key: &SessionKey) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        let _removed: i64 = redis::cmd("DEL")
            .arg(key.redis_key())
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to clear refresh token: {}", e))?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// In-process [`RefreshCache`] honouring TTLs, with switches to simulate
/// an unreachable cache.
#[derive(Default)]
pub struct MockRefreshCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    fail_writes: AtomicBool,
    fail_clears: AtomicBool,
    fail_reads: AtomicBool,
}

impl MockRefreshCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_clears(&self, fail: bool) {
        self.fail_clears.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|(_, exp)| *exp > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, (String, Instant)>>, anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock cache mutex poisoned: {}", e))
    }
}

#[async_trait]
impl RefreshCache for MockRefreshCache {
    async fn set_active(
        &self,
        key: &SessionKey,
        refresh_token: &str,
        ttl_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Failed to store refresh token: connection refused"));
        }
        let expires = Instant::now() + Duration::from_secs(ttl_seconds.max(1));
        self.entries()?
            .insert(key.redis_key(), (refresh_token.to_string(), expires));
        Ok(())
    }

    async fn get_active(&self, key: &SessionKey) -> Result<Option<String>, anyhow::Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Failed to read refresh token: connection refused"));
        }
        let mut entries = self.entries()?;
        let redis_key = key.redis_key();
        match entries.get(&redis_key) {
            Some((token, expires)) if *expires > Instant::now() => Ok(Some(token.clone())),
            Some(_) => {
                entries.remove(&redis_key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn clear(&self, key: &SessionKey) -> Result<(), anyhow::Error> {
        if self.fail_clears.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Failed to clear refresh token: connection refused"));
        }
        self.entries()?.remove(&key.redis_key());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Redis health check failed: connection refused"));
        }
        Ok(())
    }
}
