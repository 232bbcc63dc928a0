use service_core::config::{self as core_config, get_env, parse_env};
use service_core::error::AppError;
use std::env;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SsoConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub application: ApplicationConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
}

/// The relying party this deployment issues tokens for; ensured in the
/// database at startup.
#[derive(Clone)]
pub struct ApplicationConfig {
    pub app_id: Uuid,
    pub app_name: String,
    pub signing_secret: String,
}

#[derive(Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub admin_api_key: String,
}

/// Token bucket settings: `*_burst` tokens, one refilled every
/// `*_refill_seconds`.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub register_burst: u32,
    pub register_refill_seconds: u64,
    pub login_burst: u32,
    pub login_refill_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl std::fmt::Debug for ApplicationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationConfig")
            .field("app_id", &self.app_id)
            .field("app_name", &self.app_name)
            .field("signing_secret", &"[REDACTED]")
            .finish()
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("allowed_origins", &self.allowed_origins)
            .field("admin_api_key", &"[REDACTED]")
            .finish()
    }
}

impl SsoConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = SsoConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("sso-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.trim().is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", None, is_prod)?,
            },
            jwt: JwtConfig {
                access_token_ttl_seconds: parse_env(
                    "ACCESS_TOKEN_TTL_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
                refresh_token_ttl_seconds: parse_env(
                    "REFRESH_TOKEN_TTL_SECONDS",
                    Some("604800"),
                    is_prod,
                )?,
            },
            application: ApplicationConfig {
                app_id: parse_env("APP_ID", None, is_prod)?,
                app_name: get_env("APP_NAME", Some("sso"), is_prod)?,
                signing_secret: get_env("APP_SECRET", None, true)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                admin_api_key: get_env("ADMIN_API_KEY", None, true)?,
            },
            rate_limit: RateLimitConfig {
                register_burst: parse_env("RATE_LIMIT_REGISTER_BURST", Some("3"), is_prod)?,
                register_refill_seconds: parse_env(
                    "RATE_LIMIT_REGISTER_REFILL_SECONDS",
                    Some("1200"),
                    is_prod,
                )?,
                login_burst: parse_env("RATE_LIMIT_LOGIN_BURST", Some("5"), is_prod)?,
                login_refill_seconds: parse_env(
                    "RATE_LIMIT_LOGIN_REFILL_SECONDS",
                    Some("180"),
                    is_prod,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_ttl_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TOKEN_TTL_SECONDS must be positive"
            )));
        }

        if self.jwt.refresh_token_ttl_seconds < self.jwt.access_token_ttl_seconds {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TOKEN_TTL_SECONDS must not be shorter than ACCESS_TOKEN_TTL_SECONDS"
            )));
        }

        if self.application.app_id.is_nil() {
            return Err(AppError::ConfigError(anyhow::anyhow!("APP_ID must not be nil")));
        }

        if self.application.signing_secret.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "APP_SECRET must be at least 32 bytes"
            )));
        }

        if self.security.admin_api_key.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ADMIN_API_KEY must not be empty"
            )));
        }

        if self.environment == Environment::Prod
            && self.security.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        Ok(())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
