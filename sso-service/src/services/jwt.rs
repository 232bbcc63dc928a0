use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{Application, TokenPair, User};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,

    #[error("token expired")]
    Expired,

    #[error("signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Token family, shared with the refresh half of the pair
    pub jti: Uuid,
    /// Subject (user ID)
    pub sub: Uuid,
    pub email: String,
    /// Application the token was issued for
    pub app: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub token_use: TokenUse,
    /// Permission names granted inside `app` at issue time
    pub permissions: Vec<String>,
}

/// Claims for refresh tokens (long-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub jti: Uuid,
    pub sub: Uuid,
    pub email: String,
    pub app: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub token_use: TokenUse,
}

/// Mints and verifies HS256 token pairs signed with each application's
/// secret.
#[derive(Clone)]
pub struct JwtService {
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtService {
    pub fn new(access_ttl_seconds: i64, refresh_ttl_seconds: i64) -> Self {
        Self {
            access_ttl: Duration::seconds(access_ttl_seconds),
            refresh_ttl: Duration::seconds(refresh_ttl_seconds),
        }
    }

    pub fn from_config(config: &JwtConfig) -> Self {
        Self::new(config.access_token_ttl_seconds, config.refresh_token_ttl_seconds)
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }

    /// Issue an access/refresh pair sharing one fresh family id.
    ///
    /// `permissions` is embedded in the access token as given; callers pass
    /// a sorted, deduplicated snapshot.
    pub fn issue_pair(
        &self,
        user: &User,
        app: &Application,
        permissions: &[String],
    ) -> Result<TokenPair, TokenError> {
        if app.signing_secret.is_empty() {
            return Err(TokenError::Signing(format!(
                "application {} has no signing secret",
                app.app_id
            )));
        }

        let now = Utc::now();
        let jti = Uuid::new_v4();
        let key = EncodingKey::from_secret(app.signing_secret.as_bytes());
        let header = Header::new(Algorithm::HS256);

        let access = AccessTokenClaims {
            jti,
            sub: user.user_id,
            email: user.email.clone(),
            app: app.app_id,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            token_use: TokenUse::Access,
            permissions: permissions.to_vec(),
        };
        let access_token = encode(&header, &access, &key)
            .map_err(|e| TokenError::Signing(format!("access token: {}", e)))?;

        let refresh = RefreshTokenClaims {
            jti,
            sub: user.user_id,
            email: user.email.clone(),
            app: app.app_id,
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            token_use: TokenUse::Refresh,
        };
        let refresh_token = encode(&header, &refresh, &key)
            .map_err(|e| TokenError::Signing(format!("refresh token: {}", e)))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl_seconds(),
        })
    }

    pub fn verify_access(
        &self,
        token: &str,
        app: &Application,
    ) -> Result<AccessTokenClaims, TokenError> {
        let claims: AccessTokenClaims = decode_claims(token, app)?;
        if claims.token_use != TokenUse::Access || claims.app != app.app_id {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    pub fn verify_refresh(
        &self,
        token: &str,
        app: &Application,
    ) -> Result<RefreshTokenClaims, TokenError> {
        let claims: RefreshTokenClaims = decode_claims(token, app)?;
        if claims.token_use != TokenUse::Refresh || claims.app != app.app_id {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }
}

fn decode_claims<T: DeserializeOwned>(token: &str, app: &Application) -> Result<T, TokenError> {
    if app.signing_secret.is_empty() {
        return Err(TokenError::Invalid);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp"]);

    let key = DecodingKey::from_secret(app.signing_secret.as_bytes());
    decode::<T>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })
}
