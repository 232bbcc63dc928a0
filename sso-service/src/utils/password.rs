use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use secrecy::{ExposeSecret, SecretString};

/// Newtype for password to prevent accidental logging
pub struct Password(SecretString);

impl Password {
    pub fn new(password: String) -> Self {
        Self(SecretString::new(password))
    }

    fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a password using Argon2
///
/// Uses Argon2id variant with secure default parameters.
/// Salt is automatically generated and included in the hash.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.expose().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Well-formed Argon2id hash with the default cost parameters that no
/// password produces. Checked when there is no stored hash to compare
/// against, so a missing account costs as much as a wrong password.
const DECOY_PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c3NvLWR1bW15LXNhbHQxNg$Y3JlZGVudGlhbC1jaGVjay1lcXVhbGl6ZXItMzJieXQ";

/// Verify a password against a stored hash, or burn one verification
/// against the decoy when there is none. `None` never matches.
pub fn verify_password_or_decoy(
    password: &Password,
    password_hash: Option<&PasswordHashString>,
) -> bool {
    match password_hash {
        Some(hash) => verify_password(password, hash),
        None => {
            let decoy = PasswordHashString::new(DECOY_PASSWORD_HASH.to_string());
            let _ = verify_password(password, &decoy);
            false
        }
    }
}

/// Verify a password against a stored hash.
///
/// A malformed hash and a wrong password are both reported as `false`.
pub fn verify_password(password: &Password, password_hash: &PasswordHashString) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(password_hash.as_str()) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.expose().as_bytes(), &parsed_hash)
        .is_ok()
}
