use crate::auth::{AuthError, AuthResult};

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Issuer claim stamped into every token and enforced on verification.
    pub issuer: String,
    /// Symmetric HS256 signing secret shared across the deployment.
    pub signing_secret: String,
    /// Name this process uses when minting service tokens for outbound calls.
    pub service_name: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub service_token_ttl_secs: i64,
    /// Consecutive failed logins before an account locks.
    pub max_failed_attempts: i32,
    /// How long a lockout lasts before it lazily expires.
    pub lock_duration_secs: i64,
    /// Argon2 memory cost in KiB; the tunable work factor.
    pub hash_memory_kib: u32,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let issuer = std::env::var("AUTH_ISSUER").unwrap_or_else(|_| "ecommerce-platform".into());
        let signing_secret = std::env::var("AUTH_SIGNING_SECRET")
            .map_err(|_| AuthError::Config("AUTH_SIGNING_SECRET is required".into()))?;
        if signing_secret.len() < 32 {
            return Err(AuthError::Config(
                "AUTH_SIGNING_SECRET must be at least 32 bytes for HS256".into(),
            ));
        }
        let service_name =
            std::env::var("AUTH_SERVICE_NAME").unwrap_or_else(|_| "customer-service".into());
        let access_token_ttl_secs = std::env::var("AUTH_ACCESS_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(15 * 60);
        let refresh_token_ttl_secs = std::env::var("AUTH_REFRESH_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(7 * 24 * 60 * 60);
        let service_token_ttl_secs = std::env::var("AUTH_SERVICE_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(5 * 60);
        let max_failed_attempts = std::env::var("AUTH_MAX_FAILED_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(5);
        let lock_duration_secs = std::env::var("AUTH_LOCK_DURATION_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(30 * 60);
        let hash_memory_kib = std::env::var("AUTH_HASH_MEMORY_KIB")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(19 * 1024);

        Ok(Self {
            issuer,
            signing_secret,
            service_name,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            service_token_ttl_secs,
            max_failed_attempts,
            lock_duration_secs,
            hash_memory_kib,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AuthConfig {
    AuthConfig {
        issuer: "ecommerce-platform-test".into(),
        signing_secret: "0123456789abcdef0123456789abcdef".into(),
        service_name: "customer-service".into(),
        access_token_ttl_secs: 900,
        refresh_token_ttl_secs: 604_800,
        service_token_ttl_secs: 300,
        max_failed_attempts: 5,
        lock_duration_secs: 1800,
        hash_memory_kib: 8 * 1024,
    }
}
