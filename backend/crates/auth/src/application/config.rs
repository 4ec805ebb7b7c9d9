//! Application Configuration
//!
//! Immutable once built; shared behind an `Arc`.

use std::fmt;
use std::time::Duration as StdDuration;

use chrono::Duration;
use platform::cookie::CookieConfig;
use platform::crypto;
use platform::password::HashCost;
use thiserror::Error;

pub use crate::domain::entity::LockoutPolicy;
/// Re-export SameSite from platform
pub use platform::cookie::SameSite;

pub const ACCESS_COOKIE_NAME: &str = "accessToken";
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";
pub const PENDING_COOKIE_NAME: &str = "twoFactorPending";

/// HS256 keys shorter than this are rejected
pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be at least 32 bytes")]
    SecretTooShort(&'static str),

    #[error("access and refresh signing keys must differ")]
    SharedSigningKey,

    #[error("{0} must be positive")]
    NonPositive(&'static str),

    #[error("renewal interval must be shorter than the access token lifetime")]
    RenewalTooLate,

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Auth application configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 key for access and 2FA-pending tokens
    pub access_token_secret: Vec<u8>,
    /// HS256 key for refresh tokens
    pub refresh_token_secret: Vec<u8>,
    pub audience: String,
    pub issuer: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Window for completing a password-verified login with a TOTP code
    pub two_factor_pending_ttl: Duration,
    /// Proactive client renewal period (14 of 15 minutes)
    pub renewal_interval: StdDuration,
    /// Mount point of the auth router; scopes the refresh and pending cookies
    pub auth_path: String,
    pub cookie_domain: Option<String>,
    /// Whether to require Secure cookie
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    pub lockout: LockoutPolicy,
    /// Count wrong TOTP codes toward lockout
    pub count_two_factor_failures: bool,
    /// Honour the `role` field of registration requests
    pub allow_role_selection: bool,
    /// Issuer label shown in authenticator apps
    pub totp_issuer: String,
    /// Password pepper (optional, application-wide secret)
    pub password_pepper: Option<Vec<u8>>,
    pub password_hash_cost: HashCost,
}

impl AuthConfig {
    pub fn new(access_token_secret: Vec<u8>, refresh_token_secret: Vec<u8>) -> Self {
        Self {
            access_token_secret,
            refresh_token_secret,
            audience: "technest-api".to_string(),
            issuer: "technest".to_string(),
            access_token_ttl: Duration::minutes(15),
            refresh_token_ttl: Duration::days(7),
            two_factor_pending_ttl: Duration::minutes(5),
            renewal_interval: StdDuration::from_secs(14 * 60),
            auth_path: "/api/auth".to_string(),
            cookie_domain: None,
            cookie_secure: true,
            cookie_same_site: SameSite::Strict,
            lockout: LockoutPolicy::default(),
            count_two_factor_failures: false,
            allow_role_selection: false,
            totp_issuer: "TechNest".to_string(),
            password_pepper: None,
            password_hash_cost: HashCost::default(),
        }
    }

    /// Config with fresh random signing keys
    pub fn with_random_secrets() -> Self {
        Self::new(
            crypto::random_bytes(MIN_SECRET_BYTES),
            crypto::random_bytes(MIN_SECRET_BYTES),
        )
    }

    /// Create config for development (insecure cookie)
    pub fn development() -> Self {
        Self {
            cookie_secure: false,
            ..Self::with_random_secrets()
        }
    }

    /// Development config with the cheapest Argon2 cost, for tests
    pub fn testing() -> Self {
        Self {
            password_hash_cost: HashCost::testing(),
            ..Self::development()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token_secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::SecretTooShort("access token secret"));
        }
        if self.refresh_token_secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::SecretTooShort("refresh token secret"));
        }
        if self.access_token_secret == self.refresh_token_secret {
            return Err(ConfigError::SharedSigningKey);
        }
        if self.audience.is_empty() {
            return Err(ConfigError::Empty("audience"));
        }
        if self.issuer.is_empty() {
            return Err(ConfigError::Empty("issuer"));
        }

        for (name, ttl) in [
            ("access token ttl", self.access_token_ttl),
            ("refresh token ttl", self.refresh_token_ttl),
            ("2fa pending ttl", self.two_factor_pending_ttl),
            ("lockout duration", self.lockout.lock_duration),
        ] {
            if ttl <= Duration::zero() {
                return Err(ConfigError::NonPositive(name));
            }
        }
        if self.lockout.max_failures == 0 {
            return Err(ConfigError::NonPositive("lockout threshold"));
        }
        if self.renewal_interval.is_zero() {
            return Err(ConfigError::NonPositive("renewal interval"));
        }
        if self.renewal_interval.as_secs() >= self.access_token_ttl.num_seconds() as u64 {
            return Err(ConfigError::RenewalTooLate);
        }

        Ok(())
    }

    /// Audience of 2FA-pending tokens, distinct from access tokens
    pub fn pending_audience(&self) -> String {
        format!("{}:2fa", self.audience)
    }

    fn cookie(&self, name: &str, path: String, max_age: Duration) -> CookieConfig {
        CookieConfig {
            name: name.to_string(),
            secure: self.cookie_secure,
            http_only: true,
            same_site: self.cookie_same_site,
            path,
            domain: self.cookie_domain.clone(),
            max_age_secs: Some(max_age.num_seconds()),
        }
    }

    pub fn access_cookie(&self) -> CookieConfig {
        self.cookie(ACCESS_COOKIE_NAME, "/".to_string(), self.access_token_ttl)
    }

    /// Only sent back to the refresh endpoint
    pub fn refresh_cookie(&self) -> CookieConfig {
        self.cookie(
            REFRESH_COOKIE_NAME,
            format!("{}/refresh", self.auth_path),
            self.refresh_token_ttl,
        )
    }

    pub fn pending_cookie(&self) -> CookieConfig {
        self.cookie(
            PENDING_COOKIE_NAME,
            format!("{}/2fa", self.auth_path),
            self.two_factor_pending_ttl,
        )
    }
}

/// Secrets are shown only as short fingerprints
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "access_token_secret",
                &crypto::fingerprint(&self.access_token_secret),
            )
            .field(
                "refresh_token_secret",
                &crypto::fingerprint(&self.refresh_token_secret),
            )
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("two_factor_pending_ttl", &self.two_factor_pending_ttl)
            .field("renewal_interval", &self.renewal_interval)
            .field("auth_path", &self.auth_path)
            .field("cookie_domain", &self.cookie_domain)
            .field("cookie_secure", &self.cookie_secure)
            .field("cookie_same_site", &self.cookie_same_site)
            .field("lockout", &self.lockout)
            .field("count_two_factor_failures", &self.count_two_factor_failures)
            .field("allow_role_selection", &self.allow_role_selection)
            .field("totp_issuer", &self.totp_issuer)
            .field(
                "password_pepper",
                &self.password_pepper.as_ref().map(|_| "[REDACTED]"),
            )
            .field("password_hash_cost", &self.password_hash_cost)
            .finish()
    }
}
