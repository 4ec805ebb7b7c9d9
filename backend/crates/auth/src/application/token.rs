//! Token Issuer
//!
//! HS256 JWTs for three purposes, each with its own key/audience pair:
//!
//! | token         | key     | audience      | lifetime |
//! |---------------|---------|---------------|----------|
//! | access        | access  | `<aud>`       | 15 min   |
//! | refresh       | refresh | `<aud>`       | 7 days   |
//! | 2FA pending   | access  | `<aud>:2fa`   | 5 min    |
//!
//! Expiry is checked against the injected [`Clock`] rather than by
//! `jsonwebtoken`, so tests can expire tokens without sleeping.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use platform::clock::Clock;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::application::config::AuthConfig;
use crate::domain::entity::Identity;
use crate::domain::value_object::{user_id::UserId, user_role::UserRole};
use crate::error::{AuthError, AuthResult};

const PENDING_PURPOSE: &str = "2fa_pending";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub sub: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
    pub iss: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub sub: String,
    /// Identity token version at issue time
    pub version: i64,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
    pub iss: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingClaims {
    pub sub: String,
    pub version: i64,
    pub purpose: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
    pub iss: String,
}

trait Expiring {
    fn exp(&self) -> i64;
}

impl Expiring for AccessClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

impl Expiring for RefreshClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

impl Expiring for PendingClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.sub.parse().map_err(|_| TokenError::Invalid)
    }
}

impl RefreshClaims {
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.sub.parse().map_err(|_| TokenError::Invalid)
    }
}

impl PendingClaims {
    pub fn user_id(&self) -> Result<UserId, TokenError> {
        self.sub.parse().map_err(|_| TokenError::Invalid)
    }
}

/// Verification failure. Expiry is reported only for tokens whose
/// signature, audience and issuer check out.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
}

/// Signed token plus its expiry
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

pub struct TokenIssuer {
    access: KeyPair,
    refresh: KeyPair,
    audience: String,
    pending_audience: String,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    pending_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            access: KeyPair::from_secret(&config.access_token_secret),
            refresh: KeyPair::from_secret(&config.refresh_token_secret),
            audience: config.audience.clone(),
            pending_audience: config.pending_audience(),
            issuer: config.issuer.clone(),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
            pending_ttl: config.two_factor_pending_ttl,
            clock,
        }
    }

    pub fn issue_access_token(&self, identity: &Identity) -> AuthResult<IssuedToken> {
        let iat = self.clock.now();
        let exp = iat + self.access_ttl;
        let claims = AccessClaims {
            sub: identity.user_id.to_string(),
            role: identity.role,
            iat: iat.timestamp(),
            exp: exp.timestamp(),
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
        };
        sign(&claims, &self.access.encoding, exp)
    }

    pub fn issue_refresh_token(&self, identity: &Identity) -> AuthResult<IssuedToken> {
        let iat = self.clock.now();
        let exp = iat + self.refresh_ttl;
        let claims = RefreshClaims {
            sub: identity.user_id.to_string(),
            version: identity.token_version,
            iat: iat.timestamp(),
            exp: exp.timestamp(),
            aud: self.audience.clone(),
            iss: self.issuer.clone(),
        };
        sign(&claims, &self.refresh.encoding, exp)
    }

    /// Proof that the password step succeeded, redeemable for a session
    /// together with a TOTP code
    pub fn issue_pending_token(&self, identity: &Identity) -> AuthResult<IssuedToken> {
        let iat = self.clock.now();
        let exp = iat + self.pending_ttl;
        let claims = PendingClaims {
            sub: identity.user_id.to_string(),
            version: identity.token_version,
            purpose: PENDING_PURPOSE.to_string(),
            iat: iat.timestamp(),
            exp: exp.timestamp(),
            aud: self.pending_audience.clone(),
            iss: self.issuer.clone(),
        };
        sign(&claims, &self.access.encoding, exp)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(token, &self.access.decoding, &self.audience)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verify(token, &self.refresh.decoding, &self.audience)
    }

    pub fn verify_pending_token(&self, token: &str) -> Result<PendingClaims, TokenError> {
        let claims: PendingClaims =
            self.verify(token, &self.access.decoding, &self.pending_audience)?;
        if claims.purpose != PENDING_PURPOSE {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    fn verify<C>(&self, token: &str, key: &DecodingKey, audience: &str) -> Result<C, TokenError>
    where
        C: DeserializeOwned + Expiring,
    {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_audience(&[audience]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

        let claims = jsonwebtoken::decode::<C>(token, key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                TokenError::Invalid
            })?
            .claims;

        if self.clock.unix_timestamp() >= claims.exp() {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

fn sign<C: Serialize>(
    claims: &C,
    key: &EncodingKey,
    expires_at: DateTime<Utc>,
) -> AuthResult<IssuedToken> {
    let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| AuthError::Internal(format!("Failed to sign token: {}", e)))?;

    Ok(IssuedToken { token, expires_at })
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_object::{email::Email, user_name::UserName};
    use platform::clock::ManualClock;

    fn setup() -> (TokenIssuer, ManualClock, AuthConfig, Identity) {
        let config = AuthConfig::testing();
        let clock = ManualClock::starting_now();
        let issuer = TokenIssuer::new(&config, Arc::new(clock.clone()));
        let identity = Identity::new(
            UserName::new("alice").unwrap(),
            Email::new("alice@example.com").unwrap(),
            UserRole::Admin,
            clock.now(),
        );
        (issuer, clock, config, identity)
    }

    #[test]
    fn test_access_token_roundtrip() {
        let (issuer, _, _, identity) = setup();
        let token = issuer.issue_access_token(&identity).unwrap();
        let claims = issuer.verify_access_token(&token.token).unwrap();

        assert_eq!(claims.user_id().unwrap(), identity.user_id);
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
        assert_eq!(claims.aud, "technest-api");
        assert_eq!(claims.iss, "technest");
    }

    #[test]
    fn test_access_token_expires() {
        let (issuer, clock, _, identity) = setup();
        let token = issuer.issue_access_token(&identity).unwrap();

        clock.advance(Duration::minutes(14));
        assert!(issuer.verify_access_token(&token.token).is_ok());

        clock.advance(Duration::minutes(1));
        assert_eq!(
            issuer.verify_access_token(&token.token),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_refresh_token_carries_version() {
        let (issuer, clock, _, mut identity) = setup();
        identity.token_version = 3;
        let token = issuer.issue_refresh_token(&identity).unwrap();

        let claims = issuer.verify_refresh_token(&token.token).unwrap();
        assert_eq!(claims.version, 3);

        clock.advance(Duration::days(7));
        assert_eq!(
            issuer.verify_refresh_token(&token.token),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_keys_are_not_interchangeable() {
        let (issuer, _, _, identity) = setup();
        let access = issuer.issue_access_token(&identity).unwrap();
        let refresh = issuer.issue_refresh_token(&identity).unwrap();
        let pending = issuer.issue_pending_token(&identity).unwrap();

        assert_eq!(
            issuer.verify_refresh_token(&access.token).unwrap_err(),
            TokenError::Invalid
        );
        assert_eq!(
            issuer.verify_access_token(&refresh.token).unwrap_err(),
            TokenError::Invalid
        );
        // Same key, different audience
        assert_eq!(
            issuer.verify_access_token(&pending.token).unwrap_err(),
            TokenError::Invalid
        );
        assert!(issuer.verify_pending_token(&pending.token).is_ok());
    }

    #[test]
    fn test_foreign_audience_and_signature_rejected() {
        let (issuer, clock, config, identity) = setup();

        let other = TokenIssuer::new(
            &AuthConfig {
                audience: "someone-else".to_string(),
                ..config.clone()
            },
            Arc::new(clock.clone()),
        );
        let token = other.issue_access_token(&identity).unwrap();
        assert_eq!(
            issuer.verify_access_token(&token.token),
            Err(TokenError::Invalid)
        );

        let forged = TokenIssuer::new(&AuthConfig::testing(), Arc::new(clock));
        let token = forged.issue_access_token(&identity).unwrap();
        assert_eq!(
            issuer.verify_access_token(&token.token),
            Err(TokenError::Invalid)
        );

        assert_eq!(
            issuer.verify_access_token("not.a.jwt"),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn test_expired_forgery_is_invalid_not_expired() {
        let (issuer, clock, _, identity) = setup();
        let forged = TokenIssuer::new(&AuthConfig::testing(), Arc::new(clock.clone()));
        let token = forged.issue_refresh_token(&identity).unwrap();

        clock.advance(Duration::days(8));
        assert_eq!(
            issuer.verify_refresh_token(&token.token),
            Err(TokenError::Invalid)
        );
    }
}
