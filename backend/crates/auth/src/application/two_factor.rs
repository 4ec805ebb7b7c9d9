//! Two-Factor Use Case
//!
//! TOTP enrollment (generate, then verify) and removal. Nothing is stored
//! at generate time: the client echoes the secret back with its first code,
//! and only then is 2FA switched on.

use std::sync::Arc;

use platform::clock::Clock;

use crate::application::config::AuthConfig;
use crate::domain::entity::Identity;
use crate::domain::repository::{AuthStore, CredentialsRepository, IdentityRepository};
use crate::domain::value_object::{
    totp_secret::{Provisioning, TotpSecret},
    user_id::UserId,
};
use crate::error::{AuthError, AuthResult};

pub struct TwoFactorUseCase<R: AuthStore> {
    repo: Arc<R>,
    config: Arc<AuthConfig>,
    clock: Arc<dyn Clock>,
}

impl<R: AuthStore> TwoFactorUseCase<R> {
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            config,
            clock,
        }
    }

    /// Fresh secret plus provisioning URI and QR image
    pub async fn generate(&self, user_id: &UserId) -> AuthResult<Provisioning> {
        let identity = self.identity(user_id).await?;
        if identity.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let secret = TotpSecret::generate();
        let provisioning = secret.provisioning(&self.config.totp_issuer, identity.email.as_str())?;

        tracing::info!(user_id = %user_id, "2FA secret generated");
        Ok(provisioning)
    }

    /// Enable 2FA once `code` proves the authenticator holds `secret`
    pub async fn verify(&self, user_id: &UserId, secret: &str, code: &str) -> AuthResult<()> {
        if secret.trim().is_empty() || code.trim().is_empty() {
            return Err(AuthError::Validation(
                "Token and secret are required".to_string(),
            ));
        }

        let identity = self.identity(user_id).await?;
        if identity.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        let secret = TotpSecret::from_base32(secret.trim())
            .map_err(|e| AuthError::Validation(e.message().to_string()))?;
        if !secret.verify_at(code, self.unix_now()) {
            tracing::info!(user_id = %user_id, "2FA enrollment code rejected");
            return Err(AuthError::InvalidTwoFactorCode);
        }

        self.repo
            .set_two_factor(user_id, Some(&secret), self.clock.now())
            .await?;

        tracing::info!(user_id = %user_id, "2FA enabled");
        Ok(())
    }

    /// Disable 2FA. Requires a current code from the enrolled secret.
    pub async fn disable(&self, user_id: &UserId, code: &str) -> AuthResult<()> {
        if code.trim().is_empty() {
            return Err(AuthError::Validation("Token is required".to_string()));
        }

        let identity = self.identity(user_id).await?;
        if !identity.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        let credentials = self
            .repo
            .find_credentials(user_id)
            .await?
            .ok_or_else(|| AuthError::Internal(format!("Credentials missing for {}", user_id)))?;
        let secret = credentials
            .totp_secret
            .ok_or_else(|| AuthError::Internal(format!("2FA enabled without secret for {}", user_id)))?;

        if !secret.verify_at(code, self.unix_now()) {
            tracing::info!(user_id = %user_id, "2FA disable code rejected");
            return Err(AuthError::InvalidTwoFactorCode);
        }

        self.repo
            .set_two_factor(user_id, None, self.clock.now())
            .await?;

        tracing::info!(user_id = %user_id, "2FA disabled");
        Ok(())
    }

    async fn identity(&self, user_id: &UserId) -> AuthResult<Identity> {
        self.repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    fn unix_now(&self) -> u64 {
        self.clock.unix_timestamp().max(0) as u64
    }
}
