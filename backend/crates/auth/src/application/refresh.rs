//! Refresh Use Case
//!
//! Exchanges a refresh token for a new access token. The refresh token
//! itself is not rotated; it dies on expiry or when the identity's token
//! version moves past the one it carries.

use std::sync::Arc;

use crate::application::token::{IssuedToken, TokenError, TokenIssuer};
use crate::domain::entity::Identity;
use crate::domain::repository::{AuthStore, IdentityRepository};
use crate::error::{AuthError, AuthResult};

pub struct RefreshUseCase<R: AuthStore> {
    repo: Arc<R>,
    tokens: Arc<TokenIssuer>,
}

impl<R: AuthStore> RefreshUseCase<R> {
    pub fn new(repo: Arc<R>, tokens: Arc<TokenIssuer>) -> Self {
        Self { repo, tokens }
    }

    pub async fn execute(&self, refresh_token: Option<&str>) -> AuthResult<(Identity, IssuedToken)> {
        let token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::RefreshTokenMissing)?;

        let claims = self.tokens.verify_refresh_token(token).map_err(|e| match e {
            TokenError::Expired => AuthError::RefreshTokenExpired,
            TokenError::Invalid => AuthError::RefreshTokenInvalid,
        })?;
        let user_id = claims
            .user_id()
            .map_err(|_| AuthError::RefreshTokenInvalid)?;

        let Some(identity) = self.repo.find_by_id(&user_id).await? else {
            tracing::warn!(user_id = %user_id, "Refresh token for unknown identity");
            return Err(AuthError::RefreshTokenInvalid);
        };

        if identity.token_version != claims.version {
            tracing::warn!(
                user_id = %user_id,
                token_version = claims.version,
                current_version = identity.token_version,
                "Refresh token revoked"
            );
            return Err(AuthError::RefreshTokenInvalid);
        }

        let access_token = self.tokens.issue_access_token(&identity)?;
        tracing::debug!(user_id = %user_id, "Access token refreshed");

        Ok((identity, access_token))
    }
}
