//! Check Session Use Case
//!
//! Resolves an access token to the identity it belongs to.

use std::sync::Arc;

use crate::application::token::TokenIssuer;
use crate::domain::entity::Identity;
use crate::domain::repository::{AuthStore, IdentityRepository};
use crate::domain::value_object::{user_id::UserId, user_role::UserRole};
use crate::error::{AuthError, AuthResult};

/// Authenticated caller, attached to requests by the auth middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentIdentity {
    pub user_id: UserId,
    /// Role as currently persisted, not as claimed by the token
    pub role: UserRole,
}

impl From<&Identity> for CurrentIdentity {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: identity.user_id,
            role: identity.role,
        }
    }
}

pub struct CheckSessionUseCase<R: AuthStore> {
    repo: Arc<R>,
    tokens: Arc<TokenIssuer>,
}

impl<R: AuthStore> CheckSessionUseCase<R> {
    pub fn new(repo: Arc<R>, tokens: Arc<TokenIssuer>) -> Self {
        Self { repo, tokens }
    }

    pub async fn execute(&self, access_token: Option<&str>) -> AuthResult<Identity> {
        let token = access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthenticated)?;

        let claims = self.tokens.verify_access_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            AuthError::Unauthenticated
        })?;
        let user_id = claims.user_id().map_err(|_| AuthError::Unauthenticated)?;

        self.repo
            .find_by_id(&user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)
    }
}
