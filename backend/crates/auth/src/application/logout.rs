//! Logout Use Case
//!
//! Revokes every refresh token of the identity by bumping its token
//! version. Access tokens already issued stay valid until they expire.

use std::sync::Arc;

use crate::domain::repository::{AuthStore, IdentityRepository};
use crate::domain::value_object::user_id::UserId;
use crate::error::AuthResult;

pub struct LogoutUseCase<R: AuthStore> {
    repo: Arc<R>,
}

impl<R: AuthStore> LogoutUseCase<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Returns the new token version
    pub async fn execute(&self, user_id: &UserId) -> AuthResult<i64> {
        let version = self.repo.increment_token_version(user_id).await?;
        tracing::info!(user_id = %user_id, token_version = version, "Logged out");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::Fixture;

    #[tokio::test]
    async fn test_each_logout_bumps_version() {
        let fx = Fixture::new();
        let identity = fx.register("sam@example.com").await;
        let uc = LogoutUseCase::new(fx.repo.clone());

        assert_eq!(uc.execute(&identity.user_id).await.unwrap(), 1);
        assert_eq!(uc.execute(&identity.user_id).await.unwrap(), 2);
    }
}
