//! Register Use Case
//!
//! Creates an identity with hashed credentials.

use std::sync::Arc;

use platform::clock::Clock;

use crate::application::config::AuthConfig;
use crate::domain::entity::{Credentials, Identity};
use crate::domain::repository::{AuthStore, IdentityRepository};
use crate::domain::value_object::{
    email::Email,
    user_name::UserName,
    user_password::{RawPassword, UserPassword},
    user_role::UserRole,
};
use crate::error::{AuthError, AuthResult};

pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Honoured only when role selection is enabled
    pub role: Option<String>,
}

pub struct RegisterUseCase<R: AuthStore> {
    repo: Arc<R>,
    config: Arc<AuthConfig>,
    clock: Arc<dyn Clock>,
}

impl<R: AuthStore> RegisterUseCase<R> {
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            config,
            clock,
        }
    }

    pub async fn execute(&self, input: RegisterInput) -> AuthResult<Identity> {
        if input.username.trim().is_empty()
            || input.email.trim().is_empty()
            || input.password.is_empty()
        {
            return Err(AuthError::Validation("All fields are required".to_string()));
        }

        let username = UserName::new(&input.username)?;
        let email = Email::new(&input.email)?;
        let role = self.resolve_role(input.role.as_deref())?;
        let raw_password = RawPassword::new(input.password)
            .map_err(|e| AuthError::WeakPassword(e.message().to_string()))?;

        if self.repo.exists_by_email(&email).await? {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = UserPassword::hash_blocking(
            raw_password,
            self.config.password_pepper.clone(),
            self.config.password_hash_cost,
        )
        .await?;

        let now = self.clock.now();
        let identity = Identity::new(username, email, role, now);
        let credentials = Credentials::new(identity.user_id, password_hash, now);

        // A concurrent registration can still win the race; the store
        // reports that as DuplicateEmail
        self.repo.create(&identity, &credentials).await?;

        tracing::info!(
            user_id = %identity.user_id,
            role = %identity.role,
            "User registered"
        );

        Ok(identity)
    }

    fn resolve_role(&self, requested: Option<&str>) -> AuthResult<UserRole> {
        let role = match requested.map(str::trim) {
            None | Some("") => return Ok(UserRole::default()),
            Some(code) => code.parse::<UserRole>()?,
        };

        if role != UserRole::default() && !self.config.allow_role_selection {
            tracing::warn!(requested = %role, "Role selection refused at registration");
            return Err(AuthError::Validation(
                "Role cannot be chosen at registration".to_string(),
            ));
        }

        Ok(role)
    }
}
