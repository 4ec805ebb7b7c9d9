//! Shared fixtures for use case unit tests

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use platform::clock::{Clock, ManualClock};

use crate::application::config::AuthConfig;
use crate::application::register::{RegisterInput, RegisterUseCase};
use crate::application::token::TokenIssuer;
use crate::domain::entity::Identity;
use crate::domain::value_object::{
    email::Email, totp_secret::TotpSecret, user_name::UserName, user_role::UserRole,
};
use crate::infra::memory::InMemoryAuthRepository;

pub const PASSWORD: &str = "secret1";

pub struct Fixture {
    pub repo: Arc<InMemoryAuthRepository>,
    pub config: Arc<AuthConfig>,
    pub clock: Arc<ManualClock>,
    pub tokens: Arc<TokenIssuer>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(AuthConfig::testing())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let tokens = Arc::new(TokenIssuer::new(&config, clock.clone()));
        Self {
            repo: Arc::new(InMemoryAuthRepository::new()),
            config: Arc::new(config),
            clock,
            tokens,
        }
    }

    pub fn dyn_clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub async fn register(&self, email: &str) -> Identity {
        RegisterUseCase::new(self.repo.clone(), self.config.clone(), self.dyn_clock())
            .execute(RegisterInput {
                username: "alice".to_string(),
                email: email.to_string(),
                password: PASSWORD.to_string(),
                role: None,
            })
            .await
            .unwrap()
    }

    /// Identity that was never stored
    pub fn unsaved_identity(&self, email: &str) -> Identity {
        Identity::new(
            UserName::new("ghost").unwrap(),
            Email::new(email).unwrap(),
            UserRole::User,
            self.clock.now(),
        )
    }

    /// Current code for `secret` at the fixture clock
    pub fn code(&self, secret: &TotpSecret) -> String {
        secret
            .generate_at(self.clock.unix_timestamp() as u64)
            .unwrap()
    }
}
