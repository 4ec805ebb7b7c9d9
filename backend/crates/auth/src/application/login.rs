//! Login Use Case
//!
//! Password step, lockout bookkeeping and the optional TOTP step. A login
//! for an account with 2FA enabled either carries the code in the same
//! request, or is completed later with a short-lived pending token.

use std::sync::Arc;

use platform::clock::Clock;

use crate::application::config::AuthConfig;
use crate::application::token::{IssuedToken, TokenIssuer};
use crate::domain::entity::{Credentials, Identity, LockoutState};
use crate::domain::repository::{AuthStore, CredentialsRepository, IdentityRepository};
use crate::domain::value_object::{
    email::Email,
    user_password::{RawPassword, UserPassword},
};
use crate::error::{AuthError, AuthResult};

pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub totp_code: Option<String>,
}

/// Fully authenticated session material
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub access_token: IssuedToken,
    pub refresh_token: IssuedToken,
}

#[derive(Debug)]
pub enum LoginOutcome {
    Authenticated(Box<Session>),
    /// Password accepted; a TOTP code is still owed
    TwoFactorRequired { pending_token: IssuedToken },
}

pub struct LoginUseCase<R: AuthStore> {
    repo: Arc<R>,
    config: Arc<AuthConfig>,
    tokens: Arc<TokenIssuer>,
    clock: Arc<dyn Clock>,
}

impl<R: AuthStore> LoginUseCase<R> {
    pub fn new(
        repo: Arc<R>,
        config: Arc<AuthConfig>,
        tokens: Arc<TokenIssuer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            config,
            tokens,
            clock,
        }
    }

    pub async fn execute(&self, input: LoginInput) -> AuthResult<LoginOutcome> {
        if input.email.trim().is_empty() || input.password.is_empty() {
            return Err(AuthError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        // Malformed addresses cannot belong to an account
        let email = Email::new(&input.email).map_err(|_| AuthError::InvalidCredentials)?;

        let Some(identity) = self.repo.find_by_email(&email).await? else {
            tracing::info!("Login attempt for unknown email");
            self.hash_for_timing(input.password).await;
            return Err(AuthError::InvalidCredentials);
        };
        let credentials = self.load_credentials(&identity).await?;

        let now = self.clock.now();
        if let LockoutState::Locked { until } = credentials.lockout_state(now) {
            tracing::info!(user_id = %identity.user_id, "Login attempt on locked account");
            return Err(AuthError::AccountLocked { lock_until: until });
        }

        let password_ok = credentials
            .password_hash
            .verify_blocking(
                RawPassword::for_verification(input.password.clone()),
                self.config.password_pepper.clone(),
            )
            .await?;

        if !password_ok {
            return Err(self.fail(&identity, AuthError::InvalidCredentials).await);
        }

        self.upgrade_hash(&credentials, input.password).await;

        if !identity.two_factor_enabled {
            self.reset_failures(&credentials).await?;
            return self.complete(identity).await.map(boxed);
        }

        // Counted TOTP failures survive until a code is accepted
        let counted = self.config.count_two_factor_failures;
        if !counted {
            self.reset_failures(&credentials).await?;
        }

        match input.totp_code.as_deref().map(str::trim) {
            None | Some("") => {
                let pending_token = self.tokens.issue_pending_token(&identity)?;
                tracing::info!(user_id = %identity.user_id, "Password accepted, awaiting TOTP");
                Ok(LoginOutcome::TwoFactorRequired { pending_token })
            }
            Some(code) => {
                self.check_totp(&identity, &credentials, code).await?;
                if counted {
                    self.reset_failures(&credentials).await?;
                }
                self.complete(identity).await.map(boxed)
            }
        }
    }

    /// Second step of a two-step login. The pending token binds the code to
    /// the account whose password was verified.
    pub async fn complete_two_factor(
        &self,
        email: &str,
        code: &str,
        pending_token: Option<&str>,
    ) -> AuthResult<Session> {
        if email.trim().is_empty() || code.trim().is_empty() {
            return Err(AuthError::Validation(
                "Email and token are required".to_string(),
            ));
        }

        let claims = pending_token
            .ok_or(AuthError::Unauthenticated)
            .and_then(|t| {
                self.tokens
                    .verify_pending_token(t)
                    .map_err(|_| AuthError::Unauthenticated)
            })?;
        let user_id = claims.user_id().map_err(|_| AuthError::Unauthenticated)?;

        let identity = self
            .repo
            .find_by_id(&user_id)
            .await?
            .ok_or(AuthError::Unauthenticated)?;

        let email = Email::new(email).map_err(|_| AuthError::Unauthenticated)?;
        if identity.email != email || identity.token_version != claims.version {
            tracing::warn!(user_id = %user_id, "Pending 2FA token does not match account");
            return Err(AuthError::Unauthenticated);
        }
        if !identity.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        let credentials = self.load_credentials(&identity).await?;
        if self.config.count_two_factor_failures {
            if let LockoutState::Locked { until } = credentials.lockout_state(self.clock.now()) {
                return Err(AuthError::AccountLocked { lock_until: until });
            }
        }

        self.check_totp(&identity, &credentials, code.trim()).await?;
        self.reset_failures(&credentials).await?;
        self.complete(identity).await
    }

    async fn load_credentials(&self, identity: &Identity) -> AuthResult<Credentials> {
        self.repo
            .find_credentials(&identity.user_id)
            .await?
            .ok_or_else(|| {
                AuthError::Internal(format!("Credentials missing for {}", identity.user_id))
            })
    }

    /// Argon2 work equal to a real verification, so an unknown email is
    /// answered no faster than a wrong password
    async fn hash_for_timing(&self, password: String) {
        if let Err(e) = UserPassword::hash_blocking(
            RawPassword::for_verification(password),
            self.config.password_pepper.clone(),
            self.config.password_hash_cost,
        )
        .await
        {
            tracing::warn!(error = %e, "Timing hash failed");
        }
    }

    /// Re-hash with the configured cost when the stored hash is older.
    /// Failures are logged and do not affect the login.
    async fn upgrade_hash(&self, credentials: &Credentials, password: String) {
        let cost = self.config.password_hash_cost;
        if !credentials.password_hash.needs_rehash(cost) {
            return;
        }

        let result: AuthResult<()> = async {
            let password_hash = UserPassword::hash_blocking(
                RawPassword::for_verification(password),
                self.config.password_pepper.clone(),
                cost,
            )
            .await?;
            self.repo
                .update_password_hash(&credentials.user_id, &password_hash, self.clock.now())
                .await
        }
        .await;

        match result {
            Ok(()) => tracing::info!(user_id = %credentials.user_id, "Password hash upgraded"),
            Err(e) => {
                tracing::warn!(user_id = %credentials.user_id, error = %e, "Password hash upgrade failed")
            }
        }
    }

    async fn reset_failures(&self, credentials: &Credentials) -> AuthResult<()> {
        if credentials.failed_login_count > 0 || credentials.lock_until.is_some() {
            self.repo
                .reset_login_failures(&credentials.user_id, self.clock.now())
                .await?;
        }
        Ok(())
    }

    async fn check_totp(
        &self,
        identity: &Identity,
        credentials: &Credentials,
        code: &str,
    ) -> AuthResult<()> {
        let Some(secret) = credentials.totp_secret.as_ref() else {
            return Err(AuthError::Internal(format!(
                "2FA enabled without secret for {}",
                identity.user_id
            )));
        };

        if secret.verify_at(code, self.clock.unix_timestamp() as u64) {
            return Ok(());
        }

        if self.config.count_two_factor_failures {
            return Err(self.fail(identity, AuthError::InvalidTwoFactorCode).await);
        }
        tracing::info!(user_id = %identity.user_id, "Invalid TOTP code");
        Err(AuthError::InvalidTwoFactorCode)
    }

    /// Count a failure; a lock triggered by it wins over `err`
    async fn fail(&self, identity: &Identity, err: AuthError) -> AuthError {
        let now = self.clock.now();
        match self
            .repo
            .record_login_failure(&identity.user_id, now, &self.config.lockout)
            .await
        {
            Ok(credentials) => match credentials.lockout_state(now) {
                LockoutState::Locked { until } => {
                    tracing::warn!(
                        user_id = %identity.user_id,
                        failed_attempts = credentials.failed_login_count,
                        lock_until = %until,
                        "Account locked"
                    );
                    AuthError::AccountLocked { lock_until: until }
                }
                LockoutState::Open { failed_attempts } => {
                    tracing::info!(
                        user_id = %identity.user_id,
                        failed_attempts,
                        "Login failed"
                    );
                    err
                }
            },
            Err(e) => e,
        }
    }

    async fn complete(&self, mut identity: Identity) -> AuthResult<Session> {
        identity.record_login(self.clock.now());
        self.repo.update(&identity).await?;

        let access_token = self.tokens.issue_access_token(&identity)?;
        let refresh_token = self.tokens.issue_refresh_token(&identity)?;

        tracing::info!(user_id = %identity.user_id, "Login succeeded");

        Ok(Session {
            identity,
            access_token,
            refresh_token,
        })
    }
}

fn boxed(session: Session) -> LoginOutcome {
    LoginOutcome::Authenticated(Box::new(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{Fixture, PASSWORD};
    use crate::domain::value_object::totp_secret::TotpSecret;
    use crate::infra::memory::InMemoryAuthRepository;

    fn use_case(fx: &Fixture) -> LoginUseCase<InMemoryAuthRepository> {
        LoginUseCase::new(
            fx.repo.clone(),
            fx.config.clone(),
            fx.tokens.clone(),
            fx.dyn_clock(),
        )
    }

    fn input(email: &str, password: &str) -> LoginInput {
        LoginInput {
            email: email.to_string(),
            password: password.to_string(),
            totp_code: None,
        }
    }

    async fn enable_2fa(fx: &Fixture, identity: &Identity) -> TotpSecret {
        let secret = TotpSecret::generate();
        fx.repo
            .set_two_factor(&identity.user_id, Some(&secret), fx.clock.now())
            .await
            .unwrap();
        secret
    }

    fn session(outcome: LoginOutcome) -> Session {
        match outcome {
            LoginOutcome::Authenticated(session) => *session,
            other => panic!("expected session, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_success_issues_tokens() {
        let fx = Fixture::new();
        let identity = fx.register("carol@example.com").await;

        let session = session(
            use_case(&fx)
                .execute(input("Carol@Example.com", PASSWORD))
                .await
                .unwrap(),
        );

        assert_eq!(session.identity.user_id, identity.user_id);
        assert_eq!(session.identity.last_login_at, Some(fx.clock.now()));
        let claims = fx
            .tokens
            .verify_refresh_token(&session.refresh_token.token)
            .unwrap();
        assert_eq!(claims.version, 0);
        assert!(fx
            .tokens
            .verify_access_token(&session.access_token.token)
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_email_and_wrong_password_look_alike() {
        let fx = Fixture::new();
        fx.register("carol@example.com").await;
        let uc = use_case(&fx);

        let unknown = uc
            .execute(input("nobody@example.com", PASSWORD))
            .await
            .unwrap_err();
        let wrong = uc
            .execute(input("carol@example.com", "wrong-password"))
            .await
            .unwrap_err();

        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_unknown_email_costs_a_hash() {
        let fx = Fixture::with_config(AuthConfig {
            password_hash_cost: platform::password::HashCost {
                memory_kib: 8192,
                iterations: 2,
                parallelism: 1,
            },
            ..AuthConfig::testing()
        });
        fx.register("timing@example.com").await;
        let uc = use_case(&fx);

        let mut known = std::time::Duration::MAX;
        let mut unknown = std::time::Duration::MAX;
        for _ in 0..2 {
            let started = std::time::Instant::now();
            uc.execute(input("timing@example.com", "wrong"))
                .await
                .unwrap_err();
            known = known.min(started.elapsed());

            let started = std::time::Instant::now();
            uc.execute(input("nobody@example.com", "wrong"))
                .await
                .unwrap_err();
            unknown = unknown.min(started.elapsed());
        }

        assert!(
            unknown * 4 >= known,
            "unknown email answered in {unknown:?}, known in {known:?}"
        );
    }

    #[tokio::test]
    async fn test_fifth_failure_locks_and_lock_expires() {
        let fx = Fixture::new();
        let identity = fx.register("dave@example.com").await;
        let uc = use_case(&fx);

        for _ in 0..4 {
            let err = uc
                .execute(input("dave@example.com", "wrong"))
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }

        let err = uc
            .execute(input("dave@example.com", "wrong"))
            .await
            .unwrap_err();
        let expected = fx.clock.now() + chrono::Duration::minutes(15);
        assert!(matches!(err, AuthError::AccountLocked { lock_until } if lock_until == expected));

        // Correct password is refused while locked
        let err = uc
            .execute(input("dave@example.com", PASSWORD))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AccountLocked { .. }));

        fx.clock.advance(chrono::Duration::minutes(15));
        session(uc.execute(input("dave@example.com", PASSWORD)).await.unwrap());

        let creds = fx
            .repo
            .find_credentials(&identity.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(creds.failed_login_count, 0);
        assert!(creds.lock_until.is_none());
    }

    #[tokio::test]
    async fn test_login_upgrades_outdated_hash() {
        let fx = Fixture::new();
        let identity = fx.register("old@example.com").await;

        let raw = RawPassword::new(PASSWORD.to_string()).unwrap();
        let weak = platform::password::HashCost {
            memory_kib: 512,
            iterations: 1,
            parallelism: 1,
        };
        let weak_hash = UserPassword::from_raw(&raw, None, weak).unwrap();
        fx.repo
            .update_password_hash(&identity.user_id, &weak_hash, fx.clock.now())
            .await
            .unwrap();

        session(use_case(&fx).execute(input("old@example.com", PASSWORD)).await.unwrap());

        let creds = fx
            .repo
            .find_credentials(&identity.user_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!creds.password_hash.needs_rehash(fx.config.password_hash_cost));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let fx = Fixture::new();
        let identity = fx.register("erin@example.com").await;
        let uc = use_case(&fx);

        for _ in 0..3 {
            uc.execute(input("erin@example.com", "wrong"))
                .await
                .unwrap_err();
        }
        session(uc.execute(input("erin@example.com", PASSWORD)).await.unwrap());

        let creds = fx
            .repo
            .find_credentials(&identity.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(creds.failed_login_count, 0);
    }

    #[tokio::test]
    async fn test_two_factor_without_code_returns_pending() {
        let fx = Fixture::new();
        let identity = fx.register("frank@example.com").await;
        enable_2fa(&fx, &identity).await;

        let outcome = use_case(&fx)
            .execute(input("frank@example.com", PASSWORD))
            .await
            .unwrap();
        let LoginOutcome::TwoFactorRequired { pending_token } = outcome else {
            panic!("expected pending token");
        };
        let claims = fx.tokens.verify_pending_token(&pending_token.token).unwrap();
        assert_eq!(claims.user_id().unwrap(), identity.user_id);

        // Pending token is not an access token
        assert!(fx.tokens.verify_access_token(&pending_token.token).is_err());
    }

    #[tokio::test]
    async fn test_two_factor_inline_code() {
        let fx = Fixture::new();
        let identity = fx.register("gina@example.com").await;
        let secret = enable_2fa(&fx, &identity).await;
        let uc = use_case(&fx);

        let mut req = input("gina@example.com", PASSWORD);
        req.totp_code = Some(fx.code(&secret));
        session(uc.execute(req).await.unwrap());

        let mut req = input("gina@example.com", PASSWORD);
        req.totp_code = Some("000000".to_string());
        let err = uc.execute(req).await;
        // 000000 can collide with the real code only by chance
        if fx.code(&secret) != "000000" {
            assert!(matches!(err, Err(AuthError::InvalidTwoFactorCode)));
        }
    }

    #[tokio::test]
    async fn test_correct_password_resets_count_despite_wrong_code() {
        let fx = Fixture::new();
        let identity = fx.register("ivy@example.com").await;
        let secret = enable_2fa(&fx, &identity).await;
        let uc = use_case(&fx);

        for _ in 0..4 {
            uc.execute(input("ivy@example.com", "wrong"))
                .await
                .unwrap_err();
        }

        let wrong = if fx.code(&secret) == "000000" {
            "111111"
        } else {
            "000000"
        };
        let mut req = input("ivy@example.com", PASSWORD);
        req.totp_code = Some(wrong.to_string());
        assert!(matches!(
            uc.execute(req).await,
            Err(AuthError::InvalidTwoFactorCode)
        ));

        let creds = fx
            .repo
            .find_credentials(&identity.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(creds.failed_login_count, 0);
        assert!(creds.lock_until.is_none());
    }

    #[tokio::test]
    async fn test_complete_two_factor() {
        let fx = Fixture::new();
        let identity = fx.register("hank@example.com").await;
        let secret = enable_2fa(&fx, &identity).await;
        let uc = use_case(&fx);

        let LoginOutcome::TwoFactorRequired { pending_token } = uc
            .execute(input("hank@example.com", PASSWORD))
            .await
            .unwrap()
        else {
            panic!("expected pending token");
        };

        let err = uc
            .complete_two_factor("hank@example.com", &fx.code(&secret), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));

        let err = uc
            .complete_two_factor(
                "other@example.com",
                &fx.code(&secret),
                Some(&pending_token.token),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));

        let session = uc
            .complete_two_factor(
                "hank@example.com",
                &fx.code(&secret),
                Some(&pending_token.token),
            )
            .await
            .unwrap();
        assert_eq!(session.identity.user_id, identity.user_id);
    }

    #[tokio::test]
    async fn test_pending_token_expires() {
        let fx = Fixture::new();
        let identity = fx.register("ivy@example.com").await;
        let secret = enable_2fa(&fx, &identity).await;
        let uc = use_case(&fx);

        let LoginOutcome::TwoFactorRequired { pending_token } = uc
            .execute(input("ivy@example.com", PASSWORD))
            .await
            .unwrap()
        else {
            panic!("expected pending token");
        };

        fx.clock.advance(chrono::Duration::minutes(5));
        let err = uc
            .complete_two_factor(
                "ivy@example.com",
                &fx.code(&secret),
                Some(&pending_token.token),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn test_counted_two_factor_failures_lock() {
        let fx = Fixture::with_config(AuthConfig {
            count_two_factor_failures: true,
            ..AuthConfig::testing()
        });
        let identity = fx.register("jack@example.com").await;
        let secret = enable_2fa(&fx, &identity).await;
        let uc = use_case(&fx);

        let wrong = if fx.code(&secret) == "123456" {
            "654321"
        } else {
            "123456"
        };

        let mut last = None;
        for _ in 0..5 {
            let mut req = input("jack@example.com", PASSWORD);
            req.totp_code = Some(wrong.to_string());
            last = Some(uc.execute(req).await.unwrap_err());
        }
        assert!(matches!(last, Some(AuthError::AccountLocked { .. })));
    }
}
