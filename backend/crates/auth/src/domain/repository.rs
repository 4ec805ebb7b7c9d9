//! Repository Traits
//!
//! Interfaces for data persistence. Implementations are in the
//! infrastructure layer.
//!
//! Whole-record updates are last-writer-wins. Counters that must not lose
//! increments under concurrency (login failures, token version) have
//! dedicated atomic operations.

use chrono::{DateTime, Utc};

use crate::domain::entity::{Credentials, Identity, LockoutPolicy};
use crate::domain::value_object::{
    email::Email, totp_secret::TotpSecret, user_id::UserId, user_password::UserPassword,
};
use crate::error::AuthResult;

/// Identity (public profile) repository
#[trait_variant::make(IdentityRepository: Send)]
pub trait LocalIdentityRepository {
    /// Persist a new identity together with its credentials.
    ///
    /// Fails with `DuplicateEmail` when the email is taken.
    async fn create(&self, identity: &Identity, credentials: &Credentials) -> AuthResult<()>;

    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<Identity>>;

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<Identity>>;

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool>;

    /// Update profile fields. The token version and the 2FA flag are only
    /// changed through their dedicated operations.
    async fn update(&self, identity: &Identity) -> AuthResult<()>;

    /// Atomically bump the token version, returning the new value
    async fn increment_token_version(&self, user_id: &UserId) -> AuthResult<i64>;
}

/// Credentials repository. Never used for default identity reads.
#[trait_variant::make(CredentialsRepository: Send)]
pub trait LocalCredentialsRepository {
    async fn find_credentials(&self, user_id: &UserId) -> AuthResult<Option<Credentials>>;

    /// Swap the stored hash only; counters and the TOTP secret are untouched
    async fn update_password_hash(
        &self,
        user_id: &UserId,
        password_hash: &UserPassword,
        now: DateTime<Utc>,
    ) -> AuthResult<()>;

    /// Atomically count a failed login and lock when the policy says so
    async fn record_login_failure(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> AuthResult<Credentials>;

    async fn reset_login_failures(&self, user_id: &UserId, now: DateTime<Utc>) -> AuthResult<()>;

    /// Store (`Some`) or clear (`None`) the TOTP secret and set the
    /// identity's 2FA flag to match, in one step
    async fn set_two_factor(
        &self,
        user_id: &UserId,
        secret: Option<&TotpSecret>,
        now: DateTime<Utc>,
    ) -> AuthResult<()>;
}

/// Everything the auth use cases need from storage
pub trait AuthStore: IdentityRepository + CredentialsRepository + Send + Sync + 'static {}

impl<T> AuthStore for T where T: IdentityRepository + CredentialsRepository + Send + Sync + 'static {}
