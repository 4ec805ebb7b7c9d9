//! In-memory repository
//!
//! `DashMap`-backed store for tests and local development. Per-record
//! mutations run under the shard lock of the entry, which makes the failure
//! counter and token version increments atomic.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::domain::entity::{Credentials, Identity, LockoutPolicy};
use crate::domain::repository::{CredentialsRepository, IdentityRepository};
use crate::domain::value_object::{
    email::Email, totp_secret::TotpSecret, user_id::UserId, user_password::UserPassword,
};
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone)]
struct Record {
    identity: Identity,
    credentials: Credentials,
}

#[derive(Debug, Default)]
struct Inner {
    records: DashMap<UserId, Record>,
    /// Lower-cased email -> id
    emails: DashMap<String, UserId>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryAuthRepository {
    inner: Arc<Inner>,
}

impl InMemoryAuthRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    fn with_record<T>(
        &self,
        user_id: &UserId,
        f: impl FnOnce(&mut Record) -> T,
    ) -> AuthResult<T> {
        let mut record = self
            .inner
            .records
            .get_mut(user_id)
            .ok_or(AuthError::UserNotFound)?;
        Ok(f(&mut record))
    }
}

impl IdentityRepository for InMemoryAuthRepository {
    async fn create(&self, identity: &Identity, credentials: &Credentials) -> AuthResult<()> {
        match self.inner.emails.entry(identity.email.as_str().to_string()) {
            Entry::Occupied(_) => Err(AuthError::DuplicateEmail),
            Entry::Vacant(slot) => {
                self.inner.records.insert(
                    identity.user_id,
                    Record {
                        identity: identity.clone(),
                        credentials: credentials.clone(),
                    },
                );
                slot.insert(identity.user_id);
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<Identity>> {
        Ok(self
            .inner
            .records
            .get(user_id)
            .map(|r| r.identity.clone()))
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<Identity>> {
        // Copy the id out so the index guard is released before the lookup
        let Some(user_id) = self.inner.emails.get(email.as_str()).map(|id| *id) else {
            return Ok(None);
        };
        self.find_by_id(&user_id).await
    }

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool> {
        Ok(self.inner.emails.contains_key(email.as_str()))
    }

    async fn update(&self, identity: &Identity) -> AuthResult<()> {
        let previous = self.with_record(&identity.user_id, |r| r.identity.email.clone())?;

        if previous != identity.email {
            match self.inner.emails.entry(identity.email.as_str().to_string()) {
                Entry::Occupied(_) => return Err(AuthError::DuplicateEmail),
                Entry::Vacant(slot) => {
                    slot.insert(identity.user_id);
                }
            }
            self.inner.emails.remove(previous.as_str());
        }

        self.with_record(&identity.user_id, |r| {
            let stored = &mut r.identity;
            stored.username = identity.username.clone();
            stored.email = identity.email.clone();
            stored.role = identity.role;
            stored.last_login_at = identity.last_login_at;
            stored.updated_at = identity.updated_at;
        })
    }

    async fn increment_token_version(&self, user_id: &UserId) -> AuthResult<i64> {
        self.with_record(user_id, |r| {
            r.identity.token_version += 1;
            r.identity.token_version
        })
    }
}

impl CredentialsRepository for InMemoryAuthRepository {
    async fn find_credentials(&self, user_id: &UserId) -> AuthResult<Option<Credentials>> {
        Ok(self
            .inner
            .records
            .get(user_id)
            .map(|r| r.credentials.clone()))
    }

    async fn update_password_hash(
        &self,
        user_id: &UserId,
        password_hash: &UserPassword,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        self.with_record(user_id, |r| {
            r.credentials
                .replace_password_hash(password_hash.clone(), now)
        })
    }

    async fn record_login_failure(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> AuthResult<Credentials> {
        self.with_record(user_id, |r| {
            r.credentials.record_failure(now, policy);
            r.credentials.clone()
        })
    }

    async fn reset_login_failures(&self, user_id: &UserId, now: DateTime<Utc>) -> AuthResult<()> {
        self.with_record(user_id, |r| r.credentials.reset_failures(now))
    }

    async fn set_two_factor(
        &self,
        user_id: &UserId,
        secret: Option<&TotpSecret>,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        self.with_record(user_id, |r| {
            match secret {
                Some(secret) => r.credentials.enable_two_factor(secret.clone(), now),
                None => r.credentials.disable_two_factor(now),
            }
            r.identity.two_factor_enabled = secret.is_some();
            r.identity.updated_at = now;
        })
    }
}
