//! Identity Entity
//!
//! Public account profile. Credential material lives in
//! [`Credentials`](super::credentials::Credentials) and is loaded only when
//! asked for.

use chrono::{DateTime, Utc};

use crate::domain::value_object::{
    email::Email, user_id::UserId, user_name::UserName, user_role::UserRole,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: UserName,
    /// Unique, lower-cased login identifier
    pub email: Email,
    pub role: UserRole,
    /// Set only after a successful enrollment verify
    pub two_factor_enabled: bool,
    /// Bumped on logout; refresh tokens carrying an older value are dead
    pub token_version: i64,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(username: UserName, email: Email, role: UserRole, now: DateTime<Utc>) -> Self {
        Self {
            user_id: UserId::new(),
            username,
            email,
            role,
            two_factor_enabled: false,
            token_version: 0,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record successful login
    pub fn record_login(&mut self, now: DateTime<Utc>) {
        self.last_login_at = Some(now);
        self.updated_at = now;
    }
}
