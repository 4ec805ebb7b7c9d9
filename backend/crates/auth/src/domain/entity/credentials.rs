//! Credentials Entity
//!
//! Sensitive authentication data for an identity, kept apart from the
//! public profile:
//! - Password hash
//! - TOTP secret (present only while 2FA is enabled)
//! - Login failure tracking and temporary lockout

use chrono::{DateTime, Duration, Utc};

use crate::domain::value_object::{
    totp_secret::TotpSecret, user_id::UserId, user_password::UserPassword,
};

/// Lockout thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that lock the account
    pub max_failures: u32,
    /// How long the lock lasts
    pub lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failures: 5,
            lock_duration: Duration::minutes(15),
        }
    }
}

/// Derived view of the failure counter and lock-until
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutState {
    Open { failed_attempts: u32 },
    Locked { until: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: UserId,
    pub password_hash: UserPassword,
    pub totp_secret: Option<TotpSecret>,
    /// Consecutive failures since the last success or expired lock
    pub failed_login_count: u32,
    pub lock_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Credentials {
    pub fn new(user_id: UserId, password_hash: UserPassword, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            password_hash,
            totp_secret: None,
            failed_login_count: 0,
            lock_until: None,
            updated_at: now,
        }
    }

    /// Locked while `now < lock_until`; unlocks by itself afterwards
    pub fn lockout_state(&self, now: DateTime<Utc>) -> LockoutState {
        match self.lock_until {
            Some(until) if now < until => LockoutState::Locked { until },
            Some(_) => LockoutState::Open { failed_attempts: 0 },
            None => LockoutState::Open {
                failed_attempts: self.failed_login_count,
            },
        }
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        matches!(self.lockout_state(now), LockoutState::Locked { .. })
    }

    /// Record a failed verification and lock when the threshold is reached.
    ///
    /// A failure after an expired lock starts a new count.
    pub fn record_failure(&mut self, now: DateTime<Utc>, policy: &LockoutPolicy) -> LockoutState {
        match self.lock_until {
            Some(until) if now >= until => {
                self.failed_login_count = 1;
                self.lock_until = None;
            }
            _ => self.failed_login_count = self.failed_login_count.saturating_add(1),
        }

        if self.failed_login_count >= policy.max_failures {
            self.lock_until = Some(now + policy.lock_duration);
        }
        self.updated_at = now;

        self.lockout_state(now)
    }

    /// Clear failures after a successful password check
    pub fn reset_failures(&mut self, now: DateTime<Utc>) {
        self.failed_login_count = 0;
        self.lock_until = None;
        self.updated_at = now;
    }

    pub fn replace_password_hash(&mut self, password_hash: UserPassword, now: DateTime<Utc>) {
        self.password_hash = password_hash;
        self.updated_at = now;
    }

    pub fn enable_two_factor(&mut self, secret: TotpSecret, now: DateTime<Utc>) {
        self.totp_secret = Some(secret);
        self.updated_at = now;
    }

    pub fn disable_two_factor(&mut self, now: DateTime<Utc>) {
        self.totp_secret = None;
        self.updated_at = now;
    }
}
