//! User Password Value Object
//!
//! Domain wrapper over `platform::password`. Hashing and verification are
//! CPU-bound, so the async helpers move them onto tokio's blocking pool.
//!
//! ## Usage
//! ```rust
//! use auth::domain::value_object::user_password::{RawPassword, UserPassword};
//! use platform::password::HashCost;
//!
//! let raw = RawPassword::new("secret1".to_string()).unwrap();
//! let hashed = UserPassword::from_raw(&raw, None, HashCost::testing()).unwrap();
//! assert!(hashed.verify(&raw, None));
//! ```

use kernel::error::app_error::{AppError, AppResult};
use platform::password::{
    ClearTextPassword, HashCost, HashedPassword, PasswordHashError, PasswordPolicyError,
};
use std::fmt;

// ============================================================================
// Raw Password (User Input)
// ============================================================================

/// Raw password from user input. Zeroized on drop.
pub struct RawPassword(ClearTextPassword);

impl RawPassword {
    /// Validate a password chosen at registration.
    ///
    /// - At least 6 and at most 128 characters after NFKC normalization
    /// - Not whitespace only
    /// - No control characters
    pub fn new(raw: String) -> AppResult<Self> {
        let clear_text = ClearTextPassword::new(raw).map_err(|e| match e {
            PasswordPolicyError::TooShort { min, .. } => AppError::bad_request(format!(
                "Password must be at least {} characters long",
                min
            ))
            .with_action("Please choose a longer password"),

            PasswordPolicyError::TooLong { max, .. } => AppError::bad_request(format!(
                "Password must be at most {} characters long",
                max
            ))
            .with_action("Please choose a shorter password"),

            PasswordPolicyError::EmptyOrWhitespace => {
                AppError::bad_request("Password cannot be empty")
                    .with_action("Please enter a password")
            }

            PasswordPolicyError::InvalidCharacter => {
                AppError::bad_request("Password contains invalid characters")
                    .with_action("Please remove any special control characters")
            }
        })?;

        Ok(Self(clear_text))
    }

    /// Wrap a password submitted at login. No policy check: any string is a
    /// legitimate (if wrong) attempt.
    pub fn for_verification(raw: String) -> Self {
        Self(ClearTextPassword::normalized(raw))
    }

    pub(crate) fn inner(&self) -> &ClearTextPassword {
        &self.0
    }
}

impl fmt::Debug for RawPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawPassword").field(&"[REDACTED]").finish()
    }
}

// ============================================================================
// User Password (Hashed, for storage)
// ============================================================================

/// Argon2id PHC string. Never serialized; `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct UserPassword(HashedPassword);

impl UserPassword {
    pub fn from_raw(raw: &RawPassword, pepper: Option<&[u8]>, cost: HashCost) -> AppResult<Self> {
        let hashed = raw.inner().hash(pepper, cost).map_err(|e| match e {
            PasswordHashError::InvalidCost(msg) => {
                AppError::internal(format!("Invalid password hash cost: {}", msg))
            }
            other => AppError::internal(format!("Password hashing failed: {}", other)),
        })?;

        Ok(Self(hashed))
    }

    /// Hash on the blocking thread pool
    pub async fn hash_blocking(
        raw: RawPassword,
        pepper: Option<Vec<u8>>,
        cost: HashCost,
    ) -> AppResult<Self> {
        tokio::task::spawn_blocking(move || Self::from_raw(&raw, pepper.as_deref(), cost))
            .await
            .map_err(|e| AppError::internal("Password hashing task failed").with_source(e))?
    }

    pub fn from_phc_string(phc_string: impl Into<String>) -> AppResult<Self> {
        let hashed = HashedPassword::from_phc_string(phc_string)
            .map_err(|_| AppError::internal("Invalid password hash in database"))?;

        Ok(Self(hashed))
    }

    pub fn as_phc_string(&self) -> &str {
        self.0.as_phc_string()
    }

    /// Constant-time verification (inside the Argon2 verifier)
    pub fn verify(&self, raw: &RawPassword, pepper: Option<&[u8]>) -> bool {
        self.0.verify(raw.inner(), pepper)
    }

    /// True when the hash was made with parameters other than `cost`
    pub fn needs_rehash(&self, cost: HashCost) -> bool {
        self.0.needs_rehash(cost)
    }

    /// Verify on the blocking thread pool
    pub async fn verify_blocking(
        &self,
        raw: RawPassword,
        pepper: Option<Vec<u8>>,
    ) -> AppResult<bool> {
        let hash = self.clone();
        tokio::task::spawn_blocking(move || hash.verify(&raw, pepper.as_deref()))
            .await
            .map_err(|e| AppError::internal("Password verification task failed").with_source(e))
    }
}

impl fmt::Debug for UserPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPassword")
            .field("hash", &"[HASH]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(raw: &RawPassword) -> UserPassword {
        UserPassword::from_raw(raw, None, HashCost::testing()).unwrap()
    }

    #[test]
    fn test_raw_password_validation() {
        assert!(RawPassword::new("secret1".to_string()).is_ok());
        assert!(RawPassword::new("short".to_string()).is_err());
        assert!(RawPassword::new("".to_string()).is_err());

        let err = RawPassword::new("abc".to_string()).unwrap_err();
        assert_eq!(err.message(), "Password must be at least 6 characters long");
    }

    #[test]
    fn test_short_password_still_verifiable() {
        // Rejected at registration, but a legitimate wrong guess at login
        let stored = hash(&RawPassword::new("secret1".to_string()).unwrap());
        let attempt = RawPassword::for_verification("wrong".to_string());
        assert!(!stored.verify(&attempt, None));
    }

    #[test]
    fn test_hash_and_verify() {
        let raw = RawPassword::new("TestPassword123!".to_string()).unwrap();
        let hashed = hash(&raw);

        assert!(hashed.verify(&raw, None));
        let wrong = RawPassword::for_verification("WrongPassword123!".to_string());
        assert!(!hashed.verify(&wrong, None));
    }

    #[test]
    fn test_phc_string_roundtrip() {
        let raw = RawPassword::new("TestPassword123!".to_string()).unwrap();
        let restored = UserPassword::from_phc_string(hash(&raw).as_phc_string()).unwrap();
        assert!(restored.verify(&raw, None));
    }

    #[test]
    fn test_debug_redaction() {
        let raw = RawPassword::new("SecretPassword123!".to_string()).unwrap();
        assert!(!format!("{:?}", raw).contains("Secret"));
        assert!(format!("{:?}", hash(&raw)).contains("[HASH]"));
    }

    #[tokio::test]
    async fn test_blocking_helpers() {
        let raw = RawPassword::new("secret1".to_string()).unwrap();
        let hashed = UserPassword::hash_blocking(raw, None, HashCost::testing())
            .await
            .unwrap();

        let ok = hashed
            .verify_blocking(RawPassword::for_verification("secret1".into()), None)
            .await
            .unwrap();
        let bad = hashed
            .verify_blocking(RawPassword::for_verification("secret2".into()), None)
            .await
            .unwrap();

        assert!(ok);
        assert!(!bad);
    }
}
