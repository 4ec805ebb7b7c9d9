//! Password Hashing and Verification
//!
//! - Argon2id hashing with a tunable cost (memory, iterations, lanes)
//! - Zeroization of clear text on drop
//! - Constant-time verification (inside the Argon2 verifier)
//! - Unicode NFKC normalization before hashing and before verifying
//!
//! Salts are 128-bit values drawn from the operating system CSPRNG.

use std::fmt;

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::rngs::OsRng;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Minimum password length in code points
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Maximum password length in code points
pub const MAX_PASSWORD_LENGTH: usize = 128;

// ============================================================================
// Error Types
// ============================================================================

/// Password policy violation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordPolicyError {
    #[error("Password must be at least {min} characters long (got {actual})")]
    TooShort { min: usize, actual: usize },

    #[error("Password must be at most {max} characters long (got {actual})")]
    TooLong { max: usize, actual: usize },

    #[error("Password cannot be empty or contain only whitespace")]
    EmptyOrWhitespace,

    #[error("Password contains invalid control characters")]
    InvalidCharacter,
}

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordHashError {
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,

    #[error("Invalid Argon2 cost parameters: {0}")]
    InvalidCost(String),
}

// ============================================================================
// Hash cost
// ============================================================================

/// Argon2id cost factor.
///
/// Verification always uses the parameters embedded in the stored hash, so
/// changing the cost only affects newly created hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    /// OWASP recommendation: m=19456 (19 MiB), t=2, p=1
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashCost {
    /// Minimal cost for tests and local tooling. Never use in production.
    pub const fn testing() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn hasher(&self) -> Result<Argon2<'static>, PasswordHashError> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| PasswordHashError::InvalidCost(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

// ============================================================================
// Clear Text Password (Zeroized on drop)
// ============================================================================

/// Clear text password with automatic memory zeroization.
///
/// Not `Clone`, and `Debug` output is redacted.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ClearTextPassword(String);

impl ClearTextPassword {
    /// Normalize and validate a password chosen at registration.
    pub fn new(raw: String) -> Result<Self, PasswordPolicyError> {
        let candidate = Self::normalized(raw);
        let normalized = candidate.0.as_str();

        if normalized.trim().is_empty() {
            return Err(PasswordPolicyError::EmptyOrWhitespace);
        }

        let char_count = normalized.chars().count();

        if char_count < MIN_PASSWORD_LENGTH {
            return Err(PasswordPolicyError::TooShort {
                min: MIN_PASSWORD_LENGTH,
                actual: char_count,
            });
        }

        if char_count > MAX_PASSWORD_LENGTH {
            return Err(PasswordPolicyError::TooLong {
                max: MAX_PASSWORD_LENGTH,
                actual: char_count,
            });
        }

        // Space, tab and newline are allowed
        if normalized
            .chars()
            .any(|ch| ch.is_control() && ch != '\t' && ch != '\n')
        {
            return Err(PasswordPolicyError::InvalidCharacter);
        }

        Ok(candidate)
    }

    /// Normalize a password submitted at login.
    ///
    /// No policy is applied: a login attempt with a password that could never
    /// have been registered must still count as a failed verification.
    pub fn normalized(raw: String) -> Self {
        let mut raw = raw;
        let normalized: String = raw.nfkc().collect();
        raw.zeroize();
        Self(normalized)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    fn peppered(&self, pepper: Option<&[u8]>) -> Vec<u8> {
        let mut bytes = self.as_bytes().to_vec();
        if let Some(p) = pepper {
            bytes.extend_from_slice(p);
        }
        bytes
    }

    /// Hash the password with Argon2id at the given cost.
    ///
    /// This is CPU and memory heavy; async callers should run it on a
    /// blocking thread.
    pub fn hash(
        &self,
        pepper: Option<&[u8]>,
        cost: HashCost,
    ) -> Result<HashedPassword, PasswordHashError> {
        let mut password_bytes = self.peppered(pepper);
        let salt = SaltString::generate(OsRng);

        let result = cost
            .hasher()?
            .hash_password(&password_bytes, &salt)
            .map(|hash| HashedPassword {
                hash: hash.to_string(),
            })
            .map_err(|e| PasswordHashError::HashingFailed(e.to_string()));

        password_bytes.zeroize();
        result
    }
}

impl fmt::Debug for ClearTextPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClearTextPassword")
            .field(&"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Hashed Password (Safe to store)
// ============================================================================

/// Hashed password in PHC string format
/// (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`).
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword {
    hash: String,
}

impl HashedPassword {
    /// Create from a PHC string (e.g. from the database)
    pub fn from_phc_string(s: impl Into<String>) -> Result<Self, PasswordHashError> {
        let hash = s.into();
        PasswordHash::new(&hash).map_err(|_| PasswordHashError::InvalidHashFormat)?;
        Ok(Self { hash })
    }

    pub fn as_phc_string(&self) -> &str {
        &self.hash
    }

    /// Verify a password against this hash.
    ///
    /// `pepper` must match the one used at hashing time. Any parse failure
    /// is reported as a mismatch.
    pub fn verify(&self, password: &ClearTextPassword, pepper: Option<&[u8]>) -> bool {
        let parsed_hash = match PasswordHash::new(&self.hash) {
            Ok(h) => h,
            Err(_) => return false,
        };

        let mut password_bytes = password.peppered(pepper);
        // Parameters come from the PHC string, not from Argon2::default()
        let ok = Argon2::default()
            .verify_password(&password_bytes, &parsed_hash)
            .is_ok();
        password_bytes.zeroize();
        ok
    }

    /// True when the stored hash is not Argon2id or was made with a weaker
    /// cost than `current`.
    pub fn needs_rehash(&self, current: HashCost) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(&self.hash) else {
            return true;
        };

        if parsed_hash.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }

        match Params::try_from(&parsed_hash) {
            Ok(params) => {
                params.m_cost() < current.memory_kib || params.t_cost() < current.iterations
            }
            Err(_) => true,
        }
    }
}

impl fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashedPassword")
            .field("hash", &"[HASH]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password(s: &str) -> ClearTextPassword {
        ClearTextPassword::normalized(s.to_string())
    }

    #[test]
    fn test_password_too_short() {
        let result = ClearTextPassword::new("abc12".to_string());
        assert!(matches!(
            result,
            Err(PasswordPolicyError::TooShort { min: 6, actual: 5 })
        ));
    }

    #[test]
    fn test_password_minimum_length_accepted() {
        assert!(ClearTextPassword::new("secret".to_string()).is_ok());
        assert!(ClearTextPassword::new("secret1".to_string()).is_ok());
    }

    #[test]
    fn test_password_too_long() {
        let long_password = "a".repeat(MAX_PASSWORD_LENGTH + 1);
        let result = ClearTextPassword::new(long_password);
        assert!(matches!(result, Err(PasswordPolicyError::TooLong { .. })));
    }

    #[test]
    fn test_password_whitespace_only() {
        let result = ClearTextPassword::new("        ".to_string());
        assert!(matches!(
            result,
            Err(PasswordPolicyError::EmptyOrWhitespace)
        ));
    }

    #[test]
    fn test_password_control_character() {
        let result = ClearTextPassword::new("abc\u{0007}defg".to_string());
        assert!(matches!(result, Err(PasswordPolicyError::InvalidCharacter)));
    }

    #[test]
    fn test_length_counts_code_points() {
        // 6 code points, 18 bytes
        assert!(ClearTextPassword::new("パスワード安".to_string()).is_ok());
    }

    #[test]
    fn test_hash_and_verify() {
        let pw = password("TestPassword123!");
        let hashed = pw.hash(None, HashCost::testing()).unwrap();

        assert!(hashed.verify(&pw, None));
        assert!(!hashed.verify(&password("WrongPassword123!"), None));
        assert!(!hashed.verify(&password(""), None));
    }

    #[test]
    fn test_nfkc_normalization_on_verify() {
        // Fullwidth "ＡＢＣ" normalizes to "ABC"
        let pw = password("ＡＢＣdefg");
        let hashed = pw.hash(None, HashCost::testing()).unwrap();
        assert!(hashed.verify(&password("ABCdefg"), None));
    }

    #[test]
    fn test_hash_with_pepper() {
        let pw = password("TestPassword123!");
        let pepper = b"my_secret_pepper";
        let hashed = pw.hash(Some(pepper), HashCost::testing()).unwrap();

        assert!(hashed.verify(&pw, Some(pepper)));
        assert!(!hashed.verify(&pw, None));
        assert!(!hashed.verify(&pw, Some(b"wrong_pepper")));
    }

    #[test]
    fn test_salts_differ() {
        let pw = password("same-password");
        let a = pw.hash(None, HashCost::testing()).unwrap();
        let b = pw.hash(None, HashCost::testing()).unwrap();
        assert_ne!(a.as_phc_string(), b.as_phc_string());
    }

    #[test]
    fn test_phc_string_restore() {
        let pw = password("TestPassword123!");
        let hashed = pw.hash(None, HashCost::testing()).unwrap();

        let restored = HashedPassword::from_phc_string(hashed.as_phc_string()).unwrap();
        assert!(restored.verify(&pw, None));
        assert!(restored.as_phc_string().starts_with("$argon2id$"));
    }

    #[test]
    fn test_invalid_phc_string() {
        assert!(HashedPassword::from_phc_string("not_a_valid_hash").is_err());
    }

    #[test]
    fn test_needs_rehash() {
        let pw = password("TestPassword123!");
        let weak = pw.hash(None, HashCost::testing()).unwrap();
        assert!(weak.needs_rehash(HashCost::default()));
        assert!(!weak.needs_rehash(HashCost::testing()));
    }

    #[test]
    fn test_debug_redaction() {
        let pw = password("secret");
        let debug_output = format!("{:?}", pw);
        assert!(debug_output.contains("REDACTED"));
        assert!(!debug_output.contains("secret"));

        let hashed = pw.hash(None, HashCost::testing()).unwrap();
        assert!(!format!("{:?}", hashed).contains("argon2"));
    }
}
