//! User Name Value Object
//!
//! Display name chosen at registration. Not unique and not used to sign in;
//! the email is the login identifier.
//!
//! Processing order: NFKC normalization, trim, validation.

use kernel::error::app_error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Maximum length for user name (in characters)
pub const USER_NAME_MAX_LENGTH: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserName(String);

impl UserName {
    pub fn new(input: impl AsRef<str>) -> AppResult<Self> {
        let normalized: String = input.as_ref().nfkc().collect();
        let trimmed = normalized.trim();

        if trimmed.is_empty() {
            return Err(AppError::bad_request("Username is required"));
        }

        let len = trimmed.chars().count();
        if len > USER_NAME_MAX_LENGTH {
            return Err(AppError::bad_request(format!(
                "Username must be at most {} characters (got {})",
                USER_NAME_MAX_LENGTH, len
            )));
        }

        if trimmed.chars().any(char::is_control) {
            return Err(AppError::bad_request("Username contains invalid characters")
                .with_action("Please remove line breaks and control characters"));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Rehydrate a value that was validated before it was stored
    pub fn from_db(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
