//! Auth Error Types
//!
//! Auth-specific error variants rendered through the unified
//! `kernel::error::AppError` (RFC 7807) envelope.

use axum::response::{IntoResponse, Response};
use chrono::{DateTime, SecondsFormat, Utc};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed or missing input
    #[error("{0}")]
    Validation(String),

    #[error("User already exists")]
    DuplicateEmail,

    /// Password rejected by the registration policy
    #[error("{0}")]
    WeakPassword(String),

    /// Unknown email or wrong password (deliberately indistinguishable)
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is locked. Please try again later.")]
    AccountLocked { lock_until: DateTime<Utc> },

    #[error("Two-factor authentication required")]
    TwoFactorRequired,

    #[error("Invalid 2FA code")]
    InvalidTwoFactorCode,

    #[error("Two-factor authentication is not enabled")]
    TwoFactorNotEnabled,

    #[error("Two-factor authentication is already enabled")]
    TwoFactorAlreadyEnabled,

    #[error("No refresh token provided")]
    RefreshTokenMissing,

    #[error("Refresh token has expired. Please login again.")]
    RefreshTokenExpired,

    #[error("Invalid refresh token")]
    RefreshTokenInvalid,

    /// Missing, invalid or expired access token
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("User not found")]
    UserNotFound,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_)
            | AuthError::DuplicateEmail
            | AuthError::WeakPassword(_)
            | AuthError::TwoFactorNotEnabled => ErrorKind::BadRequest,
            AuthError::InvalidCredentials
            | AuthError::InvalidTwoFactorCode
            | AuthError::RefreshTokenMissing
            | AuthError::RefreshTokenExpired
            | AuthError::RefreshTokenInvalid
            | AuthError::Unauthenticated => ErrorKind::Unauthorized,
            AuthError::AccountLocked { .. } => ErrorKind::Locked,
            AuthError::TwoFactorRequired | AuthError::Forbidden => ErrorKind::Forbidden,
            AuthError::TwoFactorAlreadyEnabled => ErrorKind::Conflict,
            AuthError::UserNotFound => ErrorKind::NotFound,
            AuthError::Database(_) | AuthError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Machine-readable code carried in the response body
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::DuplicateEmail => "DUPLICATE_EMAIL",
            AuthError::WeakPassword(_) => "WEAK_PASSWORD",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::AccountLocked { .. } => "ACCOUNT_LOCKED",
            AuthError::TwoFactorRequired => "TWO_FACTOR_REQUIRED",
            AuthError::InvalidTwoFactorCode => "INVALID_TWO_FACTOR_CODE",
            AuthError::TwoFactorNotEnabled => "TWO_FACTOR_NOT_ENABLED",
            AuthError::TwoFactorAlreadyEnabled => "TWO_FACTOR_ALREADY_ENABLED",
            AuthError::RefreshTokenMissing => "REFRESH_TOKEN_MISSING",
            AuthError::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
            AuthError::RefreshTokenInvalid => "REFRESH_TOKEN_INVALID",
            AuthError::Unauthenticated => "UNAUTHENTICATED",
            AuthError::Forbidden => "AUTHORIZATION_ERROR",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::Database(_) | AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to AppError.
    ///
    /// Server errors get a generic message so database details never reach
    /// the client.
    pub fn to_app_error(&self) -> AppError {
        let message = if self.kind().is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let err = AppError::new(self.kind(), message).with_detail("code", self.code());

        match self {
            AuthError::AccountLocked { lock_until } => err.with_detail(
                "lockUntil",
                lock_until.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            AuthError::TwoFactorRequired => err.with_detail("requiresTwoFactor", true),
            AuthError::Forbidden => err.with_action("Contact an administrator for access"),
            AuthError::RefreshTokenExpired | AuthError::RefreshTokenInvalid => {
                err.with_action("Please sign in again")
            }
            _ => err,
        }
    }

    /// Log the error with appropriate level
    fn log(&self) {
        match self {
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Auth database error");
            }
            AuthError::Internal(msg) => {
                tracing::error!(message = %msg, "Auth internal error");
            }
            AuthError::InvalidCredentials => {
                tracing::warn!("Invalid login attempt");
            }
            AuthError::AccountLocked { lock_until } => {
                tracing::warn!(%lock_until, "Login attempt on locked account");
            }
            AuthError::RefreshTokenInvalid => {
                tracing::warn!("Rejected refresh token");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

/// Value objects report validation problems as `AppError`s.
impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        match err.kind() {
            ErrorKind::BadRequest => AuthError::Validation(err.message().to_string()),
            _ => AuthError::Internal(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(err: tokio::task::JoinError) -> Self {
        AuthError::Internal(format!("Blocking task failed: {}", err))
    }
}
