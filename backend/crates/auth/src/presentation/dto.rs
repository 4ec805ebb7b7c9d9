//! API DTOs (Data Transfer Objects)
//!
//! Request fields default to empty so that a missing field is reported by
//! the use case as a validation error rather than a JSON rejection.

use serde::{Deserialize, Serialize};

use crate::domain::entity::Identity;
use crate::domain::value_object::totp_secret::Provisioning;

// ============================================================================
// Register
// ============================================================================

/// Register request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

/// Public view of an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
}

impl From<&Identity> for UserResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.user_id.to_string(),
            username: identity.username.as_str().to_string(),
            email: identity.email.as_str().to_string(),
            role: identity.role.code().to_string(),
        }
    }
}

// ============================================================================
// Login
// ============================================================================

/// Login request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// TOTP code if 2FA is enabled
    pub totp_code: Option<String>,
}

/// Login, 2FA login and session check response. Tokens travel only in
/// cookies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEnvelope {
    pub user: UserResponse,
}

impl From<&Identity> for UserEnvelope {
    fn from(identity: &Identity) -> Self {
        Self {
            user: identity.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// Two-Factor
// ============================================================================

/// 2FA generate response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorGenerateResponse {
    /// Secret for manual entry
    pub secret: String,
    /// otpauth:// URL
    pub qr_code: String,
    /// QR code as base64-encoded PNG
    pub qr_image: String,
}

impl From<Provisioning> for TwoFactorGenerateResponse {
    fn from(p: Provisioning) -> Self {
        Self {
            secret: p.secret,
            qr_code: p.otpauth_url,
            qr_image: p.qr_image_base64,
        }
    }
}

/// 2FA enrollment verify request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TwoFactorVerifyRequest {
    /// Current TOTP code
    pub token: String,
    /// Secret returned by generate
    pub secret: String,
}

/// Second step of a 2FA login
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TwoFactorLoginRequest {
    pub email: String,
    pub token: String,
}

/// 2FA disable request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TwoFactorDisableRequest {
    /// Current TOTP code to confirm disable
    pub token: String,
}
