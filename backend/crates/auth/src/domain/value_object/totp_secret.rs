//! TOTP Secret Value Object
//!
//! RFC 6238 with Google Authenticator compatible settings: SHA-1, 6 digits,
//! 30 second step. One step of skew is accepted on either side.

use kernel::error::app_error::{AppError, AppResult};
use std::fmt;
use totp_rs::{Algorithm, Secret, TOTP};

pub const TOTP_DIGITS: usize = 6;
pub const TOTP_STEP: u64 = 30;
pub const TOTP_SKEW: u8 = 1;

/// Minimum accepted secret size (RFC 4226 requires at least 128 bits)
const MIN_SECRET_BYTES: usize = 16;

/// Base32-encoded TOTP shared secret
#[derive(Clone, PartialEq, Eq)]
pub struct TotpSecret {
    secret_base32: String,
}

/// Material handed to the client during enrollment
#[derive(Debug, Clone)]
pub struct Provisioning {
    pub secret: String,
    /// `otpauth://totp/<issuer>:<account>?secret=...&issuer=...`
    pub otpauth_url: String,
    /// PNG QR code, base64 encoded
    pub qr_image_base64: String,
}

impl TotpSecret {
    /// Generate a new random 160-bit secret
    pub fn generate() -> Self {
        Self {
            secret_base32: Secret::generate_secret().to_encoded().to_string(),
        }
    }

    /// Parse a base32 secret (from the database or the enrollment request)
    pub fn from_base32(secret: impl Into<String>) -> AppResult<Self> {
        let secret_base32 = secret.into().trim().to_ascii_uppercase();
        let bytes = Secret::Encoded(secret_base32.clone())
            .to_bytes()
            .map_err(|_| AppError::bad_request("Invalid two-factor secret"))?;

        if bytes.len() < MIN_SECRET_BYTES {
            return Err(AppError::bad_request("Two-factor secret is too short"));
        }

        Ok(Self { secret_base32 })
    }

    pub fn as_base32(&self) -> &str {
        &self.secret_base32
    }

    fn bytes(&self) -> AppResult<Vec<u8>> {
        Secret::Encoded(self.secret_base32.clone())
            .to_bytes()
            .map_err(|e| AppError::internal(format!("Invalid TOTP secret: {:?}", e)))
    }

    /// Labelled instance, used for provisioning URIs and QR codes
    fn labelled(&self, issuer: &str, account_name: &str) -> AppResult<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            self.bytes()?,
            Some(issuer.to_string()),
            account_name.to_string(),
        )
        .map_err(|e| AppError::internal(format!("Failed to create TOTP: {}", e)))
    }

    /// Unlabelled instance; the label does not affect codes
    fn checker(&self) -> AppResult<TOTP> {
        Ok(TOTP::new_unchecked(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            self.bytes()?,
            None,
            String::new(),
        ))
    }

    /// Check `code` against the windows around `unix_time`.
    ///
    /// Anything that is not exactly six ASCII digits is rejected.
    pub fn verify_at(&self, code: &str, unix_time: u64) -> bool {
        let code = code.trim();
        if code.len() != TOTP_DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }

        match self.checker() {
            Ok(totp) => totp.check(code, unix_time),
            Err(e) => {
                tracing::error!(error = %e, "Stored TOTP secret is unusable");
                false
            }
        }
    }

    /// Code for the window containing `unix_time`
    pub fn generate_at(&self, unix_time: u64) -> AppResult<String> {
        Ok(self.checker()?.generate(unix_time))
    }

    /// Enrollment material for an authenticator app
    pub fn provisioning(&self, issuer: &str, account_name: &str) -> AppResult<Provisioning> {
        let totp = self.labelled(issuer, account_name)?;
        let qr_image_base64 = totp
            .get_qr_base64()
            .map_err(|e| AppError::internal(format!("Failed to generate QR code: {}", e)))?;

        Ok(Provisioning {
            secret: self.secret_base32.clone(),
            otpauth_url: totp.get_url(),
            qr_image_base64,
        })
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TotpSecret")
            .field("secret_base32", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_generate_is_160_bits() {
        let secret = TotpSecret::generate();
        // 20 bytes -> 32 base32 chars
        assert_eq!(secret.as_base32().len(), 32);
        assert_ne!(secret, TotpSecret::generate());
    }

    #[test]
    fn test_current_window_verifies() {
        let secret = TotpSecret::generate();
        let code = secret.generate_at(NOW).unwrap();
        assert!(secret.verify_at(&code, NOW));
    }

    #[test]
    fn test_adjacent_windows_verify() {
        let secret = TotpSecret::generate();
        let previous = secret.generate_at(NOW - TOTP_STEP).unwrap();
        let next = secret.generate_at(NOW + TOTP_STEP).unwrap();
        assert!(secret.verify_at(&previous, NOW));
        assert!(secret.verify_at(&next, NOW));
    }

    #[test]
    fn test_three_windows_away_fails() {
        let secret = TotpSecret::generate();
        let stale = secret.generate_at(NOW - 3 * TOTP_STEP).unwrap();
        let current = secret.generate_at(NOW).unwrap();
        // Guard against the one-in-a-million collision
        if stale != current {
            assert!(!secret.verify_at(&stale, NOW));
        }
    }

    #[test]
    fn test_malformed_codes_rejected() {
        let secret = TotpSecret::generate();
        assert!(!secret.verify_at("", NOW));
        assert!(!secret.verify_at("12345", NOW));
        assert!(!secret.verify_at("abcdef", NOW));
        assert!(!secret.verify_at("1234567", NOW));
    }

    #[test]
    fn test_from_base32() {
        let secret = TotpSecret::generate();
        let restored = TotpSecret::from_base32(secret.as_base32().to_lowercase()).unwrap();
        assert_eq!(secret, restored);

        assert!(TotpSecret::from_base32("not base32 at all!").is_err());
        // 80 bits, below the 128-bit floor
        assert!(TotpSecret::from_base32("JBSWY3DPEHPK3PXP").is_err());
    }

    #[test]
    fn test_provisioning() {
        let secret = TotpSecret::generate();
        let p = secret.provisioning("TechNest", "user@example.com").unwrap();

        assert_eq!(p.secret, secret.as_base32());
        assert!(p.otpauth_url.starts_with("otpauth://totp/TechNest:"));
        assert!(p.otpauth_url.contains(&format!("secret={}", secret.as_base32())));
        assert!(p.otpauth_url.contains("issuer=TechNest"));
        assert!(!p.qr_image_base64.is_empty());
    }

    #[test]
    fn test_debug_redaction() {
        let secret = TotpSecret::generate();
        assert!(!format!("{:?}", secret).contains(secret.as_base32()));
    }
}
