//! TOTP Secret Value Object
//!
//! Wraps a TOTP secret for two-factor authentication.
//! Google Authenticator compatible: SHA-1, 6 digits, 30 second step.

use kernel::error::app_error::{AppError, AppResult};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use totp_rs::{Algorithm, Secret, TOTP};

const TOTP_DIGITS: usize = 6;
const TOTP_STEP: u64 = 30;
/// Accepted clock drift, in steps either side of the current one
const TOTP_SKEW: u8 = 2;

/// TOTP Secret for two-factor authentication
#[derive(Clone, PartialEq, Eq)]
pub struct TotpSecret {
    /// Base32-encoded secret
    secret_base32: String,
}

/// Issuer and account shown in the authenticator app
#[derive(Debug, Clone, Copy)]
pub struct TotpLabel<'a> {
    pub issuer: &'a str,
    pub account: &'a str,
}

/// Provisioning material returned once, at setup
#[derive(Debug, Clone)]
pub struct TotpProvisioning {
    pub secret: String,
    pub otpauth_url: String,
    /// QR code as base64-encoded PNG
    pub qr_code_base64: String,
}

impl TotpSecret {
    /// Generate a new random TOTP secret (160 bits)
    pub fn generate() -> Self {
        let secret = Secret::generate_secret();
        Self {
            secret_base32: secret.to_encoded().to_string(),
        }
    }

    /// Create from a base32-encoded string (from database)
    pub fn from_base32(secret: impl Into<String>) -> AppResult<Self> {
        let secret_str = secret.into();
        Secret::Encoded(secret_str.clone())
            .to_bytes()
            .map_err(|e| AppError::internal(format!("Invalid TOTP secret: {:?}", e)))?;

        Ok(Self {
            secret_base32: secret_str,
        })
    }

    /// Get the base32-encoded secret for storage
    pub fn as_base32(&self) -> &str {
        &self.secret_base32
    }

    fn to_totp(&self, label: TotpLabel<'_>) -> AppResult<TOTP> {
        let bytes = Secret::Encoded(self.secret_base32.clone())
            .to_bytes()
            .map_err(|e| AppError::internal(format!("Invalid TOTP secret: {:?}", e)))?;

        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            bytes,
            Some(label.issuer.to_string()),
            label.account.to_string(),
        )
        .map_err(|e| AppError::internal(format!("Failed to create TOTP: {}", e)))
    }

    /// Verify a code against the current time, tolerating `TOTP_SKEW` steps
    pub fn verify(&self, code: &str, label: TotpLabel<'_>) -> AppResult<bool> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AppError::internal(format!("System clock before epoch: {}", e)))?;
        self.verify_at(code, label, now.as_secs())
    }

    /// Verify a code against `unix_secs`
    pub fn verify_at(&self, code: &str, label: TotpLabel<'_>, unix_secs: u64) -> AppResult<bool> {
        let code = code.trim();
        if code.len() != TOTP_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }
        let totp = self.to_totp(label)?;
        Ok(totp.check(code, unix_secs))
    }

    /// Secret, otpauth:// URL and scannable QR code
    pub fn provisioning(&self, label: TotpLabel<'_>) -> AppResult<TotpProvisioning> {
        let totp = self.to_totp(label)?;
        let qr_code_base64 = totp
            .get_qr_base64()
            .map_err(|e| AppError::internal(format!("Failed to generate QR code: {}", e)))?;

        Ok(TotpProvisioning {
            secret: self.secret_base32.clone(),
            otpauth_url: totp.get_url(),
            qr_code_base64,
        })
    }

    /// Generate current TOTP code (for testing)
    #[cfg(test)]
    pub fn generate_current(&self, label: TotpLabel<'_>) -> AppResult<String> {
        let totp = self.to_totp(label)?;
        totp.generate_current()
            .map_err(|e| AppError::internal(format!("Failed to generate TOTP: {}", e)))
    }

    #[cfg(test)]
    pub fn generate_at(&self, label: TotpLabel<'_>, unix_secs: u64) -> AppResult<String> {
        Ok(self.to_totp(label)?.generate(unix_secs))
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TotpSecret")
            .field("secret_base32", &"[REDACTED]")
            .finish()
    }
}
