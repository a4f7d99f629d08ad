//! One-Time Token Value Object
//!
//! Single-use tokens for email verification and password reset.
//! Only the SHA-256 digest is stored; the plaintext leaves the process once,
//! inside a notification.

use chrono::{DateTime, Duration, Utc};

use platform::crypto::{random_token, sha256_hex};

/// Random bytes per token (64 hex characters)
const TOKEN_BYTES: usize = 32;

/// Stored half of a one-time token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimeToken {
    token_hash: String,
    expires_at: DateTime<Utc>,
}

impl OneTimeToken {
    /// Generate a fresh token; returns the plaintext and the stored half
    pub fn issue(ttl: Duration, now: DateTime<Utc>) -> (String, Self) {
        let plaintext = random_token(TOKEN_BYTES);
        let stored = Self {
            token_hash: Self::digest(&plaintext),
            expires_at: now + ttl,
        };
        (plaintext, stored)
    }

    /// Digest used as the lookup key
    pub fn digest(plaintext: &str) -> String {
        sha256_hex(plaintext.trim().as_bytes())
    }

    pub fn from_db(token_hash: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            token_hash,
            expires_at,
        }
    }

    pub fn token_hash(&self) -> &str {
        &self.token_hash
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Matches `digest` and has not expired
    pub fn accepts(&self, digest: &str, now: DateTime<Utc>) -> bool {
        self.expires_at > now
            && platform::crypto::constant_time_eq(self.token_hash.as_bytes(), digest.as_bytes())
    }
}
