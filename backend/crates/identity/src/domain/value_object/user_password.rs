//! User Password Value Object
//!
//! Domain wrappers around `platform::password`.
//!
//! - [`RawPassword`]: user input, zeroized on drop
//! - [`UserPassword`]: Argon2id PHC string, the only form that is persisted
//!
//! ```rust
//! use identity::domain::value_object::user_password::{RawPassword, UserPassword};
//! use platform::password::HashingCost;
//!
//! let raw = RawPassword::new("Str0ng!Passphrase".to_string()).unwrap();
//! let hashed = UserPassword::from_raw(&raw, &HashingCost::minimal()).unwrap();
//! assert!(hashed.verify(&raw));
//! ```

use platform::password::{
    ClearTextPassword, HashedPassword, HashingCost, PasswordHashError, PasswordPolicyError,
};
use std::fmt;

// ============================================================================
// Raw Password (User Input)
// ============================================================================

/// Raw password from user input
pub struct RawPassword(ClearTextPassword);

impl RawPassword {
    /// A newly chosen password; the strength policy applies
    pub fn new(raw: String) -> Result<Self, PasswordPolicyError> {
        ClearTextPassword::new(raw).map(Self)
    }

    /// A presented password (login, re-authentication); no policy
    pub fn presented(raw: String) -> Self {
        Self(ClearTextPassword::for_verification(raw))
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

/// Hashed user password for database storage
#[derive(Clone, PartialEq, Eq)]
pub struct UserPassword(HashedPassword);

impl UserPassword {
    /// Hash a raw password
    pub fn from_raw(raw: &RawPassword, cost: &HashingCost) -> Result<Self, PasswordHashError> {
        raw.inner().hash(cost).map(Self)
    }

    /// Create from PHC string (from database)
    pub fn from_phc_string(phc_string: impl Into<String>) -> Result<Self, PasswordHashError> {
        HashedPassword::from_phc_string(phc_string).map(Self)
    }

    /// Get PHC string for database storage
    pub fn as_phc_string(&self) -> &str {
        self.0.as_phc_string()
    }

    /// Verify a raw password against this hash (constant time)
    pub fn verify(&self, raw: &RawPassword) -> bool {
        self.0.verify(raw.inner())
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

    #[test]
    fn test_policy_applies_only_to_new_passwords() {
        assert!(RawPassword::new("weak".to_string()).is_err());
        // A presented password is checked against the hash, never the policy
        let _ = RawPassword::presented("weak".to_string());
    }

    #[test]
    fn test_hash_and_verify() {
        let raw = RawPassword::new("Str0ng!Passphrase".to_string()).unwrap();
        let hashed = UserPassword::from_raw(&raw, &HashingCost::minimal()).unwrap();

        assert!(hashed.verify(&RawPassword::presented("Str0ng!Passphrase".to_string())));
        assert!(!hashed.verify(&RawPassword::presented("Str0ng!Passphrasf".to_string())));

        let restored = UserPassword::from_phc_string(hashed.as_phc_string()).unwrap();
        assert!(restored.verify(&raw));
    }

    #[test]
    fn test_debug_redaction() {
        let raw = RawPassword::new("Secret!Passw0rd".to_string()).unwrap();
        assert!(!format!("{:?}", raw).contains("Secret"));

        let hashed = UserPassword::from_raw(&raw, &HashingCost::minimal()).unwrap();
        assert!(format!("{:?}", hashed).contains("[HASH]"));
    }
}
