//! User Status Value Object
//!
//! The coarse lifecycle state that gates login:
//!
//! ```text
//! pending_email_verification -> pending_admin_approval -> active <-> inactive
//! ```
//!
//! Status and role are independent axes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// User lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum UserStatus {
    /// Registered, email not yet confirmed
    #[default]
    PendingEmailVerification = 0,

    /// Email confirmed, waiting for an administrator
    PendingAdminApproval = 1,

    /// Normal account - can login
    Active = 2,

    /// Blocked by an administrator, or self-deleted
    Inactive = 3,
}

impl UserStatus {
    /// Get numeric ID for database storage
    #[inline]
    pub const fn id(&self) -> i16 {
        *self as i16
    }

    /// Get string code for serialization/API
    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PendingEmailVerification => "pending_email_verification",
            Self::PendingAdminApproval => "pending_admin_approval",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Check if login is allowed
    #[inline]
    pub const fn can_login(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Create from numeric ID
    #[inline]
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(Self::PendingEmailVerification),
            1 => Some(Self::PendingAdminApproval),
            2 => Some(Self::Active),
            3 => Some(Self::Inactive),
            _ => None,
        }
    }

    /// Create from string code
    #[inline]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "pending_email_verification" => Some(Self::PendingEmailVerification),
            "pending_admin_approval" => Some(Self::PendingAdminApproval),
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
