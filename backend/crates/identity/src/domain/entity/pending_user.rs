//! Pending User Entity
//!
//! Staged registration awaiting an administrator. Acceptance turns it into
//! an active, verified [`User`]; rejection keeps the row marked `rejected`.

use chrono::{DateTime, Utc};
use kernel::id::{Id, markers};

use super::user::{User, UserProfile};
use crate::domain::value_object::{
    email::Email, user_password::UserPassword, user_role::UserRole,
};

pub type PendingUserId = Id<markers::PendingUser>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingStatus {
    Pending,
    Rejected,
}

impl PendingStatus {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "pending" => Some(Self::Pending),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingUser {
    pub pending_id: PendingUserId,
    pub email: Email,
    pub password_hash: UserPassword,
    pub role: UserRole,
    pub profile: UserProfile,
    pub status: PendingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingUser {
    pub fn new(
        email: Email,
        password_hash: UserPassword,
        role: UserRole,
        profile: UserProfile,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            pending_id: PendingUserId::new(),
            email,
            password_hash,
            role,
            profile,
            status: PendingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PendingStatus::Pending
    }

    pub fn reject(&mut self, now: DateTime<Utc>) {
        self.status = PendingStatus::Rejected;
        self.updated_at = now;
    }

    /// Accepted staged users skip the verification flow
    pub fn into_user(self, now: DateTime<Utc>) -> User {
        let mut user = User::with_hash(self.email, self.password_hash, self.role, self.profile, now);
        user.activate_verified(now);
        user
    }
}
