//! User Entity
//!
//! The identity aggregate: profile, lifecycle status, role, and credentials
//! (password hash, lockout counters, two-factor secrets, one-time tokens).
//! Every credential mutation goes through a method here; the repository only
//! persists the result.

use chrono::{DateTime, Duration, Utc};
use platform::password::{HashingCost, PasswordHashError};

use crate::domain::value_object::{
    email::Email,
    one_time_token::OneTimeToken,
    totp_secret::TotpSecret,
    user_id::UserId,
    user_password::{RawPassword, UserPassword},
    user_role::UserRole,
    user_status::UserStatus,
};
use crate::error::{IdentityError, IdentityResult};

/// Postal address; required for ordinary users, optional for admins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// Non-credential user attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
}

/// Lockout policy: `threshold` consecutive failures lock for `duration`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub threshold: u32,
    pub duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: 5,
            duration: Duration::minutes(30),
        }
    }
}

/// Counter state after a recorded login failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginFailure {
    pub failed_login_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LoginFailure {
    /// Whether this failure is the one that locked the account
    pub fn locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// User aggregate
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    pub email: Email,
    pub password_hash: UserPassword,
    pub role: UserRole,
    pub status: UserStatus,
    pub email_verified: bool,
    pub profile: UserProfile,
    pub email_verification: Option<OneTimeToken>,
    pub password_reset: Option<OneTimeToken>,
    pub failed_login_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
    /// Active second factor
    pub totp_secret: Option<TotpSecret>,
    /// Secret awaiting confirmation; never used for login
    pub pending_totp_secret: Option<TotpSecret>,
    pub last_login_at: Option<DateTime<Utc>>,
    /// Set when the account was anonymized by its owner
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// New self-registered user, waiting for email verification
    pub fn register(
        email: Email,
        password: &RawPassword,
        role: UserRole,
        profile: UserProfile,
        cost: &HashingCost,
        now: DateTime<Utc>,
    ) -> Result<Self, PasswordHashError> {
        let password_hash = UserPassword::from_raw(password, cost)?;
        Ok(Self::with_hash(email, password_hash, role, profile, now))
    }

    /// Build around an existing hash (staged registrations are hashed on staging)
    pub fn with_hash(
        email: Email,
        password_hash: UserPassword,
        role: UserRole,
        profile: UserProfile,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: UserId::new(),
            email,
            password_hash,
            role,
            status: UserStatus::PendingEmailVerification,
            email_verified: false,
            profile,
            email_verification: None,
            password_reset: None,
            failed_login_count: 0,
            locked_until: None,
            totp_secret: None,
            pending_totp_secret: None,
            last_login_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark verified and active without going through the token flow
    pub fn activate_verified(&mut self, now: DateTime<Utc>) {
        self.email_verified = true;
        self.email_verification = None;
        self.status = UserStatus::Active;
        self.updated_at = now;
    }

    /// Replace the password hash. The only way a password enters the aggregate.
    pub fn set_password(
        &mut self,
        password: &RawPassword,
        cost: &HashingCost,
        now: DateTime<Utc>,
    ) -> Result<(), PasswordHashError> {
        self.password_hash = UserPassword::from_raw(password, cost)?;
        self.updated_at = now;
        Ok(())
    }

    pub fn verify_password(&self, password: &RawPassword) -> bool {
        self.password_hash.verify(password)
    }

    // ------------------------------------------------------------------------
    // Email verification
    // ------------------------------------------------------------------------

    /// Issue a fresh verification token, replacing any previous one
    pub fn issue_email_verification(&mut self, ttl: Duration, now: DateTime<Utc>) -> String {
        let (plaintext, stored) = OneTimeToken::issue(ttl, now);
        self.email_verification = Some(stored);
        self.updated_at = now;
        plaintext
    }

    /// Consume the verification token; the caller has already matched it
    pub fn verify_email(&mut self, now: DateTime<Utc>) {
        self.email_verified = true;
        self.email_verification = None;
        if self.status == UserStatus::PendingEmailVerification {
            self.status = UserStatus::PendingAdminApproval;
        }
        self.updated_at = now;
    }

    // ------------------------------------------------------------------------
    // Lockout
    // ------------------------------------------------------------------------

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// Count a failed password check, locking at the threshold.
    /// A lock that has already expired starts a fresh count.
    pub fn record_login_failure(
        &mut self,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> LoginFailure {
        if self.locked_until.is_some_and(|until| until <= now) {
            self.failed_login_count = 0;
            self.locked_until = None;
        }

        self.failed_login_count = self.failed_login_count.saturating_add(1);
        if self.failed_login_count >= policy.threshold {
            self.locked_until = Some(now + policy.duration);
        }
        self.updated_at = now;

        LoginFailure {
            failed_login_count: self.failed_login_count,
            locked_until: self.locked_until,
        }
    }

    /// Successful password check
    pub fn record_login_success(&mut self, now: DateTime<Utc>) {
        self.clear_lockout(now);
        self.last_login_at = Some(now);
    }

    pub fn clear_lockout(&mut self, now: DateTime<Utc>) {
        self.failed_login_count = 0;
        self.locked_until = None;
        self.updated_at = now;
    }

    // ------------------------------------------------------------------------
    // Administrative transitions
    // ------------------------------------------------------------------------

    pub fn approve(&mut self, now: DateTime<Utc>) -> IdentityResult<()> {
        if !self.email_verified {
            return Err(IdentityError::EmailNotVerified);
        }
        if self.status != UserStatus::PendingAdminApproval {
            return Err(IdentityError::InvalidState("User is not awaiting approval"));
        }
        self.status = UserStatus::Active;
        self.updated_at = now;
        Ok(())
    }

    pub fn block(&mut self, now: DateTime<Utc>) -> IdentityResult<()> {
        if self.status != UserStatus::Active {
            return Err(IdentityError::InvalidState("Only active users can be blocked"));
        }
        self.status = UserStatus::Inactive;
        self.updated_at = now;
        Ok(())
    }

    pub fn unblock(&mut self, now: DateTime<Utc>) -> IdentityResult<()> {
        if self.status != UserStatus::Inactive || self.deleted_at.is_some() {
            return Err(IdentityError::InvalidState("User is not blocked"));
        }
        self.status = UserStatus::Active;
        self.updated_at = now;
        Ok(())
    }

    /// Returns the previous role
    pub fn change_role(&mut self, role: UserRole, now: DateTime<Utc>) -> UserRole {
        let previous = self.role;
        self.role = role;
        self.updated_at = now;
        previous
    }

    // ------------------------------------------------------------------------
    // Two-factor
    // ------------------------------------------------------------------------

    pub fn two_factor_enabled(&self) -> bool {
        self.totp_secret.is_some()
    }

    /// Store a new secret in the pending slot only
    pub fn begin_two_factor_setup(&mut self, secret: TotpSecret, now: DateTime<Utc>) {
        self.pending_totp_secret = Some(secret);
        self.updated_at = now;
    }

    /// Promote the pending secret; caller has verified a code against it
    pub fn confirm_two_factor(&mut self, now: DateTime<Utc>) -> IdentityResult<()> {
        let secret = self
            .pending_totp_secret
            .take()
            .ok_or(IdentityError::TwoFactorNotSetup)?;
        self.totp_secret = Some(secret);
        self.updated_at = now;
        Ok(())
    }

    pub fn disable_two_factor(&mut self, now: DateTime<Utc>) {
        self.totp_secret = None;
        self.pending_totp_secret = None;
        self.updated_at = now;
    }

    // ------------------------------------------------------------------------
    // Password reset / deletion
    // ------------------------------------------------------------------------

    pub fn issue_password_reset(&mut self, ttl: Duration, now: DateTime<Utc>) -> String {
        let (plaintext, stored) = OneTimeToken::issue(ttl, now);
        self.password_reset = Some(stored);
        self.updated_at = now;
        plaintext
    }

    /// Set a new password through a reset token
    ///
    /// The caller lifts any lockout through the repository.
    pub fn reset_password(
        &mut self,
        password: &RawPassword,
        cost: &HashingCost,
        now: DateTime<Utc>,
    ) -> Result<(), PasswordHashError> {
        self.set_password(password, cost, now)?;
        self.password_reset = None;
        Ok(())
    }

    /// Soft-delete: scrub personal data, keep the row for audit references
    pub fn anonymize(&mut self, cost: &HashingCost, now: DateTime<Utc>) -> Result<(), PasswordHashError> {
        let unusable = RawPassword::presented(platform::crypto::random_token(32));
        self.set_password(&unusable, cost, now)?;

        self.email = Email::anonymized(&self.user_id);
        self.profile = UserProfile {
            first_name: String::new(),
            last_name: String::new(),
            ..UserProfile::default()
        };
        self.status = UserStatus::Inactive;
        self.email_verification = None;
        self.password_reset = None;
        self.totp_secret = None;
        self.pending_totp_secret = None;
        self.deleted_at = Some(now);
        Ok(())
    }
}
