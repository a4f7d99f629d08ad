//! Repository Traits
//!
//! Interfaces for data persistence. Implementations live in the
//! infrastructure layer (PostgreSQL and in-memory).

use chrono::{DateTime, Utc};

use crate::domain::entity::{
    admin_session::{AdminSession, SessionId},
    pending_user::{PendingUser, PendingUserId},
    security_log::{Page, SecurityLogEntry, SecurityLogFilter},
    user::{LockoutPolicy, LoginFailure, User},
};
use crate::domain::value_object::{email::Email, user_id::UserId, user_status::UserStatus};
use crate::error::IdentityResult;

/// User repository trait
#[trait_variant::make(UserRepository: Send)]
pub trait LocalUserRepository {
    /// Create a new user
    async fn create_user(&self, user: &User) -> IdentityResult<()>;

    /// Find user by ID
    async fn find_user(&self, user_id: &UserId) -> IdentityResult<Option<User>>;

    /// Find user by (normalized) email
    async fn find_user_by_email(&self, email: &Email) -> IdentityResult<Option<User>>;

    /// Find the user holding an unexpired verification token with this digest
    async fn find_user_by_verification_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> IdentityResult<Option<User>>;

    /// Find the user holding an unexpired reset token with this digest
    async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> IdentityResult<Option<User>>;

    async fn email_exists(&self, email: &Email) -> IdentityResult<bool>;

    async fn tax_id_exists(&self, tax_id: &str) -> IdentityResult<bool>;

    /// Persist the aggregate's mutable fields except login tracking
    ///
    /// `failed_login_count`, `locked_until` and `last_login_at` are left as
    /// stored; only the atomic login operations below change them, so a
    /// stale copy written back cannot undo a lock.
    async fn update_user(&self, user: &User) -> IdentityResult<()>;

    /// Hard delete; sessions cascade, audit entries stay. Returns false if absent.
    async fn delete_user(&self, user_id: &UserId) -> IdentityResult<bool>;

    /// Newest first, optionally filtered by status; returns (page, total)
    async fn list_users(
        &self,
        status: Option<UserStatus>,
        page: Page,
    ) -> IdentityResult<(Vec<User>, u64)>;

    /// Atomically count one failed login and lock at the policy threshold.
    /// `None` if the user no longer exists.
    async fn record_login_failure(
        &self,
        user_id: &UserId,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> IdentityResult<Option<LoginFailure>>;

    /// Reset the failure count, lift any lock and stamp `last_login_at`
    async fn record_login_success(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> IdentityResult<()>;

    /// Reset the failure count and lift any lock
    async fn clear_lockout(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> IdentityResult<()>;
}

/// Admin session repository trait
#[trait_variant::make(AdminSessionRepository: Send)]
pub trait LocalAdminSessionRepository {
    async fn create_session(&self, session: &AdminSession) -> IdentityResult<()>;

    async fn find_session(&self, session_id: &SessionId) -> IdentityResult<Option<AdminSession>>;

    /// Update last activity
    async fn touch_session(&self, session_id: &SessionId, now: DateTime<Utc>)
    -> IdentityResult<()>;

    /// Deactivate one session; false if it was not active
    async fn revoke_session(
        &self,
        session_id: &SessionId,
        revoked_by: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> IdentityResult<bool>;

    /// Deactivate every active session of a user
    async fn revoke_all_sessions(
        &self,
        user_id: &UserId,
        revoked_by: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> IdentityResult<u64>;

    /// Hard delete sessions past their expiry
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> IdentityResult<u64>;

    async fn list_active_sessions(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> IdentityResult<Vec<AdminSession>>;
}

/// Security log repository trait (append-only)
#[trait_variant::make(SecurityLogRepository: Send)]
pub trait LocalSecurityLogRepository {
    async fn append_log(&self, entry: &SecurityLogEntry) -> IdentityResult<()>;

    async fn count_logs(&self, filter: &SecurityLogFilter) -> IdentityResult<u64>;

    /// Newest first; returns (page, total)
    async fn list_logs(
        &self,
        filter: &SecurityLogFilter,
        page: Page,
    ) -> IdentityResult<(Vec<SecurityLogEntry>, u64)>;
}

/// Staged registration repository trait
#[trait_variant::make(PendingUserRepository: Send)]
pub trait LocalPendingUserRepository {
    async fn create_pending_user(&self, pending: &PendingUser) -> IdentityResult<()>;

    async fn find_pending_user(
        &self,
        pending_id: &PendingUserId,
    ) -> IdentityResult<Option<PendingUser>>;

    /// Only staged rows still in `pending` count
    async fn pending_email_exists(&self, email: &Email) -> IdentityResult<bool>;

    /// Rows still in `pending`, oldest first
    async fn list_pending_users(&self, page: Page) -> IdentityResult<(Vec<PendingUser>, u64)>;

    async fn update_pending_user(&self, pending: &PendingUser) -> IdentityResult<()>;

    async fn delete_pending_user(&self, pending_id: &PendingUserId) -> IdentityResult<bool>;
}

/// Everything the identity use cases persist through
pub trait IdentityStore:
    UserRepository
    + AdminSessionRepository
    + SecurityLogRepository
    + PendingUserRepository
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> IdentityStore for T where
    T: UserRepository
        + AdminSessionRepository
        + SecurityLogRepository
        + PendingUserRepository
        + Clone
        + Send
        + Sync
        + 'static
{
}
