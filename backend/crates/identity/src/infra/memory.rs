//! In-memory implementations
//!
//! [`MemoryIdentityRepository`] keeps every table behind one mutex, so each
//! repository call is a single critical section (including the failed-login
//! increment). Used by tests and database-less development.
//! [`MemoryEphemeralStore`] bundles the in-process limiter and denylist.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use platform::denylist::{DenylistError, MemoryTokenDenylist, TokenDenylist};
use platform::rate_limit::{
    MemoryRateLimitStore, RateLimitConfig, RateLimitError, RateLimitStore, WindowCount,
};
use tokio::sync::Mutex;

use crate::domain::entity::{
    admin_session::{AdminSession, SessionId},
    pending_user::{PendingUser, PendingUserId},
    security_log::{Page, SecurityLogEntry, SecurityLogFilter},
    user::{LockoutPolicy, LoginFailure, User},
};
use crate::domain::repository::{
    AdminSessionRepository, PendingUserRepository, SecurityLogRepository, UserRepository,
};
use crate::domain::value_object::{email::Email, user_id::UserId, user_status::UserStatus};
use crate::error::{IdentityError, IdentityResult};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    sessions: HashMap<SessionId, AdminSession>,
    /// Append order
    logs: Vec<SecurityLogEntry>,
    pending: HashMap<PendingUserId, PendingUser>,
}

#[derive(Clone, Default)]
pub struct MemoryIdentityRepository {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T>(items: Vec<T>, page: Page) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let items = items
        .into_iter()
        .skip(offset)
        .take(page.per_page as usize)
        .collect();
    (items, total)
}

impl UserRepository for MemoryIdentityRepository {
    async fn create_user(&self, user: &User) -> IdentityResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(IdentityError::EmailTaken);
        }
        tables.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn find_user(&self, user_id: &UserId) -> IdentityResult<Option<User>> {
        Ok(self.tables.lock().await.users.get(user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &Email) -> IdentityResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| &u.email == email).cloned())
    }

    async fn find_user_by_verification_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> IdentityResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| {
                u.email_verification
                    .as_ref()
                    .is_some_and(|t| t.accepts(token_hash, now))
            })
            .cloned())
    }

    async fn find_user_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> IdentityResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| {
                u.password_reset
                    .as_ref()
                    .is_some_and(|t| t.accepts(token_hash, now))
            })
            .cloned())
    }

    async fn email_exists(&self, email: &Email) -> IdentityResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().any(|u| &u.email == email))
    }

    async fn tax_id_exists(&self, tax_id: &str) -> IdentityResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .any(|u| u.profile.tax_id.as_deref() == Some(tax_id)))
    }

    async fn update_user(&self, user: &User) -> IdentityResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.users.get_mut(&user.user_id) {
            Some(stored) => {
                let mut next = user.clone();
                next.failed_login_count = stored.failed_login_count;
                next.locked_until = stored.locked_until;
                next.last_login_at = stored.last_login_at;
                *stored = next;
                Ok(())
            }
            None => Err(IdentityError::UserNotFound),
        }
    }

    async fn delete_user(&self, user_id: &UserId) -> IdentityResult<bool> {
        let mut tables = self.tables.lock().await;
        let removed = tables.users.remove(user_id).is_some();
        tables.sessions.retain(|_, s| &s.user_id != user_id);
        Ok(removed)
    }

    async fn list_users(
        &self,
        status: Option<UserStatus>,
        page: Page,
    ) -> IdentityResult<(Vec<User>, u64)> {
        let tables = self.tables.lock().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|u| status.is_none_or(|s| u.status == s))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(users, page))
    }

    async fn record_login_failure(
        &self,
        user_id: &UserId,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> IdentityResult<Option<LoginFailure>> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .users
            .get_mut(user_id)
            .map(|user| user.record_login_failure(policy, now)))
    }

    async fn record_login_success(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> IdentityResult<()> {
        if let Some(user) = self.tables.lock().await.users.get_mut(user_id) {
            user.record_login_success(now);
        }
        Ok(())
    }

    async fn clear_lockout(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> IdentityResult<()> {
        if let Some(user) = self.tables.lock().await.users.get_mut(user_id) {
            user.clear_lockout(now);
        }
        Ok(())
    }
}

impl AdminSessionRepository for MemoryIdentityRepository {
    async fn create_session(&self, session: &AdminSession) -> IdentityResult<()> {
        let mut tables = self.tables.lock().await;
        tables.sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: &SessionId) -> IdentityResult<Option<AdminSession>> {
        Ok(self.tables.lock().await.sessions.get(session_id).cloned())
    }

    async fn touch_session(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> IdentityResult<()> {
        if let Some(session) = self.tables.lock().await.sessions.get_mut(session_id) {
            session.last_activity_at = now;
        }
        Ok(())
    }

    async fn revoke_session(
        &self,
        session_id: &SessionId,
        revoked_by: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> IdentityResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.sessions.get_mut(session_id) {
            Some(session) if session.is_active => {
                session.revoke(revoked_by.copied(), now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_sessions(
        &self,
        user_id: &UserId,
        revoked_by: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> IdentityResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut revoked = 0;
        for session in tables
            .sessions
            .values_mut()
            .filter(|s| &s.user_id == user_id && s.is_active)
        {
            session.revoke(revoked_by.copied(), now);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> IdentityResult<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.expires_at > now);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn list_active_sessions(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> IdentityResult<Vec<AdminSession>> {
        let tables = self.tables.lock().await;
        let mut sessions: Vec<AdminSession> = tables
            .sessions
            .values()
            .filter(|s| s.is_valid_for(user_id, now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}

impl SecurityLogRepository for MemoryIdentityRepository {
    async fn append_log(&self, entry: &SecurityLogEntry) -> IdentityResult<()> {
        self.tables.lock().await.logs.push(entry.clone());
        Ok(())
    }

    async fn count_logs(&self, filter: &SecurityLogFilter) -> IdentityResult<u64> {
        let tables = self.tables.lock().await;
        Ok(tables.logs.iter().filter(|e| filter.matches(e)).count() as u64)
    }

    async fn list_logs(
        &self,
        filter: &SecurityLogFilter,
        page: Page,
    ) -> IdentityResult<(Vec<SecurityLogEntry>, u64)> {
        let tables = self.tables.lock().await;
        let entries: Vec<SecurityLogEntry> = tables
            .logs
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        Ok(paginate(entries, page))
    }
}

impl PendingUserRepository for MemoryIdentityRepository {
    async fn create_pending_user(&self, pending: &PendingUser) -> IdentityResult<()> {
        let mut tables = self.tables.lock().await;
        tables.pending.insert(pending.pending_id, pending.clone());
        Ok(())
    }

    async fn find_pending_user(
        &self,
        pending_id: &PendingUserId,
    ) -> IdentityResult<Option<PendingUser>> {
        Ok(self.tables.lock().await.pending.get(pending_id).cloned())
    }

    async fn pending_email_exists(&self, email: &Email) -> IdentityResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables
            .pending
            .values()
            .any(|p| p.is_pending() && &p.email == email))
    }

    async fn list_pending_users(&self, page: Page) -> IdentityResult<(Vec<PendingUser>, u64)> {
        let tables = self.tables.lock().await;
        let mut pending: Vec<PendingUser> = tables
            .pending
            .values()
            .filter(|p| p.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(paginate(pending, page))
    }

    async fn update_pending_user(&self, pending: &PendingUser) -> IdentityResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.pending.get_mut(&pending.pending_id) {
            Some(stored) => {
                *stored = pending.clone();
                Ok(())
            }
            None => Err(IdentityError::PendingUserNotFound),
        }
    }

    async fn delete_pending_user(&self, pending_id: &PendingUserId) -> IdentityResult<bool> {
        Ok(self.tables.lock().await.pending.remove(pending_id).is_some())
    }
}

/// Limiter counters and token denylist held in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryEphemeralStore {
    limiter: MemoryRateLimitStore,
    denylist: MemoryTokenDenylist,
}

impl MemoryEphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryEphemeralStore {
    async fn increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<WindowCount, RateLimitError> {
        self.limiter.increment(key, config).await
    }
}

impl TokenDenylist for MemoryEphemeralStore {
    async fn contains(&self, token: &str) -> Result<bool, DenylistError> {
        self.denylist.contains(token).await
    }

    async fn add(&self, token: &str, ttl: Duration) -> Result<(), DenylistError> {
        self.denylist.add(token, ttl).await
    }

    async fn claim(&self, token: &str, ttl: Duration) -> Result<bool, DenylistError> {
        self.denylist.claim(token, ttl).await
    }
}
