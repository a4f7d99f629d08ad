//! Admin Session Entity
//!
//! Server-held capability bound to one administrator login. A bearer token
//! carrying a session id is only honored while its session is active and
//! unexpired.

use chrono::{DateTime, Duration, Utc};
use kernel::id::{Id, markers};
use platform::client::ClientContext;

use crate::domain::value_object::user_id::UserId;

pub type SessionId = Id<markers::AdminSession>;

/// Admin session entity
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub is_active: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<UserId>,
}

impl AdminSession {
    /// TTL is provided by the application layer (config), not hard-coded here.
    pub fn new(user_id: UserId, client: &ClientContext, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            session_id: SessionId::new(),
            user_id,
            ip_address: client.ip_string(),
            user_agent: client.user_agent.clone(),
            created_at: now,
            expires_at: now + ttl,
            last_activity_at: now,
            is_active: true,
            revoked_at: None,
            revoked_by: None,
        }
    }

    /// Active, unexpired, and owned by `user_id`.
    /// Not found, expired and revoked are indistinguishable to callers.
    pub fn is_valid_for(&self, user_id: &UserId, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now && &self.user_id == user_id
    }

    pub fn revoke(&mut self, revoked_by: Option<UserId>, now: DateTime<Utc>) {
        self.is_active = false;
        self.revoked_at = Some(now);
        self.revoked_by = revoked_by;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_validity() {
        let now = Utc::now();
        let owner = UserId::new();
        let client = ClientContext::new(Some("127.0.0.1".parse().unwrap()), None);
        let mut session = AdminSession::new(owner, &client, Duration::hours(8), now);

        assert_eq!(session.ip_address.as_deref(), Some("127.0.0.1"));
        assert!(session.is_valid_for(&owner, now));
        assert!(!session.is_valid_for(&UserId::new(), now));
        assert!(!session.is_valid_for(&owner, now + Duration::hours(8)));

        session.revoke(Some(owner), now);
        assert!(!session.is_valid_for(&owner, now));
        assert_eq!(session.revoked_by, Some(owner));
    }
}
