//! Security Log Entity
//!
//! Append-only audit facts. Entries are never updated; the suspicious
//! activity monitor reads them back through [`SecurityLogFilter`].

use chrono::{DateTime, Utc};
use kernel::id::{Id, markers};
use platform::client::ClientContext;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::value_object::user_id::UserId;

pub type LogId = Id<markers::SecurityLog>;

/// Kind of security event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    LoginSuccess,
    LoginFailure,
    AccountLocked,
    RoleChange,
    SessionRevoked,
    SuspiciousActivity,
    Registration,
    EmailVerified,
    UserApproved,
    UserRejected,
    UserBlocked,
    UserUnblocked,
    UserDeleted,
    TwoFactorChallenge,
    TwoFactorFailure,
    TwoFactorEnabled,
    TwoFactorDisabled,
    Logout,
    AccessDenied,
    RateLimited,
    PasswordChanged,
    PasswordReset,
    AccountDeleted,
}

impl SecurityEventType {
    pub const ALL: [Self; 23] = [
        Self::LoginSuccess,
        Self::LoginFailure,
        Self::AccountLocked,
        Self::RoleChange,
        Self::SessionRevoked,
        Self::SuspiciousActivity,
        Self::Registration,
        Self::EmailVerified,
        Self::UserApproved,
        Self::UserRejected,
        Self::UserBlocked,
        Self::UserUnblocked,
        Self::UserDeleted,
        Self::TwoFactorChallenge,
        Self::TwoFactorFailure,
        Self::TwoFactorEnabled,
        Self::TwoFactorDisabled,
        Self::Logout,
        Self::AccessDenied,
        Self::RateLimited,
        Self::PasswordChanged,
        Self::PasswordReset,
        Self::AccountDeleted,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailure => "login_failure",
            Self::AccountLocked => "account_locked",
            Self::RoleChange => "role_change",
            Self::SessionRevoked => "session_revoked",
            Self::SuspiciousActivity => "suspicious_activity",
            Self::Registration => "registration",
            Self::EmailVerified => "email_verified",
            Self::UserApproved => "user_approved",
            Self::UserRejected => "user_rejected",
            Self::UserBlocked => "user_blocked",
            Self::UserUnblocked => "user_unblocked",
            Self::UserDeleted => "user_deleted",
            Self::TwoFactorChallenge => "two_factor_challenge",
            Self::TwoFactorFailure => "two_factor_failure",
            Self::TwoFactorEnabled => "two_factor_enabled",
            Self::TwoFactorDisabled => "two_factor_disabled",
            Self::Logout => "logout",
            Self::AccessDenied => "access_denied",
            Self::RateLimited => "rate_limited",
            Self::PasswordChanged => "password_changed",
            Self::PasswordReset => "password_reset",
            Self::AccountDeleted => "account_deleted",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.code() == code)
    }

    /// Events produced by administrators acting on other accounts
    pub fn is_admin_action(&self) -> bool {
        matches!(
            self,
            Self::RoleChange
                | Self::SessionRevoked
                | Self::UserApproved
                | Self::UserRejected
                | Self::UserBlocked
                | Self::UserUnblocked
                | Self::UserDeleted
        )
    }

    pub fn admin_actions() -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(Self::is_admin_action)
            .collect()
    }
}

impl fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

/// One audit fact
#[derive(Debug, Clone)]
pub struct SecurityLogEntry {
    pub log_id: LogId,
    /// Actor; `None` for unauthenticated failures
    pub user_id: Option<UserId>,
    pub event_type: SecurityEventType,
    pub outcome: Outcome,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl SecurityLogEntry {
    pub fn new(
        event_type: SecurityEventType,
        outcome: Outcome,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            log_id: LogId::new(),
            user_id: None,
            event_type,
            outcome,
            ip_address: client.ip_string(),
            user_agent: client.user_agent.clone(),
            details: serde_json::Value::Object(serde_json::Map::new()),
            created_at: now,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Read-side filter; every field narrows the result
#[derive(Debug, Clone, Default)]
pub struct SecurityLogFilter {
    /// Any of these event types (empty = all)
    pub event_types: Vec<SecurityEventType>,
    pub user_id: Option<UserId>,
    pub ip_address: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// Matches `details.pattern` of suspicious-activity entries
    pub pattern: Option<String>,
}

impl SecurityLogFilter {
    pub fn matches(&self, entry: &SecurityLogEntry) -> bool {
        (self.event_types.is_empty() || self.event_types.contains(&entry.event_type))
            && self.user_id.is_none_or(|id| entry.user_id == Some(id))
            && self
                .ip_address
                .as_deref()
                .is_none_or(|ip| entry.ip_address.as_deref() == Some(ip))
            && self.since.is_none_or(|since| entry.created_at >= since)
            && self.pattern.as_deref().is_none_or(|pattern| {
                entry.details.get("pattern").and_then(|p| p.as_str()) == Some(pattern)
            })
    }
}

/// 1-based pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}
