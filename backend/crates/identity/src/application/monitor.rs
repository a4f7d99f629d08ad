//! Suspicious Activity Monitor
//!
//! Counts recent security log entries against fixed patterns and appends a
//! `suspicious_activity` entry when one is breached. Advisory only: nothing
//! here blocks a request, and store errors are logged, not returned.

use chrono::{DateTime, Duration, Utc};
use platform::client::ClientContext;
use serde_json::json;

use crate::domain::entity::security_log::{
    Outcome, SecurityEventType, SecurityLogEntry, SecurityLogFilter,
};
use crate::domain::repository::SecurityLogRepository;
use crate::domain::value_object::user_id::UserId;
use crate::error::IdentityResult;

/// Pattern name for repeated failed logins from one IP
pub const LOGIN_FAILURE_BURST: &str = "login_failure_burst";
/// Pattern name for a burst of administrative actions by one actor
pub const ADMIN_ACTION_BURST: &str = "admin_action_burst";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorRules {
    pub login_failure_threshold: u64,
    pub login_failure_window: Duration,
    pub admin_action_threshold: u64,
    pub admin_action_window: Duration,
}

impl Default for MonitorRules {
    fn default() -> Self {
        Self {
            login_failure_threshold: 10,
            login_failure_window: Duration::hours(1),
            admin_action_threshold: 100,
            admin_action_window: Duration::minutes(5),
        }
    }
}

pub struct ActivityMonitor<'a, R> {
    repo: &'a R,
    rules: MonitorRules,
}

impl<'a, R> ActivityMonitor<'a, R>
where
    R: SecurityLogRepository + Sync,
{
    pub fn new(repo: &'a R, rules: MonitorRules) -> Self {
        Self { repo, rules }
    }

    /// Failed logins from the client's IP. Returns true if an alert was written.
    pub async fn check_login_failures(&self, client: &ClientContext, now: DateTime<Utc>) -> bool {
        let Some(ip) = client.ip_string() else {
            return false;
        };
        let since = now - self.rules.login_failure_window;

        let observed = SecurityLogFilter {
            event_types: vec![SecurityEventType::LoginFailure],
            ip_address: Some(ip.clone()),
            since: Some(since),
            ..Default::default()
        };
        let already_raised = SecurityLogFilter {
            event_types: vec![SecurityEventType::SuspiciousActivity],
            ip_address: Some(ip.clone()),
            since: Some(since),
            pattern: Some(LOGIN_FAILURE_BURST.to_string()),
            ..Default::default()
        };

        let alert = SecurityLogEntry::new(
            SecurityEventType::SuspiciousActivity,
            Outcome::Failure,
            client,
            now,
        );

        self.evaluate(
            observed,
            already_raised,
            self.rules.login_failure_threshold,
            self.rules.login_failure_window,
            alert,
            LOGIN_FAILURE_BURST,
        )
        .await
    }

    /// Administrative actions by one actor. Returns true if an alert was written.
    pub async fn check_admin_actions(
        &self,
        actor: &UserId,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) -> bool {
        let since = now - self.rules.admin_action_window;

        let observed = SecurityLogFilter {
            event_types: SecurityEventType::admin_actions(),
            user_id: Some(*actor),
            since: Some(since),
            ..Default::default()
        };
        let already_raised = SecurityLogFilter {
            event_types: vec![SecurityEventType::SuspiciousActivity],
            user_id: Some(*actor),
            since: Some(since),
            pattern: Some(ADMIN_ACTION_BURST.to_string()),
            ..Default::default()
        };

        let alert = SecurityLogEntry::new(
            SecurityEventType::SuspiciousActivity,
            Outcome::Failure,
            client,
            now,
        )
        .with_user(*actor);

        self.evaluate(
            observed,
            already_raised,
            self.rules.admin_action_threshold,
            self.rules.admin_action_window,
            alert,
            ADMIN_ACTION_BURST,
        )
        .await
    }

    async fn evaluate(
        &self,
        observed: SecurityLogFilter,
        already_raised: SecurityLogFilter,
        threshold: u64,
        window: Duration,
        alert: SecurityLogEntry,
        pattern: &'static str,
    ) -> bool {
        match self
            .try_evaluate(observed, already_raised, threshold, window, alert, pattern)
            .await
        {
            Ok(raised) => raised,
            Err(e) => {
                tracing::error!(error = %e, pattern, "Suspicious activity check failed");
                false
            }
        }
    }

    async fn try_evaluate(
        &self,
        observed: SecurityLogFilter,
        already_raised: SecurityLogFilter,
        threshold: u64,
        window: Duration,
        alert: SecurityLogEntry,
        pattern: &'static str,
    ) -> IdentityResult<bool> {
        let count = self.repo.count_logs(&observed).await?;
        if count < threshold {
            return Ok(false);
        }
        // One alert per subject per window
        if self.repo.count_logs(&already_raised).await? > 0 {
            return Ok(false);
        }

        let alert = alert.with_details(json!({
            "pattern": pattern,
            "count": count,
            "threshold": threshold,
            "windowSecs": window.num_seconds(),
        }));
        tracing::warn!(
            pattern,
            count,
            ip = alert.ip_address.as_deref().unwrap_or("-"),
            "Suspicious activity detected"
        );
        self.repo.append_log(&alert).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::MemoryIdentityRepository;

    async fn admin_actions(
        repo: &MemoryIdentityRepository,
        actor: UserId,
        n: usize,
        at: DateTime<Utc>,
    ) {
        for _ in 0..n {
            let entry = SecurityLogEntry::new(
                SecurityEventType::UserApproved,
                Outcome::Success,
                &ClientContext::default(),
                at,
            )
            .with_user(actor);
            repo.append_log(&entry).await.unwrap();
        }
    }

    fn alerts(actor: UserId) -> SecurityLogFilter {
        SecurityLogFilter {
            event_types: vec![SecurityEventType::SuspiciousActivity],
            user_id: Some(actor),
            pattern: Some(ADMIN_ACTION_BURST.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_admin_action_burst_raises_one_alert() {
        let repo = MemoryIdentityRepository::new();
        let monitor = ActivityMonitor::new(&repo, MonitorRules::default());
        let actor = UserId::new();
        let client = ClientContext::default();
        let now = Utc::now();

        // Actions older than five minutes do not count
        admin_actions(&repo, actor, 50, now - Duration::minutes(6)).await;
        admin_actions(&repo, actor, 99, now).await;
        assert!(!monitor.check_admin_actions(&actor, &client, now).await);

        admin_actions(&repo, actor, 1, now).await;
        assert!(monitor.check_admin_actions(&actor, &client, now).await);
        assert!(!monitor.check_admin_actions(&actor, &client, now).await);
        assert_eq!(repo.count_logs(&alerts(actor)).await.unwrap(), 1);

        // Another administrator is counted separately
        let other = UserId::new();
        admin_actions(&repo, other, 10, now).await;
        assert!(!monitor.check_admin_actions(&other, &client, now).await);
    }

    #[tokio::test]
    async fn test_login_failures_without_ip_are_ignored() {
        let repo = MemoryIdentityRepository::new();
        let monitor = ActivityMonitor::new(&repo, MonitorRules::default());
        assert!(!monitor.check_login_failures(&ClientContext::default(), Utc::now()).await);
    }
}
