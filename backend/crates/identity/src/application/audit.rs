//! Security audit helper
//!
//! Appending to the security log never fails the operation being audited;
//! a write failure is logged and dropped.

use crate::domain::entity::security_log::SecurityLogEntry;
use crate::domain::repository::SecurityLogRepository;

pub async fn record<R>(repo: &R, entry: SecurityLogEntry)
where
    R: SecurityLogRepository + Sync,
{
    if let Err(e) = repo.append_log(&entry).await {
        tracing::error!(
            error = %e,
            event_type = %entry.event_type,
            "Failed to append security log entry"
        );
    }
}
