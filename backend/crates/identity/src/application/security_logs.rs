//! Security Logs Use Case (read side)

use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::security_log::{Page, SecurityLogEntry, SecurityLogFilter};
use crate::domain::repository::IdentityStore;
use crate::error::IdentityResult;

pub struct SecurityLogsUseCase<R, C> {
    services: IdentityServices<R, C>,
}

impl<R, C> SecurityLogsUseCase<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(services: IdentityServices<R, C>) -> Self {
        Self { services }
    }

    /// Newest first
    pub async fn list(
        &self,
        filter: &SecurityLogFilter,
        page: Page,
    ) -> IdentityResult<(Vec<SecurityLogEntry>, u64)> {
        self.services.repo.list_logs(filter, page).await
    }
}
