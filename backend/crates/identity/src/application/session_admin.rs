//! Session Administration Use Case

use chrono::Utc;
use platform::client::ClientContext;
use serde_json::json;

use crate::application::token::Principal;
use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::admin_session::{AdminSession, SessionId};
use crate::domain::entity::security_log::{Outcome, SecurityEventType, SecurityLogEntry};
use crate::domain::repository::IdentityStore;
use crate::error::{IdentityError, IdentityResult};

pub struct SessionAdminUseCase<R, C> {
    services: IdentityServices<R, C>,
}

impl<R, C> SessionAdminUseCase<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(services: IdentityServices<R, C>) -> Self {
        Self { services }
    }

    /// The caller's own active sessions
    pub async fn list_own(&self, actor: &Principal) -> IdentityResult<Vec<AdminSession>> {
        self.services
            .repo
            .list_active_sessions(&actor.user_id, Utc::now())
            .await
    }

    /// End one session; unknown and already ended sessions are both not found
    pub async fn revoke(
        &self,
        actor: &Principal,
        session_id: &SessionId,
        client: &ClientContext,
    ) -> IdentityResult<()> {
        let now = Utc::now();
        let session = self
            .services
            .repo
            .find_session(session_id)
            .await?
            .ok_or(IdentityError::SessionNotFound)?;

        if !self
            .services
            .repo
            .revoke_session(session_id, Some(&actor.user_id), now)
            .await?
        {
            return Err(IdentityError::SessionNotFound);
        }

        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::SessionRevoked, Outcome::Success, client, now)
                    .with_user(actor.user_id)
                    .with_details(json!({
                        "sessionId": session_id,
                        "targetUserId": session.user_id,
                    })),
            )
            .await;

        tracing::info!(session_id = %session_id, actor = %actor.user_id, "Admin session revoked");
        Ok(())
    }
}
