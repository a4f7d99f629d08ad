//! Sign Out Use Case
//!
//! Denylists the presenting token for the rest of its lifetime and ends the
//! admin session it is bound to, if any.

use chrono::Utc;
use platform::client::ClientContext;

use crate::application::token::Principal;
use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::security_log::{Outcome, SecurityEventType, SecurityLogEntry};
use crate::domain::repository::IdentityStore;
use crate::error::IdentityResult;

/// Sign out use case
pub struct SignOutUseCase<R, C> {
    services: IdentityServices<R, C>,
}

impl<R, C> SignOutUseCase<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(services: IdentityServices<R, C>) -> Self {
        Self { services }
    }

    pub async fn logout(&self, principal: &Principal, client: &ClientContext) -> IdentityResult<()> {
        let now = Utc::now();
        self.services
            .cache
            .add(&principal.token, principal.remaining(now))
            .await?;

        if let Some(session_id) = principal.session_id {
            self.services
                .repo
                .revoke_session(&session_id, Some(&principal.user_id), now)
                .await?;
        }

        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::Logout, Outcome::Success, client, now)
                    .with_user(principal.user_id),
            )
            .await;

        tracing::info!(user_id = %principal.user_id, "User signed out");
        Ok(())
    }
}
