//! Pending Users Use Case
//!
//! Administrator review of staged registrations.

use chrono::Utc;
use platform::client::ClientContext;
use serde_json::json;

use crate::application::notification::Notification;
use crate::application::token::Principal;
use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::pending_user::{PendingUser, PendingUserId};
use crate::domain::entity::security_log::{Outcome, Page, SecurityEventType, SecurityLogEntry};
use crate::domain::entity::user::User;
use crate::domain::repository::IdentityStore;
use crate::error::{IdentityError, IdentityResult};

pub struct PendingUsersUseCase<R, C> {
    services: IdentityServices<R, C>,
}

impl<R, C> PendingUsersUseCase<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(services: IdentityServices<R, C>) -> Self {
        Self { services }
    }

    pub async fn list(&self, page: Page) -> IdentityResult<(Vec<PendingUser>, u64)> {
        self.services.repo.list_pending_users(page).await
    }

    /// Convert into an active, verified user and drop the staged row
    pub async fn accept(
        &self,
        actor: &Principal,
        pending_id: &PendingUserId,
        client: &ClientContext,
    ) -> IdentityResult<User> {
        let pending = self.load(pending_id).await?;
        if self.services.repo.email_exists(&pending.email).await? {
            return Err(IdentityError::EmailTaken);
        }

        let now = Utc::now();
        let user = pending.into_user(now);
        self.services.repo.create_user(&user).await?;
        self.services.repo.delete_pending_user(pending_id).await?;

        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::UserApproved, Outcome::Success, client, now)
                    .with_user(actor.user_id)
                    .with_details(json!({
                        "pendingId": pending_id,
                        "targetUserId": user.user_id,
                    })),
            )
            .await;
        self.services.notifier.send(Notification::StagedAccepted {
            to: user.email.as_str().to_string(),
        });

        tracing::info!(user_id = %user.user_id, actor = %actor.user_id, "Staged registration accepted");
        Ok(user)
    }

    /// The staged row stays, marked rejected
    pub async fn reject(
        &self,
        actor: &Principal,
        pending_id: &PendingUserId,
        client: &ClientContext,
    ) -> IdentityResult<()> {
        let mut pending = self.load(pending_id).await?;
        let now = Utc::now();
        pending.reject(now);
        self.services.repo.update_pending_user(&pending).await?;

        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::UserRejected, Outcome::Success, client, now)
                    .with_user(actor.user_id)
                    .with_details(json!({ "pendingId": pending_id })),
            )
            .await;
        self.services.notifier.send(Notification::StagedRejected {
            to: pending.email.as_str().to_string(),
        });

        tracing::info!(pending_id = %pending_id, actor = %actor.user_id, "Staged registration rejected");
        Ok(())
    }

    /// Only rows still awaiting review
    async fn load(&self, pending_id: &PendingUserId) -> IdentityResult<PendingUser> {
        self.services
            .repo
            .find_pending_user(pending_id)
            .await?
            .filter(PendingUser::is_pending)
            .ok_or(IdentityError::PendingUserNotFound)
    }
}
