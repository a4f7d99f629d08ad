//! Account Use Case
//!
//! The caller's own profile and self-service deletion. Deletion anonymizes
//! the row instead of removing it, so audit references stay resolvable.

use chrono::Utc;
use platform::client::ClientContext;

use crate::application::token::Principal;
use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::security_log::{Outcome, SecurityEventType, SecurityLogEntry};
use crate::domain::entity::user::User;
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::user_password::RawPassword;
use crate::error::{IdentityError, IdentityResult};

pub struct AccountUseCase<R, C> {
    services: IdentityServices<R, C>,
}

impl<R, C> AccountUseCase<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(services: IdentityServices<R, C>) -> Self {
        Self { services }
    }

    pub async fn profile(&self, principal: &Principal) -> IdentityResult<User> {
        self.services
            .repo
            .find_user(&principal.user_id)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }

    /// Requires the current password
    pub async fn delete_self(
        &self,
        principal: &Principal,
        password: String,
        client: &ClientContext,
    ) -> IdentityResult<()> {
        let now = Utc::now();
        let mut user = self.profile(principal).await?;

        if !user.verify_password(&RawPassword::presented(password)) {
            self.services
                .audit(
                    SecurityLogEntry::new(SecurityEventType::AccountDeleted, Outcome::Failure, client, now)
                        .with_user(user.user_id),
                )
                .await;
            return Err(IdentityError::IncorrectPassword);
        }

        user.anonymize(&self.services.config.password_hashing, now)?;
        self.services.repo.update_user(&user).await?;
        self.services
            .repo
            .revoke_all_sessions(&user.user_id, Some(&user.user_id), now)
            .await?;
        self.services
            .cache
            .add(&principal.token, principal.remaining(now))
            .await?;

        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::AccountDeleted, Outcome::Success, client, now)
                    .with_user(user.user_id),
            )
            .await;

        tracing::info!(user_id = %user.user_id, "Account deleted by owner");
        Ok(())
    }
}
