//! Password Use Case
//!
//! Forgotten-password tokens, token-based reset, and authenticated change.

use chrono::Utc;
use platform::client::ClientContext;
use serde_json::json;

use crate::application::notification::Notification;
use crate::application::token::Principal;
use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::security_log::{Outcome, SecurityEventType, SecurityLogEntry};
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::{
    email::Email, one_time_token::OneTimeToken, user_password::RawPassword,
};
use crate::error::{IdentityError, IdentityResult};

pub struct PasswordUseCase<R, C> {
    services: IdentityServices<R, C>,
}

impl<R, C> PasswordUseCase<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(services: IdentityServices<R, C>) -> Self {
        Self { services }
    }

    /// Issue a reset token. Unknown addresses succeed silently.
    pub async fn forgot(&self, email: &str, client: &ClientContext) -> IdentityResult<()> {
        let Ok(email) = Email::new(email) else {
            return Ok(());
        };
        let Some(mut user) = self.services.repo.find_user_by_email(&email).await? else {
            return Ok(());
        };
        if user.deleted_at.is_some() {
            return Ok(());
        }

        let now = Utc::now();
        let token = user.issue_password_reset(self.services.config.password_reset_ttl, now);
        self.services.repo.update_user(&user).await?;

        self.services.notifier.send(Notification::PasswordReset {
            to: user.email.as_str().to_string(),
            link: self.services.link("/reset-password", &token),
        });
        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::PasswordReset, Outcome::Success, client, now)
                    .with_user(user.user_id)
                    .with_details(json!({ "stage": "requested" })),
            )
            .await;

        tracing::info!(user_id = %user.user_id, "Password reset requested");
        Ok(())
    }

    /// Consume a reset token; clears lockout and ends every admin session
    pub async fn reset(
        &self,
        token: &str,
        new_password: String,
        client: &ClientContext,
    ) -> IdentityResult<()> {
        let password = RawPassword::new(new_password)?;
        if token.trim().is_empty() {
            return Err(IdentityError::InvalidResetToken);
        }

        let now = Utc::now();
        let mut user = self
            .services
            .repo
            .find_user_by_reset_token(&OneTimeToken::digest(token), now)
            .await?
            .ok_or(IdentityError::InvalidResetToken)?;

        user.reset_password(&password, &self.services.config.password_hashing, now)?;
        self.services.repo.update_user(&user).await?;
        self.services.repo.clear_lockout(&user.user_id, now).await?;
        let revoked = self
            .services
            .repo
            .revoke_all_sessions(&user.user_id, None, now)
            .await?;

        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::PasswordReset, Outcome::Success, client, now)
                    .with_user(user.user_id)
                    .with_details(json!({ "stage": "completed", "revokedSessions": revoked })),
            )
            .await;

        tracing::info!(user_id = %user.user_id, revoked, "Password reset");
        Ok(())
    }

    pub async fn change(
        &self,
        principal: &Principal,
        current_password: String,
        new_password: String,
        client: &ClientContext,
    ) -> IdentityResult<()> {
        let now = Utc::now();
        let mut user = self
            .services
            .repo
            .find_user(&principal.user_id)
            .await?
            .ok_or(IdentityError::UserNotFound)?;

        if !user.verify_password(&RawPassword::presented(current_password)) {
            self.services
                .audit(
                    SecurityLogEntry::new(
                        SecurityEventType::PasswordChanged,
                        Outcome::Failure,
                        client,
                        now,
                    )
                    .with_user(user.user_id),
                )
                .await;
            return Err(IdentityError::IncorrectPassword);
        }

        let password = RawPassword::new(new_password)?;
        user.set_password(&password, &self.services.config.password_hashing, now)?;
        self.services.repo.update_user(&user).await?;

        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::PasswordChanged, Outcome::Success, client, now)
                    .with_user(user.user_id),
            )
            .await;

        tracing::info!(user_id = %user.user_id, "Password changed");
        Ok(())
    }
}
