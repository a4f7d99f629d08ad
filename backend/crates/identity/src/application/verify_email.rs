//! Verify Email Use Case
//!
//! Consumes single-use verification tokens. A wrong token and an expired
//! token produce the same error.

use chrono::Utc;
use platform::client::ClientContext;

use crate::application::notification::Notification;
use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::security_log::{Outcome, SecurityEventType, SecurityLogEntry};
use crate::domain::entity::user::User;
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::{email::Email, one_time_token::OneTimeToken};
use crate::error::{IdentityError, IdentityResult};

pub struct VerifyEmailUseCase<R, C> {
    services: IdentityServices<R, C>,
}

impl<R, C> VerifyEmailUseCase<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(services: IdentityServices<R, C>) -> Self {
        Self { services }
    }

    pub async fn verify(&self, token: &str, client: &ClientContext) -> IdentityResult<User> {
        if token.trim().is_empty() {
            return Err(IdentityError::InvalidVerificationToken);
        }

        let now = Utc::now();
        let digest = OneTimeToken::digest(token);
        let mut user = self
            .services
            .repo
            .find_user_by_verification_token(&digest, now)
            .await?
            .ok_or(IdentityError::InvalidVerificationToken)?;

        user.verify_email(now);
        self.services.repo.update_user(&user).await?;

        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::EmailVerified, Outcome::Success, client, now)
                    .with_user(user.user_id),
            )
            .await;

        tracing::info!(user_id = %user.user_id, "Email verified");
        Ok(user)
    }

    /// Always succeeds for unknown or already verified addresses
    pub async fn resend(&self, email: &str) -> IdentityResult<()> {
        let Ok(email) = Email::new(email) else {
            return Ok(());
        };
        let Some(mut user) = self.services.repo.find_user_by_email(&email).await? else {
            return Ok(());
        };
        if user.email_verified || user.deleted_at.is_some() {
            return Ok(());
        }

        let now = Utc::now();
        let token = user.issue_email_verification(self.services.config.email_verification_ttl, now);
        self.services.repo.update_user(&user).await?;

        self.services.notifier.send(Notification::VerifyEmail {
            to: user.email.as_str().to_string(),
            first_name: user.profile.first_name.clone(),
            link: self.services.link("/verify-email", &token),
        });

        tracing::debug!(user_id = %user.user_id, "Verification token reissued");
        Ok(())
    }
}
