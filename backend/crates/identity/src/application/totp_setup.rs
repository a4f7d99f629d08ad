//! TOTP Setup Use Case
//!
//! Enrollment keeps the new secret in a pending slot until a code generated
//! from it is confirmed; login only ever consults the active secret.

use chrono::Utc;
use platform::client::ClientContext;
use serde_json::json;

use crate::application::token::Principal;
use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::security_log::{Outcome, SecurityEventType, SecurityLogEntry};
use crate::domain::entity::user::User;
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::totp_secret::{TotpLabel, TotpProvisioning, TotpSecret};
use crate::error::{IdentityError, IdentityResult};

/// TOTP setup use case
pub struct TotpSetupUseCase<R, C> {
    services: IdentityServices<R, C>,
}

impl<R, C> TotpSetupUseCase<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(services: IdentityServices<R, C>) -> Self {
        Self { services }
    }

    /// Generate a secret into the pending slot and return provisioning data
    pub async fn setup(&self, principal: &Principal) -> IdentityResult<TotpProvisioning> {
        let mut user = self.load(principal).await?;
        if user.two_factor_enabled() {
            return Err(IdentityError::TwoFactorAlreadyEnabled);
        }

        let secret = TotpSecret::generate();
        let provisioning = secret.provisioning(self.label(&user))?;
        user.begin_two_factor_setup(secret, Utc::now());
        self.services.repo.update_user(&user).await?;

        tracing::info!(user_id = %user.user_id, "TOTP setup started");
        Ok(provisioning)
    }

    /// Promote the pending secret. A wrong code leaves it pending for a retry.
    pub async fn confirm(
        &self,
        principal: &Principal,
        code: &str,
        client: &ClientContext,
    ) -> IdentityResult<()> {
        let mut user = self.load(principal).await?;
        let pending = user
            .pending_totp_secret
            .as_ref()
            .ok_or(IdentityError::TwoFactorNotSetup)?;

        let now = Utc::now();
        if !pending.verify(code, self.label(&user))? {
            self.audit_failure(&user, "setup_confirmation", client).await;
            return Err(IdentityError::InvalidTwoFactorCode);
        }

        user.confirm_two_factor(now)?;
        self.services.repo.update_user(&user).await?;
        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::TwoFactorEnabled, Outcome::Success, client, now)
                    .with_user(user.user_id),
            )
            .await;

        tracing::info!(user_id = %user.user_id, "TOTP enabled");
        Ok(())
    }

    /// Requires a valid current code
    pub async fn disable(
        &self,
        principal: &Principal,
        code: &str,
        client: &ClientContext,
    ) -> IdentityResult<()> {
        let mut user = self.load(principal).await?;
        let secret = user
            .totp_secret
            .as_ref()
            .ok_or(IdentityError::TwoFactorNotSetup)?;

        let now = Utc::now();
        if !secret.verify(code, self.label(&user))? {
            self.audit_failure(&user, "disable", client).await;
            return Err(IdentityError::InvalidTwoFactorCode);
        }

        user.disable_two_factor(now);
        self.services.repo.update_user(&user).await?;
        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::TwoFactorDisabled, Outcome::Success, client, now)
                    .with_user(user.user_id),
            )
            .await;

        tracing::info!(user_id = %user.user_id, "TOTP disabled");
        Ok(())
    }

    async fn load(&self, principal: &Principal) -> IdentityResult<User> {
        self.services
            .repo
            .find_user(&principal.user_id)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }

    fn label<'a>(&'a self, user: &'a User) -> TotpLabel<'a> {
        TotpLabel {
            issuer: &self.services.config.totp_issuer,
            account: user.email.as_str(),
        }
    }

    async fn audit_failure(&self, user: &User, reason: &'static str, client: &ClientContext) {
        self.services
            .audit(
                SecurityLogEntry::new(
                    SecurityEventType::TwoFactorFailure,
                    Outcome::Failure,
                    client,
                    Utc::now(),
                )
                .with_user(user.user_id)
                .with_details(json!({ "reason": reason })),
            )
            .await;
    }
}
