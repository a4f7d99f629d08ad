//! Register Use Case
//!
//! Self-service registration, the staged (pending user) registration path,
//! and the startup admin bootstrap.

use chrono::Utc;
use platform::client::ClientContext;
use serde_json::json;

use crate::application::notification::Notification;
use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::pending_user::PendingUser;
use crate::domain::entity::security_log::{Outcome, SecurityEventType, SecurityLogEntry};
use crate::domain::entity::user::{User, UserProfile};
use crate::domain::repository::IdentityStore;
use crate::domain::validation::{
    FieldError, RegistrationInput, ValidatedRegistration, validate_registration,
};
use crate::domain::value_object::{
    email::Email,
    user_password::{RawPassword, UserPassword},
    user_role::UserRole,
};
use crate::error::{IdentityError, IdentityResult};

pub struct RegisterUseCase<R, C> {
    services: IdentityServices<R, C>,
}

impl<R, C> RegisterUseCase<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(services: IdentityServices<R, C>) -> Self {
        Self { services }
    }

    /// Create a user awaiting email verification and send the verification link
    pub async fn register(
        &self,
        input: RegistrationInput,
        client: &ClientContext,
    ) -> IdentityResult<User> {
        let config = &self.services.config;
        let validated = validate_registration(input, UserRole::User)
            .map_err(IdentityError::Validation)?;
        self.ensure_unique(&validated).await?;

        let now = Utc::now();
        let mut user = User::register(
            validated.email,
            &validated.password,
            UserRole::User,
            validated.profile,
            &config.password_hashing,
            now,
        )?;
        let token = user.issue_email_verification(config.email_verification_ttl, now);
        self.services.repo.create_user(&user).await?;

        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::Registration, Outcome::Success, client, now)
                    .with_user(user.user_id),
            )
            .await;

        // Best effort; registration stands even if the mail never goes out
        self.services.notifier.send(Notification::VerifyEmail {
            to: user.email.as_str().to_string(),
            first_name: user.profile.first_name.clone(),
            link: self.services.link("/verify-email", &token),
        });

        tracing::info!(user_id = %user.user_id, "User registered");
        Ok(user)
    }

    /// Stage a registration for administrator review instead of email verification
    pub async fn stage(
        &self,
        input: RegistrationInput,
        client: &ClientContext,
    ) -> IdentityResult<PendingUser> {
        let validated = validate_registration(input, UserRole::User)
            .map_err(IdentityError::Validation)?;
        self.ensure_unique(&validated).await?;

        let now = Utc::now();
        let password_hash =
            UserPassword::from_raw(&validated.password, &self.services.config.password_hashing)?;
        let pending = PendingUser::new(
            validated.email,
            password_hash,
            UserRole::User,
            validated.profile,
            now,
        );
        self.services.repo.create_pending_user(&pending).await?;

        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::Registration, Outcome::Success, client, now)
                    .with_details(json!({
                        "staged": true,
                        "pendingId": pending.pending_id,
                    })),
            )
            .await;

        tracing::info!(pending_id = %pending.pending_id, "Registration staged");
        Ok(pending)
    }

    /// Create an active, verified administrator unless the email is taken.
    /// Returns `None` when nothing was created.
    pub async fn bootstrap_admin(
        &self,
        email: &str,
        password: String,
    ) -> IdentityResult<Option<User>> {
        let email = Email::new(email)
            .map_err(|e| IdentityError::Validation(vec![FieldError::new("email", e.message())]))?;
        if self.services.repo.email_exists(&email).await? {
            tracing::debug!("Bootstrap admin already exists");
            return Ok(None);
        }

        let password = RawPassword::new(password)?;
        let now = Utc::now();
        let profile = UserProfile {
            first_name: "Admin".to_string(),
            last_name: "Administrator".to_string(),
            ..UserProfile::default()
        };
        let mut user = User::register(
            email,
            &password,
            UserRole::Admin,
            profile,
            &self.services.config.password_hashing,
            now,
        )?;
        user.activate_verified(now);
        self.services.repo.create_user(&user).await?;

        self.services
            .audit(
                SecurityLogEntry::new(
                    SecurityEventType::Registration,
                    Outcome::Success,
                    &ClientContext::default(),
                    now,
                )
                .with_user(user.user_id)
                .with_details(json!({ "bootstrap": true })),
            )
            .await;

        tracing::info!(user_id = %user.user_id, "Bootstrap administrator created");
        Ok(Some(user))
    }

    /// Email and tax ID conflicts are reported separately
    async fn ensure_unique(&self, validated: &ValidatedRegistration) -> IdentityResult<()> {
        let repo = &self.services.repo;
        if repo.email_exists(&validated.email).await?
            || repo.pending_email_exists(&validated.email).await?
        {
            return Err(IdentityError::EmailTaken);
        }
        if let Some(tax_id) = validated.profile.tax_id.as_deref() {
            if repo.tax_id_exists(tax_id).await? {
                return Err(IdentityError::TaxIdTaken);
            }
        }
        Ok(())
    }
}
