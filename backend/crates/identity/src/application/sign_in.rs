//! Sign In Use Case
//!
//! Password login and second-factor completion. The login checks run in a
//! fixed order and each one short-circuits:
//!
//! 1. unknown email -> generic invalid credentials
//! 2. email not verified -> not activated
//! 3. status not active -> pending approval / blocked
//! 4. locked -> locked (the password is not compared)
//! 5. wrong password -> count the failure, maybe lock, generic invalid credentials
//! 6. correct password -> reset counters
//! 7. second factor enabled -> intermediate token only
//! 8. final token, plus an admin session for administrators

use chrono::{DateTime, Utc};
use platform::client::ClientContext;
use serde_json::json;

use crate::application::token::IssuedToken;
use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::admin_session::{AdminSession, SessionId};
use crate::domain::entity::security_log::{Outcome, SecurityEventType, SecurityLogEntry};
use crate::domain::entity::user::User;
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::{
    email::Email, totp_secret::TotpLabel, user_id::UserId, user_password::RawPassword,
    user_status::UserStatus,
};
use crate::error::{IdentityError, IdentityResult};

/// Sign in input
pub struct SignInInput {
    pub email: String,
    pub password: String,
    /// Longer admin session
    pub remember_me: bool,
}

/// Sign in output
#[derive(Debug)]
pub enum SignInOutput {
    Authenticated {
        token: IssuedToken,
        user: User,
        session_id: Option<SessionId>,
    },
    /// Password accepted; the intermediate token must be exchanged at `/2fa/verify`
    TwoFactorRequired { temp_token: IssuedToken },
}

/// Sign in use case
pub struct SignInUseCase<R, C> {
    services: IdentityServices<R, C>,
}

impl<R, C> SignInUseCase<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(services: IdentityServices<R, C>) -> Self {
        Self { services }
    }

    pub async fn login(
        &self,
        input: SignInInput,
        client: &ClientContext,
    ) -> IdentityResult<SignInOutput> {
        let now = Utc::now();
        let password = RawPassword::presented(input.password);

        let user = match Email::new(&input.email) {
            Ok(email) => self.services.repo.find_user_by_email(&email).await?,
            Err(_) => None,
        };
        let Some(mut user) = user else {
            return Err(self
                .reject(None, "unknown_email", IdentityError::InvalidCredentials, client, now)
                .await);
        };

        if !user.email_verified {
            return Err(self
                .reject(
                    Some(user.user_id),
                    "email_not_verified",
                    IdentityError::AccountNotActivated,
                    client,
                    now,
                )
                .await);
        }

        if !user.status.can_login() {
            let (reason, error) = match user.status {
                UserStatus::PendingEmailVerification | UserStatus::PendingAdminApproval => {
                    ("pending_approval", IdentityError::AccountPendingApproval)
                }
                UserStatus::Active | UserStatus::Inactive => {
                    ("account_inactive", IdentityError::AccountBlocked)
                }
            };
            return Err(self.reject(Some(user.user_id), reason, error, client, now).await);
        }

        if let Some(until) = user.locked_until.filter(|until| *until > now) {
            return Err(self
                .reject(
                    Some(user.user_id),
                    "account_locked",
                    IdentityError::AccountLocked { until },
                    client,
                    now,
                )
                .await);
        }

        if !user.verify_password(&password) {
            self.record_password_failure(&user, client, now).await?;
            return Err(self
                .reject(
                    Some(user.user_id),
                    "invalid_password",
                    IdentityError::InvalidCredentials,
                    client,
                    now,
                )
                .await);
        }

        self.services
            .repo
            .record_login_success(&user.user_id, now)
            .await?;
        user.record_login_success(now);
        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::LoginSuccess, Outcome::Success, client, now)
                    .with_user(user.user_id),
            )
            .await;

        if user.two_factor_enabled() {
            let temp_token = self.services.tokens.issue_two_factor(
                &user,
                self.services.config.two_factor_token_ttl,
                input.remember_me,
                now,
            )?;
            self.services
                .audit(
                    SecurityLogEntry::new(
                        SecurityEventType::TwoFactorChallenge,
                        Outcome::Success,
                        client,
                        now,
                    )
                    .with_user(user.user_id),
                )
                .await;
            tracing::info!(user_id = %user.user_id, "Second factor required");
            return Ok(SignInOutput::TwoFactorRequired { temp_token });
        }

        self.complete(user, input.remember_me, client, now).await
    }

    /// Exchange an intermediate token and a TOTP code for a final token.
    /// Every failure is the same generic error; the cause is only audited.
    pub async fn verify_two_factor(
        &self,
        temp_token: &str,
        code: &str,
        client: &ClientContext,
    ) -> IdentityResult<SignInOutput> {
        let now = Utc::now();

        let Ok(claims) = self.services.tokens.decode(temp_token) else {
            return Err(self.two_factor_failure(None, "invalid_token", client, now).await);
        };
        if !claims.temp {
            return Err(self
                .two_factor_failure(Some(claims.id), "not_pending", client, now)
                .await);
        }
        if self.services.cache.contains(temp_token).await? {
            return Err(self
                .two_factor_failure(Some(claims.id), "token_reused", client, now)
                .await);
        }

        let user = match self.services.repo.find_user(&claims.id).await? {
            Some(user) if user.status.can_login() && !user.is_locked(now) => user,
            _ => {
                return Err(self
                    .two_factor_failure(Some(claims.id), "account_unavailable", client, now)
                    .await);
            }
        };
        let Some(secret) = user.totp_secret.as_ref() else {
            return Err(self
                .two_factor_failure(Some(user.user_id), "not_enabled", client, now)
                .await);
        };

        let label = TotpLabel {
            issuer: &self.services.config.totp_issuer,
            account: user.email.as_str(),
        };
        if !secret.verify(code, label)? {
            return Err(self
                .two_factor_failure(Some(user.user_id), "invalid_code", client, now)
                .await);
        }

        // Single use: of two racing exchanges only one claims the token
        if !self
            .services
            .cache
            .claim(temp_token, claims.remaining(now))
            .await?
        {
            return Err(self
                .two_factor_failure(Some(user.user_id), "token_reused", client, now)
                .await);
        }

        self.complete(user, claims.remember_me, client, now).await
    }

    /// Step 8: final token; administrators also get a server-side session
    async fn complete(
        &self,
        user: User,
        remember_me: bool,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) -> IdentityResult<SignInOutput> {
        let config = &self.services.config;

        if !user.role.is_admin() {
            let token = self
                .services
                .tokens
                .issue(&user, None, config.user_token_ttl, false, now)?;
            tracing::info!(user_id = %user.user_id, "User signed in");
            return Ok(SignInOutput::Authenticated {
                token,
                user,
                session_id: None,
            });
        }

        let ttl = if remember_me {
            config.remember_me_ttl
        } else {
            config.admin_session_ttl
        };
        let session = AdminSession::new(user.user_id, client, ttl, now);
        self.services.repo.create_session(&session).await?;
        let token = self
            .services
            .tokens
            .issue(&user, Some(session.session_id), ttl, remember_me, now)?;

        let monitor = self.services.monitor();
        monitor.check_login_failures(client, now).await;
        monitor.check_admin_actions(&user.user_id, client, now).await;

        tracing::info!(
            user_id = %user.user_id,
            session_id = %session.session_id,
            remember_me,
            "Administrator signed in"
        );
        Ok(SignInOutput::Authenticated {
            token,
            user,
            session_id: Some(session.session_id),
        })
    }

    /// Atomic increment-then-maybe-lock; a lock gets its own audit entry
    async fn record_password_failure(
        &self,
        user: &User,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) -> IdentityResult<()> {
        let failure = self
            .services
            .repo
            .record_login_failure(&user.user_id, &self.services.config.lockout, now)
            .await?;

        if let Some(failure) = failure.filter(|f| f.locked(now)) {
            self.services
                .audit(
                    SecurityLogEntry::new(
                        SecurityEventType::AccountLocked,
                        Outcome::Failure,
                        client,
                        now,
                    )
                    .with_user(user.user_id)
                    .with_details(json!({
                        "failedAttempts": failure.failed_login_count,
                        "lockedUntil": failure.locked_until,
                    })),
                )
                .await;
            tracing::warn!(user_id = %user.user_id, "Account locked after repeated failures");
        }
        Ok(())
    }

    /// Audit a refused login, run the per-IP monitor, hand back the error
    async fn reject(
        &self,
        user_id: Option<UserId>,
        reason: &'static str,
        error: IdentityError,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) -> IdentityError {
        let mut entry =
            SecurityLogEntry::new(SecurityEventType::LoginFailure, Outcome::Failure, client, now)
                .with_details(json!({ "reason": reason }));
        if let Some(user_id) = user_id {
            entry = entry.with_user(user_id);
        }
        self.services.audit(entry).await;
        self.services.monitor().check_login_failures(client, now).await;
        error
    }

    async fn two_factor_failure(
        &self,
        user_id: Option<UserId>,
        reason: &'static str,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) -> IdentityError {
        let mut entry = SecurityLogEntry::new(
            SecurityEventType::TwoFactorFailure,
            Outcome::Failure,
            client,
            now,
        )
        .with_details(json!({ "reason": reason }));
        if let Some(user_id) = user_id {
            entry = entry.with_user(user_id);
        }
        self.services.audit(entry).await;
        IdentityError::InvalidTwoFactorCode
    }
}
