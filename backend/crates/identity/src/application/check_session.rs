//! Check Session Use Case
//!
//! Turns a bearer token into a [`Principal`]. A token passes only if its
//! signature and expiry hold, it is not an intermediate 2FA token, it is not
//! denylisted, its user can still log in, and, when it names an admin
//! session, that session is active, unexpired and owned by the subject.

use chrono::{DateTime, Utc};
use platform::client::ClientContext;
use serde_json::json;

use crate::application::token::Principal;
use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::security_log::{Outcome, SecurityEventType, SecurityLogEntry};
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::user_id::UserId;
use crate::error::{IdentityError, IdentityResult};

/// Check session use case
pub struct CheckSessionUseCase<R, C> {
    services: IdentityServices<R, C>,
}

impl<R, C> CheckSessionUseCase<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(services: IdentityServices<R, C>) -> Self {
        Self { services }
    }

    pub async fn authenticate(
        &self,
        token: &str,
        client: &ClientContext,
    ) -> IdentityResult<Principal> {
        let now = Utc::now();

        let Ok(claims) = self.services.tokens.decode(token) else {
            return Err(self.deny(None, "invalid_token", client, now).await);
        };
        if claims.temp {
            return Err(self.deny(Some(claims.id), "intermediate_token", client, now).await);
        }
        if self.services.cache.contains(token).await? {
            return Err(self.deny(Some(claims.id), "revoked_token", client, now).await);
        }

        let user = match self.services.repo.find_user(&claims.id).await? {
            Some(user) if user.status.can_login() => user,
            _ => return Err(self.deny(Some(claims.id), "account_unavailable", client, now).await),
        };

        match claims.session_id {
            Some(session_id) => {
                let valid = self
                    .services
                    .repo
                    .find_session(&session_id)
                    .await?
                    .is_some_and(|session| session.is_valid_for(&user.user_id, now));
                if !valid {
                    return Err(self.deny(Some(user.user_id), "session_invalid", client, now).await);
                }
                self.services.repo.touch_session(&session_id, now).await?;
            }
            // Admin authority is only ever carried by a session-bound token
            None if user.role.is_admin() => {
                return Err(self.deny(Some(user.user_id), "session_missing", client, now).await);
            }
            None => {}
        }

        Ok(Principal {
            user_id: user.user_id,
            email: user.email.as_str().to_string(),
            role: user.role,
            session_id: claims.session_id,
            token: token.to_string(),
            expires_at: claims.expires_at(),
        })
    }

    /// Administrator role with a live session
    pub async fn authorize_admin(
        &self,
        principal: &Principal,
        client: &ClientContext,
    ) -> IdentityResult<()> {
        if principal.is_admin() && principal.session_id.is_some() {
            return Ok(());
        }
        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::AccessDenied, Outcome::Failure, client, Utc::now())
                    .with_user(principal.user_id)
                    .with_details(json!({ "reason": "not_admin" })),
            )
            .await;
        Err(IdentityError::Forbidden)
    }

    async fn deny(
        &self,
        user_id: Option<UserId>,
        reason: &'static str,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) -> IdentityError {
        let mut entry =
            SecurityLogEntry::new(SecurityEventType::AccessDenied, Outcome::Failure, client, now)
                .with_details(json!({ "reason": reason }));
        if let Some(user_id) = user_id {
            entry = entry.with_user(user_id);
        }
        self.services.audit(entry).await;
        tracing::debug!(reason, "Bearer token refused");
        IdentityError::Unauthenticated
    }
}
