//! User Administration Use Case
//!
//! Approval, rejection, block/unblock, role changes and deletion. An
//! administrator can never block, delete, reject or re-role their own
//! account; that check runs before anything is read or written.

use chrono::{DateTime, Utc};
use platform::client::ClientContext;
use serde_json::json;

use crate::application::notification::Notification;
use crate::application::token::Principal;
use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::security_log::{Outcome, Page, SecurityEventType, SecurityLogEntry};
use crate::domain::entity::user::User;
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::{user_id::UserId, user_role::UserRole, user_status::UserStatus};
use crate::error::{IdentityError, IdentityResult};

pub struct UserAdminUseCase<R, C> {
    services: IdentityServices<R, C>,
}

impl<R, C> UserAdminUseCase<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(services: IdentityServices<R, C>) -> Self {
        Self { services }
    }

    pub async fn list(
        &self,
        status: Option<UserStatus>,
        page: Page,
    ) -> IdentityResult<(Vec<User>, u64)> {
        self.services.repo.list_users(status, page).await
    }

    pub async fn approve(
        &self,
        actor: &Principal,
        target: &UserId,
        client: &ClientContext,
    ) -> IdentityResult<User> {
        let now = Utc::now();
        let mut user = self.load(target).await?;
        user.approve(now)?;
        self.services.repo.update_user(&user).await?;

        self.audit_action(actor, SecurityEventType::UserApproved, target, json!({}), client, now)
            .await;
        self.services.notifier.send(Notification::AccountApproved {
            to: user.email.as_str().to_string(),
        });

        tracing::info!(user_id = %target, actor = %actor.user_id, "User approved");
        Ok(user)
    }

    /// Hard delete after attempting the rejection notice
    pub async fn reject(
        &self,
        actor: &Principal,
        target: &UserId,
        reason: Option<String>,
        client: &ClientContext,
    ) -> IdentityResult<()> {
        self.ensure_not_self(actor, target, client).await?;
        let now = Utc::now();
        let user = self.load(target).await?;

        self.services.notifier.send(Notification::AccountRejected {
            to: user.email.as_str().to_string(),
            reason: reason.clone(),
        });
        self.services.repo.delete_user(target).await?;

        self.audit_action(
            actor,
            SecurityEventType::UserRejected,
            target,
            json!({ "reason": reason }),
            client,
            now,
        )
        .await;

        tracing::info!(user_id = %target, actor = %actor.user_id, "User rejected");
        Ok(())
    }

    /// Blocking also ends every admin session of the target
    pub async fn block(
        &self,
        actor: &Principal,
        target: &UserId,
        reason: Option<String>,
        client: &ClientContext,
    ) -> IdentityResult<User> {
        self.ensure_not_self(actor, target, client).await?;
        let now = Utc::now();
        let mut user = self.load(target).await?;
        user.block(now)?;
        self.services.repo.update_user(&user).await?;
        let revoked = self
            .services
            .repo
            .revoke_all_sessions(target, Some(&actor.user_id), now)
            .await?;

        self.audit_action(
            actor,
            SecurityEventType::UserBlocked,
            target,
            json!({ "reason": reason, "revokedSessions": revoked }),
            client,
            now,
        )
        .await;
        self.services.notifier.send(Notification::AccountBlocked {
            to: user.email.as_str().to_string(),
            reason,
        });

        tracing::info!(user_id = %target, actor = %actor.user_id, "User blocked");
        Ok(user)
    }

    pub async fn unblock(
        &self,
        actor: &Principal,
        target: &UserId,
        client: &ClientContext,
    ) -> IdentityResult<User> {
        let now = Utc::now();
        let mut user = self.load(target).await?;
        user.unblock(now)?;
        self.services.repo.update_user(&user).await?;

        self.audit_action(actor, SecurityEventType::UserUnblocked, target, json!({}), client, now)
            .await;
        self.services.notifier.send(Notification::AccountUnblocked {
            to: user.email.as_str().to_string(),
        });

        tracing::info!(user_id = %target, actor = %actor.user_id, "User unblocked");
        Ok(user)
    }

    /// Demoting an administrator ends their sessions
    pub async fn change_role(
        &self,
        actor: &Principal,
        target: &UserId,
        role: &str,
        reason: Option<String>,
        client: &ClientContext,
    ) -> IdentityResult<User> {
        self.ensure_not_self(actor, target, client).await?;
        let role = UserRole::from_code(role.trim())
            .ok_or_else(|| IdentityError::InvalidRole(role.to_string()))?;

        let now = Utc::now();
        let mut user = self.load(target).await?;
        let previous = user.change_role(role, now);
        self.services.repo.update_user(&user).await?;

        if previous.is_admin() && !role.is_admin() {
            self.services
                .repo
                .revoke_all_sessions(target, Some(&actor.user_id), now)
                .await?;
        }

        self.audit_action(
            actor,
            SecurityEventType::RoleChange,
            target,
            json!({
                "oldRole": previous.code(),
                "newRole": role.code(),
                "reason": reason,
            }),
            client,
            now,
        )
        .await;
        self.services.notifier.send(Notification::RoleChanged {
            to: user.email.as_str().to_string(),
            old_role: previous.code().to_string(),
            new_role: role.code().to_string(),
            reason,
        });

        tracing::info!(
            user_id = %target,
            actor = %actor.user_id,
            old_role = %previous,
            new_role = %role,
            "User role changed"
        );
        Ok(user)
    }

    /// Hard delete; sessions go with the row, audit history stays
    pub async fn delete(
        &self,
        actor: &Principal,
        target: &UserId,
        client: &ClientContext,
    ) -> IdentityResult<()> {
        self.ensure_not_self(actor, target, client).await?;
        let now = Utc::now();
        if !self.services.repo.delete_user(target).await? {
            return Err(IdentityError::UserNotFound);
        }

        self.audit_action(actor, SecurityEventType::UserDeleted, target, json!({}), client, now)
            .await;
        tracing::info!(user_id = %target, actor = %actor.user_id, "User deleted");
        Ok(())
    }

    pub async fn revoke_user_sessions(
        &self,
        actor: &Principal,
        target: &UserId,
        client: &ClientContext,
    ) -> IdentityResult<u64> {
        let now = Utc::now();
        self.load(target).await?;
        let revoked = self
            .services
            .repo
            .revoke_all_sessions(target, Some(&actor.user_id), now)
            .await?;

        self.audit_action(
            actor,
            SecurityEventType::SessionRevoked,
            target,
            json!({ "revokedSessions": revoked }),
            client,
            now,
        )
        .await;
        Ok(revoked)
    }

    async fn load(&self, target: &UserId) -> IdentityResult<User> {
        self.services
            .repo
            .find_user(target)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }

    async fn ensure_not_self(
        &self,
        actor: &Principal,
        target: &UserId,
        client: &ClientContext,
    ) -> IdentityResult<()> {
        if actor.user_id != *target {
            return Ok(());
        }
        self.services
            .audit(
                SecurityLogEntry::new(SecurityEventType::AccessDenied, Outcome::Failure, client, Utc::now())
                    .with_user(actor.user_id)
                    .with_details(json!({ "reason": "self_target" })),
            )
            .await;
        Err(IdentityError::SelfTargetForbidden)
    }

    /// Admin actions are attributed to the actor; the target goes in details
    async fn audit_action(
        &self,
        actor: &Principal,
        event: SecurityEventType,
        target: &UserId,
        mut details: serde_json::Value,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) {
        details["targetUserId"] = json!(target);
        self.services
            .audit(
                SecurityLogEntry::new(event, Outcome::Success, client, now)
                    .with_user(actor.user_id)
                    .with_details(details),
            )
            .await;
    }
}
