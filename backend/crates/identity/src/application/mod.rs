//! Application Layer
//!
//! Use cases and application services.

pub mod account;
pub mod audit;
pub mod check_session;
pub mod config;
pub mod monitor;
pub mod notification;
pub mod password;
pub mod pending_users;
pub mod register;
pub mod security_logs;
pub mod session_admin;
pub mod sign_in;
pub mod sign_out;
pub mod sweeper;
pub mod token;
pub mod totp_setup;
pub mod user_admin;
pub mod verify_email;

use std::sync::Arc;

use platform::denylist::TokenDenylist;
use platform::rate_limit::RateLimitStore;

use crate::domain::entity::security_log::SecurityLogEntry;
use crate::domain::repository::IdentityStore;
use monitor::ActivityMonitor;

// Re-exports
pub use account::AccountUseCase;
pub use check_session::CheckSessionUseCase;
pub use config::IdentityConfig;
pub use notification::{Notification, NotificationSender, NotificationWorker};
pub use password::PasswordUseCase;
pub use pending_users::PendingUsersUseCase;
pub use register::RegisterUseCase;
pub use security_logs::SecurityLogsUseCase;
pub use session_admin::SessionAdminUseCase;
pub use sign_in::{SignInOutput, SignInUseCase};
pub use sign_out::SignOutUseCase;
pub use sweeper::SessionSweeper;
pub use token::{Principal, TokenAuthority};
pub use totp_setup::TotpSetupUseCase;
pub use user_admin::UserAdminUseCase;
pub use verify_email::VerifyEmailUseCase;

/// Process-wide ephemeral state: limiter counters and the token denylist
pub trait EphemeralStore: RateLimitStore + TokenDenylist + Send + Sync + 'static {}

impl<T> EphemeralStore for T where T: RateLimitStore + TokenDenylist + Send + Sync + 'static {}

/// Everything a use case needs, shared by all handlers as router state
pub struct IdentityServices<R, C> {
    pub repo: Arc<R>,
    pub cache: Arc<C>,
    pub config: Arc<IdentityConfig>,
    pub tokens: Arc<TokenAuthority>,
    pub notifier: NotificationSender,
}

// Manual impl: derive would require `R: Clone, C: Clone`
impl<R, C> Clone for IdentityServices<R, C> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            cache: Arc::clone(&self.cache),
            config: Arc::clone(&self.config),
            tokens: Arc::clone(&self.tokens),
            notifier: self.notifier.clone(),
        }
    }
}

impl<R, C> IdentityServices<R, C>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    pub fn new(repo: R, cache: C, config: IdentityConfig, notifier: NotificationSender) -> Self {
        let tokens = TokenAuthority::new(&config.jwt_secret);
        Self {
            repo: Arc::new(repo),
            cache: Arc::new(cache),
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            notifier,
        }
    }

    /// Append to the security log; failures are logged, never returned
    pub async fn audit(&self, entry: SecurityLogEntry) {
        audit::record(self.repo.as_ref(), entry).await;
    }

    pub fn monitor(&self) -> ActivityMonitor<'_, R> {
        ActivityMonitor::new(self.repo.as_ref(), self.config.monitor)
    }

    /// Absolute link into the storefront frontend
    pub fn link(&self, path: &str, token: &str) -> String {
        format!("{}{}?token={}", self.config.public_base_url, path, token)
    }
}
