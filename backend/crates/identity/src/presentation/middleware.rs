//! Rate limit middleware
//!
//! Per-route-group limiter keyed by client IP. A rejected request is audited
//! as `rate_limited` and answered with 429 and `Retry-After`.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use platform::client::ClientContext;
use platform::rate_limit::{self, RateLimitConfig, RateLimitError};
use serde_json::json;

use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::entity::security_log::{Outcome, SecurityEventType, SecurityLogEntry};
use crate::domain::repository::IdentityStore;
use crate::domain::value_object::user_id::UserId;
use crate::error::IdentityError;
use crate::presentation::extractors::ClientInfo;

/// Middleware state: which limit applies and what to call it in the audit log
pub struct RouteLimit<R, C> {
    pub services: IdentityServices<R, C>,
    pub limit: RateLimitConfig,
    pub scope: &'static str,
}

// Manual impl: derive would require `R: Clone, C: Clone`
impl<R, C> Clone for RouteLimit<R, C> {
    fn clone(&self) -> Self {
        Self {
            services: self.services.clone(),
            limit: self.limit,
            scope: self.scope,
        }
    }
}

pub async fn rate_limit<R, C>(
    State(route): State<RouteLimit<R, C>>,
    ClientInfo(client): ClientInfo,
    req: Request,
    next: Next,
) -> Result<Response, IdentityError>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let key = format!("{}:{}", route.scope, client.ip_key());
    if let Err(e) = rate_limit::check(route.services.cache.as_ref(), &key, &route.limit).await {
        return Err(limit_exceeded(&route.services, &client, None, route.scope, e).await);
    }

    Ok(next.run(req).await)
}

/// Audit an exceeded limit; store failures pass through as 500s
pub async fn limit_exceeded<R, C>(
    services: &IdentityServices<R, C>,
    client: &ClientContext,
    user_id: Option<UserId>,
    scope: &'static str,
    error: RateLimitError,
) -> IdentityError
where
    R: IdentityStore,
    C: EphemeralStore,
{
    if let RateLimitError::Exceeded { retry_after_secs } = &error {
        let mut entry = SecurityLogEntry::new(
            SecurityEventType::RateLimited,
            Outcome::Failure,
            client,
            Utc::now(),
        )
        .with_details(json!({
            "scope": scope,
            "retryAfterSecs": retry_after_secs,
        }));
        if let Some(user_id) = user_id {
            entry = entry.with_user(user_id);
        }
        services.audit(entry).await;
        tracing::warn!(scope, ip = %client.ip_key(), "Rate limit exceeded");
    }
    IdentityError::from(error)
}
