//! Request extractors
//!
//! [`ClientInfo`] resolves who is calling. [`AuthUser`] and [`AdminUser`]
//! turn the bearer token into a [`Principal`]; the admin extractor also
//! applies the per-administrator limit and the admin-action monitor.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRef, FromRequestParts};
use axum::http::{HeaderMap, header, request::Parts};
use chrono::Utc;
use platform::client::{ClientContext, TrustedProxies};
use platform::rate_limit;
use serde_json::json;

use crate::application::token::Principal;
use crate::application::{CheckSessionUseCase, EphemeralStore, IdentityServices};
use crate::domain::entity::security_log::{Outcome, SecurityEventType, SecurityLogEntry};
use crate::domain::repository::IdentityStore;
use crate::error::IdentityError;
use crate::presentation::middleware::{RouteLimit, limit_exceeded};

/// Caller IP and user agent
///
/// The IP is the socket peer unless that peer is a trusted proxy, in which
/// case it comes from `X-Forwarded-For`.
#[derive(Debug, Clone)]
pub struct ClientInfo(pub ClientContext);

impl ClientInfo {
    pub fn from_parts(parts: &Parts, trusted: &TrustedProxies) -> Self {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip());
        Self(ClientContext::from_headers(&parts.headers, peer, trusted))
    }
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
    TrustedProxies: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, &TrustedProxies::from_ref(state)))
    }
}

impl<R, C> FromRef<IdentityServices<R, C>> for TrustedProxies {
    fn from_ref(services: &IdentityServices<R, C>) -> Self {
        services.config.trusted_proxies.clone()
    }
}

impl<R, C> FromRef<RouteLimit<R, C>> for TrustedProxies {
    fn from_ref(route: &RouteLimit<R, C>) -> Self {
        route.services.config.trusted_proxies.clone()
    }
}

/// `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

async fn authenticate<R, C>(
    parts: &Parts,
    services: &IdentityServices<R, C>,
    client: &ClientContext,
) -> Result<Principal, IdentityError>
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let Some(token) = bearer_token(&parts.headers) else {
        services
            .audit(
                SecurityLogEntry::new(
                    SecurityEventType::AccessDenied,
                    Outcome::Failure,
                    client,
                    Utc::now(),
                )
                .with_details(json!({
                    "reason": "missing_token",
                    "path": parts.uri.path(),
                })),
            )
            .await;
        return Err(IdentityError::Unauthenticated);
    };

    CheckSessionUseCase::new(services.clone())
        .authenticate(token, client)
        .await
}

/// Any authenticated, active user
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

impl<R, C> FromRequestParts<IdentityServices<R, C>> for AuthUser
where
    R: IdentityStore,
    C: EphemeralStore,
{
    type Rejection = IdentityError;

    async fn from_request_parts(
        parts: &mut Parts,
        services: &IdentityServices<R, C>,
    ) -> Result<Self, Self::Rejection> {
        let ClientInfo(client) =
            ClientInfo::from_parts(parts, &services.config.trusted_proxies);
        authenticate(parts, services, &client).await.map(Self)
    }
}

/// An administrator holding a live admin session
#[derive(Debug, Clone)]
pub struct AdminUser(pub Principal);

impl<R, C> FromRequestParts<IdentityServices<R, C>> for AdminUser
where
    R: IdentityStore,
    C: EphemeralStore,
{
    type Rejection = IdentityError;

    async fn from_request_parts(
        parts: &mut Parts,
        services: &IdentityServices<R, C>,
    ) -> Result<Self, Self::Rejection> {
        let ClientInfo(client) =
            ClientInfo::from_parts(parts, &services.config.trusted_proxies);
        let principal = authenticate(parts, services, &client).await?;

        CheckSessionUseCase::new(services.clone())
            .authorize_admin(&principal, &client)
            .await?;

        // Keyed by actor so one administrator cannot starve the others
        let key = format!("admin:{}", principal.user_id);
        if let Err(e) =
            rate_limit::check(services.cache.as_ref(), &key, &services.config.rate_limits.admin)
                .await
        {
            return Err(limit_exceeded(services, &client, Some(principal.user_id), "admin", e).await);
        }

        services
            .monitor()
            .check_admin_actions(&principal.user_id, &client, Utc::now())
            .await;

        Ok(Self(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
