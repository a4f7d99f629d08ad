//! Identity Router
//!
//! Routes nest under `/api/auth`. Each group carries its own IP limiter;
//! admin routes are additionally limited per administrator inside
//! [`AdminUser`](crate::presentation::extractors::AdminUser).

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use platform::rate_limit::RateLimitConfig;

use crate::application::{EphemeralStore, IdentityServices};
use crate::domain::repository::IdentityStore;
use crate::infra::{memory::MemoryEphemeralStore, postgres::PgIdentityRepository};
use crate::presentation::handlers;
use crate::presentation::middleware::{RouteLimit, rate_limit};

/// Create the identity router with the PostgreSQL repository
pub fn identity_router(services: IdentityServices<PgIdentityRepository, MemoryEphemeralStore>) -> Router {
    identity_router_generic(services)
}

/// Create the identity router for any repository and ephemeral store
pub fn identity_router_generic<R, C>(services: IdentityServices<R, C>) -> Router
where
    R: IdentityStore,
    C: EphemeralStore,
{
    let limits = services.config.rate_limits;
    let limited = |limit: RateLimitConfig, scope: &'static str| {
        from_fn_with_state(
            RouteLimit {
                services: services.clone(),
                limit,
                scope,
            },
            rate_limit::<R, C>,
        )
    };

    let registration = Router::new()
        .route("/register", post(handlers::register::<R, C>))
        .route("/register/staged", post(handlers::register_staged::<R, C>))
        .route_layer(limited(limits.register, "register"));

    // Buyers behind one NAT must not spend the registration allowance on links
    let verification = Router::new()
        .route("/verify-email", get(handlers::verify_email::<R, C>))
        .route("/resend-verification", post(handlers::resend_verification::<R, C>))
        .route_layer(limited(limits.api, "verification"));

    let login = Router::new()
        .route("/login", post(handlers::login::<R, C>))
        .route("/2fa/verify", post(handlers::verify_two_factor::<R, C>))
        .route_layer(limited(limits.login, "login"));

    let password_reset = Router::new()
        .route("/forgot-password", post(handlers::forgot_password::<R, C>))
        .route("/reset-password", post(handlers::reset_password::<R, C>))
        .route_layer(limited(limits.password_reset, "password_reset"));

    let account = Router::new()
        .route("/logout", post(handlers::logout::<R, C>))
        .route(
            "/profile",
            get(handlers::profile::<R, C>).delete(handlers::delete_profile::<R, C>),
        )
        .route("/password", put(handlers::change_password::<R, C>))
        .route("/2fa/setup", post(handlers::totp_setup::<R, C>))
        .route("/2fa/confirm", post(handlers::totp_confirm::<R, C>))
        .route("/2fa/disable", post(handlers::totp_disable::<R, C>))
        .route_layer(limited(limits.api, "api"));

    let admin = Router::new()
        .route("/users", get(handlers::list_users::<R, C>))
        .route("/users/{id}", delete(handlers::delete_user::<R, C>))
        .route("/users/{id}/role", put(handlers::change_role::<R, C>))
        .route("/users/{id}/approve", post(handlers::approve_user::<R, C>))
        .route("/users/{id}/reject", post(handlers::reject_user::<R, C>))
        .route("/users/{id}/block", post(handlers::block_user::<R, C>))
        .route("/users/{id}/unblock", post(handlers::unblock_user::<R, C>))
        .route(
            "/users/{id}/sessions/revoke",
            post(handlers::revoke_user_sessions::<R, C>),
        )
        .route("/sessions", get(handlers::list_sessions::<R, C>))
        .route("/sessions/{id}", delete(handlers::revoke_session::<R, C>))
        .route("/pending-users", get(handlers::list_pending_users::<R, C>))
        .route(
            "/pending-users/{id}/accept",
            post(handlers::accept_pending_user::<R, C>),
        )
        .route(
            "/pending-users/{id}/reject",
            post(handlers::reject_pending_user::<R, C>),
        )
        .route("/security-logs", get(handlers::list_security_logs::<R, C>));

    Router::new()
        .merge(registration)
        .merge(verification)
        .merge(login)
        .merge(password_reset)
        .merge(account)
        .merge(admin)
        .with_state(services)
}
