//! Presentation Layer
//!
//! HTTP handlers, DTOs, extractors, router, and middleware.

pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use extractors::{AdminUser, AuthUser, ClientInfo};
pub use handlers::IdentityState;
pub use middleware::{RouteLimit, rate_limit};
pub use router::{identity_router, identity_router_generic};
