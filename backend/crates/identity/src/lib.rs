//! Identity and Access Control Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Entities, value objects, validation, repository traits
//! - `application/` - Use cases, token authority, monitor, sweeper, notifications
//! - `infra/` - PostgreSQL and in-memory repositories, notification transports
//! - `presentation/` - HTTP handlers, DTOs, extractors, router
//!
//! ## Features
//! - Registration with email verification and administrator approval
//! - Email + password login with lockout (5 failures / 30 minutes)
//! - TOTP second factor with an intermediate token exchange
//! - Stateless bearer tokens; administrator tokens are bound to revocable
//!   server-side sessions
//! - Security audit log, route rate limits, suspicious-activity detection
//!
//! ## Security Model
//! - Passwords hashed with Argon2id
//! - Credential failures answer generically; the cause goes to the audit log
//! - One-time tokens are stored as SHA-256 digests only
//! - Administrators cannot block, delete, or change the role of themselves

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use application::config::IdentityConfig;
pub use application::{IdentityServices, NotificationSender, NotificationWorker, SessionSweeper};
pub use error::{IdentityError, IdentityResult};
pub use infra::memory::{MemoryEphemeralStore, MemoryIdentityRepository};
pub use infra::postgres::PgIdentityRepository;
pub use presentation::router::{identity_router, identity_router_generic};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult},
    kind::ErrorKind,
};

// Convenience re-exports
pub mod config {
    pub use crate::application::config::*;
}

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
    pub use crate::presentation::dto::*;
}
