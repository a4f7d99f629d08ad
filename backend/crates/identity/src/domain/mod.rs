//! Domain Layer
//!
//! Contains entities, value objects, validation rules and repository traits.

pub mod entity;
pub mod repository;
pub mod validation;
pub mod value_object;

// Re-exports
pub use entity::{
    admin_session::AdminSession, pending_user::PendingUser, security_log::SecurityLogEntry,
    user::User,
};
pub use repository::{
    AdminSessionRepository, IdentityStore, PendingUserRepository, SecurityLogRepository,
    UserRepository,
};
