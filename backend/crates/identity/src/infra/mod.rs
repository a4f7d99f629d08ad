//! Infrastructure Layer
//!
//! Database implementations and external service integrations.

pub mod memory;
pub mod notifier;
pub mod postgres;

pub use memory::{MemoryEphemeralStore, MemoryIdentityRepository};
pub use notifier::{LogTransport, WebhookTransport};
pub use postgres::PgIdentityRepository;
