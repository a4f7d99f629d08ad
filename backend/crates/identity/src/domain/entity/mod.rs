pub mod admin_session;
pub mod pending_user;
pub mod security_log;
pub mod user;
