//! Value Object Module

pub mod email;
pub mod one_time_token;
pub mod totp_secret;
pub mod user_id;
pub mod user_password;
pub mod user_role;
pub mod user_status;
