//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations:
//! - Cryptographic utilities (SHA-256, random tokens, constant-time compare)
//! - Password hashing (Argon2id) and the password strength policy
//! - Client identification (IP, User-Agent)
//! - Rate limiting store abstraction with an in-memory sliding window
//! - Token denylist abstraction with an in-memory implementation

pub mod client;
pub mod crypto;
pub mod denylist;
pub mod password;
pub mod rate_limit;
