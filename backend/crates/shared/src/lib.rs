//! Shared Kernel - Domain-crossing minimal core
//!
//! The vocabulary every backend crate agrees on:
//! - Unified error type ([`error::app_error::AppError`]) and its HTTP classification
//! - Typed identifiers ([`id::Id`])
//!
//! **Design Principle**: Only include things that are "hard to change"
//! and have consistent meaning across all domains.

pub mod error {
    pub mod app_error;
    pub mod conversions;
    pub mod kind;
}
pub mod id;
