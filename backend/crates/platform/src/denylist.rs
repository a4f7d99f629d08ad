//! Token Denylist
//!
//! Explicitly invalidated bearer tokens (logout, account deletion, consumed
//! intermediate tokens). Entries only need to live as long as the token
//! itself would have; after that, expiry rejects the token anyway.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::crypto::sha256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DenylistError {
    #[error("Token denylist unavailable: {0}")]
    Backend(String),
}

/// Trait for denylist storage backends
#[trait_variant::make(TokenDenylist: Send)]
pub trait LocalTokenDenylist {
    async fn contains(&self, token: &str) -> Result<bool, DenylistError>;

    /// Deny `token` for `ttl`
    async fn add(&self, token: &str, ttl: Duration) -> Result<(), DenylistError>;

    /// Deny `token` for `ttl` unless it is already denied
    ///
    /// Returns `false` when another caller got there first. Single-use
    /// tokens are consumed through this so two racing requests cannot
    /// both spend the same one.
    async fn claim(&self, token: &str, ttl: Duration) -> Result<bool, DenylistError>;
}

/// Denylist held in process memory, keyed by SHA-256 of the raw token
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenDenylist {
    entries: Arc<Mutex<HashMap<[u8; 32], Instant>>>,
}

impl MemoryTokenDenylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl TokenDenylist for MemoryTokenDenylist {
    async fn contains(&self, token: &str) -> Result<bool, DenylistError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(&sha256(token.as_bytes()))
            .is_some_and(|expires_at| *expires_at > Instant::now()))
    }

    async fn add(&self, token: &str, ttl: Duration) -> Result<(), DenylistError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, expires_at| *expires_at > now);
        entries.insert(sha256(token.as_bytes()), now + ttl);
        Ok(())
    }

    async fn claim(&self, token: &str, ttl: Duration) -> Result<bool, DenylistError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, expires_at| *expires_at > now);
        match entries.entry(sha256(token.as_bytes())) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(now + ttl);
                Ok(true)
            }
        }
    }
}
