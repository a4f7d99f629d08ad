//! Rate Limiting Infrastructure
//!
//! A narrow counter interface ([`RateLimitStore::increment`]) plus an
//! in-memory sliding-window implementation for single-instance deployments.
//! A multi-instance deployment swaps the store for a shared one.
//!
//! The in-memory log keeps at most `max_requests` timestamps per key, so a
//! flooding client costs a bounded amount of memory.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Rate limit configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// Hits recorded in the current window for one key, including this one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u32,
    /// Time until the oldest hit leaves the window
    pub retry_after: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    Exceeded { retry_after_secs: u64 },

    #[error("Rate limit store unavailable: {0}")]
    Backend(String),
}

/// Trait for rate limit storage backends
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Record one hit for `key` and return the count within the trailing window
    ///
    /// A count above `config.max_requests` means the hit was rejected.
    async fn increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<WindowCount, RateLimitError>;
}

/// Record a hit and reject it if the window already holds `max_requests`
///
/// Rejected hits still count, so a client that keeps hammering stays limited.
pub async fn check<S: RateLimitStore + Sync>(
    store: &S,
    key: &str,
    config: &RateLimitConfig,
) -> Result<(), RateLimitError> {
    let hits = store.increment(key, config).await?;
    if hits.count > config.max_requests {
        // Round up so clients never retry a moment too early
        let retry_after_secs = hits.retry_after.as_secs()
            + u64::from(hits.retry_after.subsec_nanos() > 0);
        return Err(RateLimitError::Exceeded {
            retry_after_secs: retry_after_secs.max(1),
        });
    }
    Ok(())
}

/// Keys are pruned once the table grows past this many entries
const PRUNE_THRESHOLD: usize = 10_000;

/// Sliding-window log held in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRateLimitStore {
    hits: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    async fn increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<WindowCount, RateLimitError> {
        let now = Instant::now();
        let window = config.window;
        let limit = usize::try_from(config.max_requests).unwrap_or(usize::MAX);
        let mut table = self.hits.lock().await;

        if table.len() > PRUNE_THRESHOLD {
            table.retain(|_, log| log.back().is_some_and(|last| now - *last < window));
        }

        let log = table.entry(key.to_string()).or_default();
        while log.front().is_some_and(|oldest| now - *oldest >= window) {
            log.pop_front();
        }

        let count = if log.len() < limit {
            log.push_back(now);
            log.len()
        } else {
            // Full: the rejected hit replaces the oldest one so the log
            // never grows past `limit` yet the window keeps sliding forward
            log.pop_front();
            if limit > 0 {
                log.push_back(now);
            }
            limit + 1
        };

        let oldest = log.front().copied().unwrap_or(now);
        Ok(WindowCount {
            count: u32::try_from(count).unwrap_or(u32::MAX),
            retry_after: window.saturating_sub(now - oldest),
        })
    }
}

impl MemoryRateLimitStore {
    /// Timestamps currently held for `key`
    pub async fn logged(&self, key: &str) -> usize {
        self.hits.lock().await.get(key).map_or(0, VecDeque::len)
    }
}
