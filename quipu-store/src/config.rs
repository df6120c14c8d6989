//! Tunables for the storage stack.
//!
//! Durations are carried as milliseconds so the structs deserialize from
//! plain JSON; the accessor methods hand out [`Duration`]s.

use serde::Deserialize;
use std::time::Duration;

/// Chunk packing and write coalescing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Logical records packed into one remote record (default: 8)
    pub slots_per_chunk: usize,
    /// Trailing-edge debounce for value and description writes (default: 1000ms)
    pub debounce_ms: u64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            slots_per_chunk: 8,
            debounce_ms: 1000,
        }
    }
}

impl ChunkConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Exponential backoff for [`crate::RetryingStore`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first call (default: 10)
    pub max_attempts: u32,
    /// Unit of the `base * 2^attempt` backoff (default: 1s)
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Delay slept after the `attempt`-th failure (attempts count from 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Quota protection for [`crate::RateLimiter`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Calls allowed in flight at once (default: 4)
    pub max_concurrent: usize,
    /// Minimum spacing between call starts (default: 100ms)
    pub min_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            min_interval_ms: 100,
        }
    }
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

/// Full storage stack configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub chunk: ChunkConfig,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
}

impl StoreConfig {
    /// Create config for testing (short delays, few attempts).
    pub fn for_testing() -> Self {
        Self {
            chunk: ChunkConfig {
                slots_per_chunk: 8,
                debounce_ms: 1000,
            },
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 10,
            },
            rate_limit: RateLimitConfig {
                max_concurrent: 64,
                min_interval_ms: 0,
            },
        }
    }
}
