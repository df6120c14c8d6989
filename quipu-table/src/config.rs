//! Table model tunables.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Newest entries loaded eagerly on first sight (default: 30)
    pub visible_window: usize,
    /// Period of the background reconciliation loop (default: 15s)
    pub sync_interval_ms: u64,
    /// Minimum spacing of accepted throttled creations (default: 1s)
    pub add_throttle_ms: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            visible_window: 30,
            sync_interval_ms: 15_000,
            add_throttle_ms: 1000,
        }
    }
}

impl TableConfig {
    /// Create config for testing (small window so hidden entries show up).
    pub fn for_testing() -> Self {
        Self {
            visible_window: 3,
            ..Self::default()
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn add_throttle(&self) -> Duration {
        Duration::from_millis(self.add_throttle_ms)
    }
}
