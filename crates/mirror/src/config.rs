use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime configuration for a mirrored replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Attempts per table snapshot before `mirror` gives up.
    pub snapshot_attempts: u32,
    /// Attempts to connect the channel before staying `Disconnected`.
    pub connect_attempts: u32,
    /// Delay before the first retry; doubled on every further retry.
    pub retry_backoff_ms: u64,
    /// Upper bound for the retry delay.
    pub max_backoff_ms: u64,
    /// Identifies this replica to the remote store.
    pub client_id: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            snapshot_attempts: 3,
            connect_attempts: 3,
            retry_backoff_ms: 50,
            max_backoff_ms: 2_000,
            client_id: "local".to_string(),
        }
    }
}

impl MirrorConfig {
    pub fn with_snapshot_attempts(mut self, attempts: u32) -> Self {
        self.snapshot_attempts = attempts.max(1);
        self
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn with_max_backoff_ms(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Delay before retry number `retry` (1-based), exponential and capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(
            self.retry_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}
