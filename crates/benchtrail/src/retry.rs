//! Backoff policy for persist conflicts

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total persist attempts, including the first
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff factor (e.g., 2.0 for exponential)
    pub backoff_factor: f64,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 200,
            backoff_factor: 2.0,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            backoff_factor: 1.0,
            max_delay_ms: 0,
        }
    }

    /// Whether another attempt may follow the failed `attempt` (1-based)
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_factor.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped_ms as u64)
    }

    /// Sleep for retry delay (async)
    pub async fn sleep(&self, attempt: u32) {
        let delay = self.calculate_delay(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
