// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Retry and backoff policy for transport recovery.
//!
//! Reconnection to the source or target uses exponential backoff with a
//! capped attempt count. Exhausting the cap never loops forever: the caller
//! receives [`SyncError::RetriesExhausted`] and surfaces a `Degraded`
//! status instead.
//!
//! # Example
//!
//! ```rust,ignore
//! use mira_core::retry::{ExponentialBackoff, RetryConfig};
//!
//! let backoff = ExponentialBackoff::new(RetryConfig {
//!     max_attempts: 5,
//!     base_delay: Duration::from_millis(250),
//!     ..Default::default()
//! });
//!
//! let root = backoff.execute("resolve-root", || source.root()).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SyncError, TransportError};

// =============================================================================
// RetryConfig
// =============================================================================

/// Configuration for the backoff policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (0 behaves as 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_base_delay", with = "duration_millis")]
    pub base_delay: Duration,

    /// Upper bound on any single delay.
    #[serde(default = "default_max_delay", with = "duration_millis")]
    pub max_delay: Duration,

    /// Multiplier applied per retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0) randomizing each delay downward.
    #[serde(default)]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Creates a configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the jitter factor, clamped to [0.0, 1.0].
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }
}

// Duration serialization helper (milliseconds on the wire).
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// =============================================================================
// ExponentialBackoff
// =============================================================================

/// Exponential backoff with a hard attempt cap.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    /// Creates a backoff from the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the configured attempt cap (at least 1).
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Returns the delay to wait before retry number `attempt` (1-based).
    ///
    /// The delay grows by the configured multiplier, is capped at
    /// `max_delay`, and is reduced by up to `jitter` at random so that many
    /// recovering subscriptions do not stampede the source at once.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let raw = self.config.base_delay.as_millis() as f64 * self.config.multiplier.powi(exp as i32);
        let capped = raw.min(self.config.max_delay.as_millis() as f64);

        let jittered = if self.config.jitter > 0.0 {
            let factor = 1.0 - self.config.jitter * rand::random::<f64>();
            capped * factor
        } else {
            capped
        };

        Duration::from_millis(jittered.max(0.0) as u64)
    }

    /// Drives a fallible transport operation to success or exhaustion.
    ///
    /// The operation is attempted up to `max_attempts` times with a jittered
    /// exponential delay between attempts. Exhaustion yields
    /// [`SyncError::RetriesExhausted`].
    pub async fn execute<T, F, Fut>(&self, context: &str, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let max = self.max_attempts();
        let mut last_error = TransportError::NotConnected;

        for attempt in 1..=max {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(context, attempt, "operation recovered after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    last_error = err;
                    if attempt < max {
                        let delay = self.delay_for(attempt);
                        warn!(
                            context,
                            attempt,
                            max_attempts = max,
                            delay_ms = delay.as_millis() as u64,
                            error = %last_error,
                            "transport operation failed, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(SyncError::retries_exhausted(max, last_error))
    }
}

// =============================================================================
// Tests
// =============================================================================
