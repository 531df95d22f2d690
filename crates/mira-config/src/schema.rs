// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema for MIRA.
//!
//! # Schema Structure
//!
//! ```text
//! MiraConfig
//! ├── mirror: MirrorSettings     (root node, resync cadence, retry policy)
//! ├── source: EndpointConfig     (where the original address space lives)
//! ├── target: EndpointConfig     (where the mirror is written)
//! └── logging: LoggingConfig
//! ```
//!
//! All fields have defaults so a minimal file only names the two endpoints.
//! Validation runs before any session is opened; an invalid configuration
//! is fatal at start.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use mira_core::retry::RetryConfig;
use mira_core::types::NodeId;

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Constants
// =============================================================================

/// Default full resync interval in seconds (0 disables periodic resync).
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default transport retry cap.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default backoff base in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// Maximum accepted backoff base (1 minute).
pub const MAX_BACKOFF_BASE_MS: u64 = 60_000;

/// Default walker channel bound.
pub const DEFAULT_WALK_CAPACITY: usize = 64;

/// Default subscription event queue bound.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

// =============================================================================
// MiraConfig
// =============================================================================

/// Root configuration for a MIRA instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiraConfig {
    /// Mirroring behavior.
    #[serde(default)]
    pub mirror: MirrorSettings,

    /// Source server connection.
    pub source: EndpointConfig,

    /// Target server connection.
    pub target: EndpointConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MiraConfig {
    /// Validates the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Validation`] encountered; validation
    /// is fatal at startup and nothing is retried.
    pub fn validate(&self) -> ConfigResult<()> {
        self.source.validate("source")?;
        self.target.validate("target")?;
        self.mirror.validate()?;
        self.logging.validate()?;

        if self.source.endpoint == self.target.endpoint {
            return Err(ConfigError::validation(
                "target.endpoint",
                "source and target endpoints must differ",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// MirrorSettings
// =============================================================================

/// Mirroring behavior: where the mirror is rooted and how it recovers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MirrorSettings {
    /// Source node the mirror is rooted at, in `ns=<n>;<kind>=<value>`
    /// notation. `i=0` (the null node) means "ask the source for its root".
    #[serde(default = "default_root_node_id")]
    pub root_node_id: String,

    /// Target node the mirrored root attaches under.
    #[serde(default = "default_target_root_id")]
    pub target_root_id: String,

    /// Seconds between drift-correcting full resyncs; 0 disables them.
    #[serde(default = "default_resync_interval")]
    pub full_resync_interval_secs: u64,

    /// Transport retry cap before the engine reports `Degraded`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff, in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Bound on the walker's snapshot channel.
    #[serde(default = "default_walk_capacity")]
    pub walk_channel_capacity: usize,

    /// Bound on the subscription event queue.
    #[serde(default = "default_event_capacity")]
    pub event_queue_capacity: usize,
}

fn default_root_node_id() -> String {
    "i=85".to_string()
}

fn default_target_root_id() -> String {
    "i=85".to_string()
}

fn default_resync_interval() -> u64 {
    DEFAULT_RESYNC_INTERVAL_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_backoff_base() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}

fn default_walk_capacity() -> usize {
    DEFAULT_WALK_CAPACITY
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            root_node_id: default_root_node_id(),
            target_root_id: default_target_root_id(),
            full_resync_interval_secs: default_resync_interval(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
            walk_channel_capacity: default_walk_capacity(),
            event_queue_capacity: default_event_capacity(),
        }
    }
}

impl MirrorSettings {
    fn validate(&self) -> ConfigResult<()> {
        self.parsed_root_node_id()?;
        self.parsed_target_root_id()?;

        if self.backoff_base_ms == 0 || self.backoff_base_ms > MAX_BACKOFF_BASE_MS {
            return Err(ConfigError::validation(
                "mirror.backoff_base_ms",
                format!("must be between 1 and {}", MAX_BACKOFF_BASE_MS),
            ));
        }
        if self.walk_channel_capacity == 0 {
            return Err(ConfigError::validation(
                "mirror.walk_channel_capacity",
                "must be at least 1",
            ));
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::validation(
                "mirror.event_queue_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Parses the configured mirror root.
    pub fn parsed_root_node_id(&self) -> ConfigResult<NodeId> {
        self.root_node_id
            .parse()
            .map_err(|err| ConfigError::validation("mirror.root_node_id", format!("{}", err)))
    }

    /// Parses the configured target attachment point.
    pub fn parsed_target_root_id(&self) -> ConfigResult<NodeId> {
        self.target_root_id
            .parse()
            .map_err(|err| ConfigError::validation("mirror.target_root_id", format!("{}", err)))
    }

    /// Returns the resync period, or `None` when disabled.
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.full_resync_interval_secs > 0)
            .then(|| Duration::from_secs(self.full_resync_interval_secs))
    }

    /// Returns the retry policy for transport recovery.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default()
            .with_max_attempts(self.max_retries.max(1))
            .with_base_delay(Duration::from_millis(self.backoff_base_ms))
    }
}

// =============================================================================
// EndpointConfig
// =============================================================================

/// Connection settings for one server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    /// Endpoint URL, e.g. `opc.tcp://localhost:4840/server/`.
    pub endpoint: String,

    /// Namespace index used for nodes created on this server.
    #[serde(default = "default_namespace")]
    pub namespace: u16,
}

fn default_namespace() -> u16 {
    2
}

impl EndpointConfig {
    fn validate(&self, field: &'static str) -> ConfigResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::validation(field, "endpoint must not be empty"));
        }
        if !self.endpoint.starts_with("opc.tcp://") {
            return Err(ConfigError::validation(
                field,
                format!("endpoint must start with opc.tcp:// (got '{}')", self.endpoint),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// LoggingConfig
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, or error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: text, json, or compact.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> ConfigResult<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        const FORMATS: [&str; 3] = ["text", "json", "compact"];

        if !LEVELS.contains(&self.level.as_str()) {
            return Err(ConfigError::validation(
                "logging.level",
                format!("unknown level '{}'", self.level),
            ));
        }
        if !FORMATS.contains(&self.format.as_str()) {
            return Err(ConfigError::validation(
                "logging.format",
                format!("unknown format '{}'", self.format),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
