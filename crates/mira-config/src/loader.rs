// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! Loads, parses, and validates configuration files in YAML or TOML format
//! (chosen by extension), with environment variable overrides.
//!
//! # Loading Pipeline
//!
//! 1. Read the file
//! 2. Parse YAML/TOML into [`MiraConfig`]
//! 3. Apply `MIRA_*` environment overrides
//! 4. Validate
//!
//! # Environment Variable Overrides
//!
//! ```text
//! MIRA_SOURCE_ENDPOINT=opc.tcp://other:4840/
//! MIRA_TARGET_ENDPOINT=opc.tcp://mirror:4841/
//! MIRA_LOG_LEVEL=debug
//! MIRA_RESYNC_INTERVAL_SECS=60
//! ```

use std::env;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::MiraConfig;

// =============================================================================
// ConfigLoader
// =============================================================================

/// Loads [`MiraConfig`] from disk.
///
/// # Examples
///
/// ```no_run
/// use mira_config::loader::ConfigLoader;
///
/// let config = ConfigLoader::new().load("mira.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether environment overrides are applied.
    apply_env: bool,
}

impl ConfigLoader {
    /// Creates a loader with the default `MIRA` prefix.
    pub fn new() -> Self {
        Self {
            env_prefix: "MIRA".to_string(),
            apply_env: true,
        }
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Disables environment overrides (used by tests for determinism).
    pub fn without_env(mut self) -> Self {
        self.apply_env = false;
        self
    }

    /// Loads, overrides, and validates a configuration file.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<MiraConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|err| ConfigError::io(path, err))?;

        let mut config = self.parse(path, &content)?;
        if self.apply_env {
            self.apply_overrides(&mut config);
        }
        config.validate()?;

        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parses content based on the file extension.
    fn parse(&self, path: &Path, content: &str) -> ConfigResult<MiraConfig> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(content)
                .map_err(|err| ConfigError::parse("yaml", err.to_string())),
            "toml" => {
                toml::from_str(content).map_err(|err| ConfigError::parse("toml", err.to_string()))
            }
            other => Err(ConfigError::UnsupportedFormat {
                extension: other.to_string(),
            }),
        }
    }

    /// Applies `PREFIX_*` environment overrides to select fields.
    fn apply_overrides(&self, config: &mut MiraConfig) {
        if let Some(endpoint) = self.env_var("SOURCE_ENDPOINT") {
            debug!("source endpoint overridden from environment");
            config.source.endpoint = endpoint;
        }
        if let Some(endpoint) = self.env_var("TARGET_ENDPOINT") {
            debug!("target endpoint overridden from environment");
            config.target.endpoint = endpoint;
        }
        if let Some(level) = self.env_var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(root) = self.env_var("ROOT_NODE_ID") {
            config.mirror.root_node_id = root;
        }
        if let Some(interval) = self.env_var("RESYNC_INTERVAL_SECS") {
            if let Ok(value) = interval.parse() {
                config.mirror.full_resync_interval_secs = value;
            }
        }
    }

    fn env_var(&self, suffix: &str) -> Option<String> {
        env::var(format!("{}_{}", self.env_prefix, suffix)).ok()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    const YAML: &str = r#"
source:
  endpoint: opc.tcp://src:4840/
target:
  endpoint: opc.tcp://dst:4841/
mirror:
  full_resync_interval_secs: 120
  max_retries: 3
"#;

    const TOML: &str = r#"
[source]
endpoint = "opc.tcp://src:4840/"

[target]
endpoint = "opc.tcp://dst:4841/"

[mirror]
full_resync_interval_secs = 120
"#;

    #[test]
    fn loads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "mira.yaml", YAML);

        let config = ConfigLoader::new().without_env().load(&path).unwrap();
        assert_eq!(config.source.endpoint, "opc.tcp://src:4840/");
        assert_eq!(config.mirror.full_resync_interval_secs, 120);
        assert_eq!(config.mirror.max_retries, 3);
        // Unset fields take defaults.
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "mira.toml", TOML);

        let config = ConfigLoader::new().without_env().load(&path).unwrap();
        assert_eq!(config.target.endpoint, "opc.tcp://dst:4841/");
        assert_eq!(config.mirror.full_resync_interval_secs, 120);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "mira.ini", "whatever");

        let err = ConfigLoader::new().without_env().load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "mira.yaml",
            &format!("{}\nsurprise: true\n", YAML.trim_end()),
        );

        let err = ConfigLoader::new().without_env().load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "mira.yaml",
            r#"
source:
  endpoint: opc.tcp://same:4840/
target:
  endpoint: opc.tcp://same:4840/
"#,
        );

        let err = ConfigLoader::new().without_env().load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ConfigLoader::new()
            .without_env()
            .load("/nonexistent/mira.yaml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn env_override_applies_with_custom_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "mira.yaml", YAML);

        env::set_var("MIRATEST_LOG_LEVEL", "debug");
        let config = ConfigLoader::new()
            .with_env_prefix("MIRATEST")
            .load(&path)
            .unwrap();
        env::remove_var("MIRATEST_LOG_LEVEL");

        assert_eq!(config.logging.level, "debug");
    }
}
