// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration error types.
//!
//! Configuration errors are fatal at startup: they are rejected before any
//! session is opened and never retried.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file '{path}': {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file extension maps to no supported format.
    #[error("unsupported config format '{extension}' (expected yaml, yml, or toml)")]
    UnsupportedFormat {
        /// The unrecognized extension.
        extension: String,
    },

    /// The file content failed to parse.
    #[error("failed to parse {format} config: {message}")]
    Parse {
        /// Format being parsed.
        format: &'static str,
        /// Parser message.
        message: String,
    },

    /// A field failed validation.
    #[error("invalid configuration: {field}: {message}")]
    Validation {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(format: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            format,
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// Convenience result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
