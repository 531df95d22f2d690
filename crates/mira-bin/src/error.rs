// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI error type and exit codes.

use thiserror::Error;

use mira_config::ConfigError;
use mira_core::SyncError;

/// Top-level CLI error.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration loading or validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The sync engine failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The binary was asked to connect to real servers but carries no wire
    /// transport.
    #[error("this build has no wire transport; run with --simulate or link a transport backend")]
    NoTransport,
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Configuration problems are caller mistakes.
            Self::Config(_) => 2,
            Self::Sync(_) | Self::NoTransport => 1,
        }
    }
}
