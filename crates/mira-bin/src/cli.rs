// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! Subcommands:
//!
//! - `run`: start the mirror (default)
//! - `validate`: validate the configuration file and exit
//! - `version`: show version information

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// MIRA - Mirrored Industrial Resource Address-space
///
/// Synchronizes an OPC UA address-space tree from a source server onto a
/// target server: structural mirroring, periodic drift-correcting resync,
/// and live subscription-driven value forwarding.
#[derive(Parser, Debug)]
#[command(
    name = "mira",
    author = "Sylvex <contact@sylvex.io>",
    version = mira_core::VERSION,
    about = "OPC UA address-space mirror",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "mira.yaml",
        env = "MIRA_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "MIRA_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log format (text, json, compact)
    #[arg(long, env = "MIRA_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the mirror
    ///
    /// This is the default command when no subcommand is specified.
    Run(RunArgs),

    /// Validate the configuration file
    ///
    /// Parses and validates the configuration without opening any session.
    Validate,

    /// Show version information
    Version,
}

/// Arguments for the `run` command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Mirror an in-process simulated address space instead of connecting
    /// to real servers. Useful for demos and smoke tests.
    #[arg(long)]
    pub simulate: bool,

    /// Run a single full sync cycle and exit instead of staying live.
    #[arg(long)]
    pub once: bool,
}

/// Log output format.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for log aggregation.
    Json,
    /// Compact single-line output.
    Compact,
}

impl LogFormat {
    /// Parses the config-file representation.
    pub fn from_config(value: &str) -> Self {
        match value {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Text,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
