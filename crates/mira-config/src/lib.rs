// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema, loading, and validation for MIRA.
//!
//! A minimal configuration only names the two endpoints:
//!
//! ```yaml
//! source:
//!   endpoint: opc.tcp://plant-server:4840/
//! target:
//!   endpoint: opc.tcp://mirror-server:4841/
//! ```
//!
//! Everything else (mirror root, resync cadence, retry policy, logging)
//! defaults sensibly and can be overridden in the file or through `MIRA_*`
//! environment variables. Validation runs before any session is opened; an
//! invalid configuration is fatal at start.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use schema::{EndpointConfig, LoggingConfig, MiraConfig, MirrorSettings};
