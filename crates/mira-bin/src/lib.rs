// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! MIRA command-line binary internals.
//!
//! The `mira` binary wires configuration, logging, and shutdown handling
//! around the sync engine from `mira-sync`. See the `cli` module for the
//! command surface.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod shutdown;
