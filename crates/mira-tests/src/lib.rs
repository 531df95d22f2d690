// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Shared fixtures and mocks for MIRA workspace tests.
//!
//! The integration suites under `tests/` exercise the full pipeline against
//! the in-memory address space, with the decorators in
//! [`common::mocks`] injecting enumeration failures, unreadable values,
//! failing target operations, and transport drops.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;
