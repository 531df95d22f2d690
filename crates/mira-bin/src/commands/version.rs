// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `version` command.

/// Prints version information.
pub fn execute() {
    println!("mira {}", mira_core::VERSION);
    println!("OPC UA address-space mirror");
    println!("Copyright (c) 2025 Sylvex");
}
