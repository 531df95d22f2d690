// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `validate` command: parse and validate configuration, then exit.

use std::path::Path;

use mira_config::ConfigLoader;

use crate::error::CliError;

/// Executes the `validate` command.
pub fn execute(path: &Path) -> Result<(), CliError> {
    let config = ConfigLoader::new().load(path)?;

    println!("configuration valid: {}", path.display());
    println!("  source endpoint : {}", config.source.endpoint);
    println!("  target endpoint : {}", config.target.endpoint);
    println!("  mirror root     : {}", config.mirror.root_node_id);
    println!(
        "  full resync     : {}",
        match config.mirror.resync_interval() {
            Some(period) => format!("every {}s", period.as_secs()),
            None => "disabled".to_string(),
        }
    );
    println!("  max retries     : {}", config.mirror.max_retries);
    Ok(())
}
