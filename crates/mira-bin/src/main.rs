// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! MIRA binary entry point.

use clap::Parser;

use mira_bin::cli::{Cli, Commands, LogFormat, RunArgs};
use mira_bin::commands;
use mira_bin::error::CliError;
use mira_bin::logging::init_logging;
use mira_config::ConfigLoader;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = dispatch(cli).await {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let command = cli.command.clone().unwrap_or(Commands::Run(RunArgs {
        simulate: false,
        once: false,
    }));

    match command {
        Commands::Version => {
            commands::version::execute();
            Ok(())
        }
        Commands::Validate => {
            init_logging(
                cli.log_level.as_deref().unwrap_or("warn"),
                cli.log_format.unwrap_or(LogFormat::Text),
            );
            commands::validate::execute(&cli.config)
        }
        Commands::Run(args) => {
            let config = ConfigLoader::new().load(&cli.config)?;

            // CLI flags win over the config file.
            let level = cli
                .log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone());
            let format = cli
                .log_format
                .unwrap_or_else(|| LogFormat::from_config(&config.logging.format));
            init_logging(&level, format);

            commands::run::execute(config, args).await
        }
    }
}
