// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The `run` command: start the mirror and keep it live until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use mira_config::MiraConfig;
use mira_core::memory::MemoryAddressSpace;
use mira_core::session::TargetSession;
use mira_core::types::{NodeId, Value};
use mira_sync::{EngineConfig, SyncEngine};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::shutdown::ShutdownCoordinator;

/// Executes the `run` command.
pub async fn execute(config: MiraConfig, args: RunArgs) -> Result<(), CliError> {
    // The wire-level OPC UA transport is an external backend. This build
    // mirrors the built-in simulated address space; connecting to real
    // servers requires linking a transport crate against the session traits.
    if !args.simulate {
        return Err(CliError::NoTransport);
    }

    let engine_config = engine_config_from(&config)?;
    let source = Arc::new(MemoryAddressSpace::with_root(
        NodeId::OBJECTS_FOLDER,
        "Objects",
        config.source.namespace,
    ));
    let target = Arc::new(MemoryAddressSpace::with_root(
        NodeId::OBJECTS_FOLDER,
        "Objects",
        config.target.namespace,
    ));
    seed_simulation(&source).await?;

    let engine = SyncEngine::new(source.clone(), target.clone(), engine_config);

    if args.once {
        let report = engine.run_full_sync().await?;
        let mirrored = engine.mirrored_count().await;
        info!(%report, mirrored, "one-shot sync complete");
        if let Ok(json) = serde_json::to_string_pretty(&report) {
            println!("{json}");
        }
        return Ok(());
    }

    engine.start()?;
    let simulation = tokio::spawn(drive_simulation(source));

    let coordinator = ShutdownCoordinator::new();
    coordinator.wait_for_signal().await;

    simulation.abort();
    engine.stop().await;

    let status = engine.status();
    info!(
        state = %status.state,
        cycles = status.cycles_completed,
        incremental = status.incremental_updates,
        "mirror stopped"
    );
    Ok(())
}

fn engine_config_from(config: &MiraConfig) -> Result<EngineConfig, CliError> {
    Ok(EngineConfig {
        root_node_id: config.mirror.parsed_root_node_id()?,
        target_root: config.mirror.parsed_target_root_id()?,
        full_resync_interval: config.mirror.resync_interval(),
        retry: config.mirror.retry_config(),
        walk_channel_capacity: config.mirror.walk_channel_capacity,
        event_queue_capacity: config.mirror.event_queue_capacity,
    })
}

/// Seeds the simulated plant: two devices with a few live variables.
async fn seed_simulation(source: &Arc<MemoryAddressSpace>) -> Result<(), CliError> {
    let root = source.root_id();

    let device1 = source.create_object(&root, "Device1").await.map_err(sync)?;
    source
        .create_variable(&device1, "Temperature", Some(Value::Double(20.0)))
        .await
        .map_err(sync)?;
    source
        .create_variable(&device1, "Status", Some(Value::String("running".into())))
        .await
        .map_err(sync)?;

    let device2 = source.create_object(&root, "Device2").await.map_err(sync)?;
    source
        .create_variable(&device2, "Pressure", Some(Value::Double(1.013)))
        .await
        .map_err(sync)?;

    Ok(())
}

fn sync(err: mira_core::OperationError) -> CliError {
    CliError::Sync(err.into())
}

/// Mutates the simulated source so subscription forwarding has something
/// to forward.
async fn drive_simulation(source: Arc<MemoryAddressSpace>) {
    let temperature = source.find_by_name("Temperature");
    let pressure = source.find_by_name("Pressure");
    let mut tick: u64 = 0;

    loop {
        tokio::time::sleep(Duration::from_secs(2)).await;
        tick += 1;

        if let Some(id) = &temperature {
            let value = 20.0 + (tick % 10) as f64 * 0.5;
            let _ = source.set_value(id, Value::Double(value)).await;
        }
        if let Some(id) = &pressure {
            let value = 1.013 + (tick % 7) as f64 * 0.001;
            let _ = source.set_value(id, Value::Double(value)).await;
        }
    }
}
