// SPDX-License-Identifier: MIT

mod utils;

use anyhow::Context;
use clap::{Parser, error::ErrorKind};
use std::{path::PathBuf, process::ExitCode};

use blkfs::prelude::*;

#[derive(Parser)]
#[command(name = "blkmount", version, about = "Mount a blkfs image through FUSE", long_about = None)]
struct Cli {
    /// Directory to mount the filesystem on
    mountpoint: PathBuf,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            println!("{}", e.render());
            return ExitCode::FAILURE;
        }
    };

    utils::init_logging();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = DeviceConfig::default();
    config.validate()?;

    let store = BlockStore::open(&config.backing_path, config.disk_size, config.block_size)
        .with_context(|| format!("cannot open backing store {}", config.backing_path.display()))?;
    tracing::info!(
        path = %config.backing_path.display(),
        blocks = store.block_count(),
        block_size = store.block_size(),
        "backing store opened"
    );

    let mut controller = LifecycleController::new();
    controller.mount(store)?;

    let shutdown = ShutdownSignal::new();
    shutdown.install()?;

    let bridge = FuseMounter::new(shutdown.clone());
    controller
        .serve(&bridge, &cli.mountpoint, &shutdown)
        .with_context(|| format!("cannot serve on {}", cli.mountpoint.display()))?;

    tracing::info!("shutdown complete");
    Ok(())
}
