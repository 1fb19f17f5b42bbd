//! ## memlist-cli
//! **Batch front end for the arena allocator and concurrent list**
//!
//! Every command builds its own arena, runs to completion and releases it.
//! Failure to reserve the arena is fatal and ends the process with an error.

use clap::Parser;
use memlist_telemetry::Logger;

mod commands;

use commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;
    Logger::init(&config.telemetry);

    commands::run(cli.command, config)
}
