//! Oxidized-Gekko - GameCube/Wii Emulator
//!
//! Main entry point for the emulator core.

use og_core::config::Config;
use oxidized_gekko::System;

fn main() -> anyhow::Result<()> {
    // Load config to get the initial log level
    let config = Config::load().unwrap_or_default();

    og_core::logging::init(&config);

    tracing::info!("Starting Oxidized-Gekko");

    let system = System::new(&config);
    for section in system.snapshot_sections() {
        tracing::info!("{}: {} KB", section.marker, section.data.len() / 1024);
    }

    Ok(())
}
