//! # Impact Sim
//!
//! Runs the scripted melee duel and reports what the impact engine did.
//!
//! Usage: `impact-sim [config.toml]`. Without an argument the platform
//! config directory is searched for `impact.toml`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

use anyhow::{Context, Result};
use impact_engine::config::EngineConfig;
use impact_engine::demo;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(config.log_filter.parse()?))
        .init();

    info!("Impact sim starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let summary = demo::run_duel(&config).context("duel failed")?;

    info!(
        "{} swings with '{}': {} damage events ({:.1} total), {} ricochets, {} stopped",
        summary.swings,
        summary.weapon,
        summary.damage_events,
        summary.total_damage,
        summary.ricochets,
        summary.attacks_stopped
    );
    info!(
        "Context pool: {} allocated, peak {}, {} leaked; {} scheduled entries left",
        summary.pool_capacity, summary.pool_peak, summary.pool_in_use, summary.pending_at_end
    );
    if config.json_summary {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    info!("Impact sim shutdown complete");
    Ok(())
}
