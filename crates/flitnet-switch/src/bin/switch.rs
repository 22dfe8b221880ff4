//! `switch`: one software switch of the co-simulation fabric.
//!
//! ```text
//! USAGE:
//!   switch <LINK_LATENCY> <SWITCH_LATENCY> <BANDWIDTH_GBPS>
//! ```
//!
//! Latencies are in cycles; at 3.2 GHz, `cycles / 3.2` is nanoseconds
//! (a link latency of 6405 models ~2 µs). `LINK_LATENCY` must be a multiple
//! of the flits per big-token (7 with default parameters).
//!
//! Port topology and the MAC table come from `switchconfig.yaml` in the
//! working directory, or the file named by `$SWITCHCONFIG`. The process
//! runs until killed; any error that would desynchronize simulated time
//! exits nonzero.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use flitnet_switch::{MacTable, SwitchConfig, SwitchEngine};
use flitnet_wire::TokenGeometry;

#[derive(Parser)]
#[command(name = "switch", about = "Co-simulation fabric switch", version)]
struct Cli {
    /// Link latency in cycles; must be a multiple of the flits per big-token.
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    link_latency: u64,

    /// Switching latency in cycles.
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    switch_latency: u64,

    /// Per-port bandwidth throttle in Gbps (of the 200 Gbps line rate).
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    bandwidth: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let geom = TokenGeometry::switch_link();

    let config_path = std::env::var_os("SWITCHCONFIG")
        .map_or_else(|| PathBuf::from("switchconfig.yaml"), PathBuf::from);
    let config = SwitchConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let table = MacTable::load(&config.mac_table, config.topology())
        .with_context(|| format!("loading {}", config.mac_table.display()))?;

    let ports = config.build_ports(&geom, cli.link_latency)?;

    let mut engine = SwitchEngine::new(
        geom,
        cli.link_latency,
        cli.switch_latency,
        cli.bandwidth,
        table,
        ports,
    )?;
    if let Some(flits) = config.output_buf_flits {
        engine = engine.with_output_limit(flits);
    }

    engine.run().context("switch epoch loop failed")
}
