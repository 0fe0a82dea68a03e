//! Minimal demo binary: loads an `EngineConfig` from a TOML file and prints
//! block-store / metadata-store stats. Not a filesystem frontend — just a
//! way to exercise the engine's construction and debug logging path from the
//! command line, the way `mosaicfs-agent` exercises its own subsystems.

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use cachefs::{Engine, EngineConfig};

const DEFAULT_CONFIG_PATH: &str = "cachefs.toml";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).cloned().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    info!(config_path, "loading engine config");
    let config = EngineConfig::load(&PathBuf::from(&config_path))?;
    let engine = Engine::open(&config)?;

    let (current, max) = engine.blocks.block_get_stats();
    info!(current, max, "block store ready");
    println!("cache_root = {}", config.cache_root.display());
    println!("current_cache_size = {current}");
    println!("max_cache_size = {max}");

    Ok(())
}
