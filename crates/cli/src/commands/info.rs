//! `info` command implementation.

use anyhow::{Context, Result};
use tracing::info;

use config_loader::ConfigLoader;
use contracts::BatcherConfig;

use super::load_config;
use crate::cli::{InfoArgs, InfoFormat};

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = ?args.config, "Loading configuration info");

    let config = load_config(args.config.as_deref())?;

    match args.format {
        InfoFormat::Text => print_config_info(&config),
        InfoFormat::Toml => {
            let toml = ConfigLoader::to_toml(&config).context("Failed to serialize config info")?;
            println!("{}", toml);
        }
        InfoFormat::Json => {
            let json = ConfigLoader::to_json(&config).context("Failed to serialize config info")?;
            println!("{}", json);
        }
    }

    Ok(())
}

fn print_config_info(config: &BatcherConfig) {
    println!("\n=== Effective Configuration ===\n");
    println!("Version: {:?}", config.version);
    println!("Max workers: {}", describe_limit(config.max_workers, "unbounded"));
    println!("Queue capacity: {}", config.queue_capacity);

    println!("\nBatch:");
    println!("  flush_timeout_ms: {}", config.batch.flush_timeout_ms);
    println!("  min_size: {}", config.batch.min_size);
    println!("  max_size: {}", describe_limit(config.batch.max_size, "unlimited"));
    println!("  sizer: {:?}", config.batch.sizer);

    println!("\nPartition:");
    match &config.partition {
        Some(partition) => {
            for key in &partition.metadata_keys {
                println!("  - {}", key);
            }
        }
        None => println!("  (none, single shard)"),
    }

    println!();
}

fn describe_limit(value: usize, zero: &str) -> String {
    if value == 0 {
        zero.to_string()
    } else {
        value.to_string()
    }
}
