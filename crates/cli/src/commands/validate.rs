//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::BatcherConfig;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    max_workers: usize,
    queue_capacity: usize,
    flush_timeout_ms: u64,
    min_size: usize,
    max_size: usize,
    sizer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    partition_keys: Option<Vec<String>>,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    max_workers: config.max_workers,
                    queue_capacity: config.queue_capacity,
                    flush_timeout_ms: config.batch.flush_timeout_ms,
                    min_size: config.batch.min_size,
                    max_size: config.batch.max_size,
                    sizer: format!("{:?}", config.batch.sizer),
                    partition_keys: config.partition.map(|p| p.metadata_keys),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &BatcherConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.max_workers == 0 {
        warnings.push("max_workers is 0 - downstream sends are unbounded".to_string());
    }

    if config.partition.is_none() {
        warnings.push("No partition section - all requests share a single shard".to_string());
    }

    if config.batch.min_size == 0 {
        warnings.push("batch.min_size is 0 - every request is flushed on its own".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Max workers: {}", summary.max_workers);
            println!("  Queue capacity: {}", summary.queue_capacity);
            println!(
                "  Batch: timeout={}ms min={} max={} sizer={}",
                summary.flush_timeout_ms, summary.min_size, summary.max_size, summary.sizer
            );
            if let Some(ref keys) = summary.partition_keys {
                println!("  Partition keys: {}", keys.join(", "));
            }
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
