//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use contracts::BatcherConfig;

use super::load_config;
use crate::cli::RunArgs;
use crate::pipeline::{LoadProfile, Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    // Apply CLI overrides
    if let Some(max_workers) = args.max_workers {
        info!(max_workers, "Overriding max_workers from CLI");
        config.max_workers = max_workers;
        config_loader::ConfigLoader::validate(&config)
            .context("Configuration invalid after CLI overrides")?;
    }

    info!(
        max_workers = config.max_workers,
        queue_capacity = config.queue_capacity,
        partitioned = config.partition.is_some(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        config,
        load: LoadProfile {
            tenants: args.tenants.max(1),
            requests: args.requests,
            records_per_request: args.records_per_request.max(1),
            record_bytes: args.record_bytes,
            producers: args.producers.max(1),
        },
        send_latency: Duration::from_millis(args.send_latency_ms),
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    let pipeline = Pipeline::new(pipeline_config);

    info!("Starting pipeline...");

    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        requests_sent = stats.requests_sent,
        requests_failed = stats.requests_failed,
        shards = stats.shards,
        duration_secs = stats.duration.as_secs_f64(),
        rps = format!("{:.2}", stats.throughput()),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("Shardbatch finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &BatcherConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Workers:");
    if config.max_workers == 0 {
        println!("  Max workers: unbounded");
    } else {
        println!("  Max workers: {}", config.max_workers);
    }
    println!("  Queue capacity: {}", config.queue_capacity);

    println!("\nBatching:");
    println!("  Flush timeout: {}ms", config.batch.flush_timeout_ms);
    println!("  Min size: {}", config.batch.min_size);
    if config.batch.max_size == 0 {
        println!("  Max size: unlimited");
    } else {
        println!("  Max size: {}", config.batch.max_size);
    }
    println!("  Sizer: {:?}", config.batch.sizer);

    match &config.partition {
        Some(partition) => {
            println!("\nPartitioning:");
            println!("  Metadata keys: {:?}", partition.metadata_keys);
        }
        None => println!("\nPartitioning: single shard"),
    }

    println!();
}
