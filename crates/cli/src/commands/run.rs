//! `run` command implementation.

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use contracts::ServiceConfig;
use dispatcher::LogHub;
use transport::{Broker, Publisher};

use crate::cli::RunArgs;

/// Execute the `run` command
pub async fn run_service(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        queue = %config.queue,
        targets = config.targets.iter().filter(|t| t.enabled).count(),
        events = config.events.enabled,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::serve_metrics(args.metrics_port)?;
    }

    let broker = Broker::new();
    let hub = LogHub::start(&config, &broker)
        .await
        .context("Failed to start log hub")?;

    let publisher = broker.publisher(&config.queue);
    let pump = async {
        if args.stdin {
            pump_stdin(&publisher).await
        } else {
            std::future::pending().await
        }
    };

    tokio::select! {
        result = pump => {
            let published = result?;
            info!(published, "Stdin closed, stopping");
        }
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping log hub...");
        }
    }

    let metrics = hub.metrics();
    let failures = hub.shutdown().await;
    print_delivery_summary(&metrics);
    for (target, error) in &failures {
        warn!(target_name = %target, error = %error, "Target did not stop cleanly");
    }

    info!("Log Hub finished");
    Ok(())
}

/// Publish one request per stdin line until EOF.
///
/// Lines that are not JSON are published as plain strings so the dispatcher
/// rejects and reports them like any other malformed request.
async fn pump_stdin(publisher: &Publisher) -> Result<u64> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut published = 0;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let payload =
            serde_json::from_str::<Value>(line).unwrap_or_else(|_| Value::String(line.to_string()));
        match publisher.publish(payload).await {
            Ok(()) => published += 1,
            Err(e) => debug!(error = %e, "Log request not accepted"),
        }
    }

    Ok(published)
}

/// Wait for Ctrl+C or SIGTERM
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
fn print_config_summary(config: &ServiceConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Queue: {}", config.queue);
    println!("Target error timeout: {} ms", config.target_error_timeout_ms);
    println!(
        "Identity: {} / {}",
        config.identity.component, config.identity.instance
    );

    println!("\nTargets ({}):", config.targets.len());
    for target in &config.targets {
        let state = if target.enabled { "" } else { " [disabled]" };
        println!(
            "  - {} ({}) >= {}{}",
            target.display_name(),
            target.kind.type_name(),
            target.level,
            state
        );
    }

    if config.events.enabled {
        println!("\nEvent channels:");
        for event in &config.events.channels {
            println!("  - {}:{}", config.events.prefix, event);
        }
    }

    println!();
}

fn print_delivery_summary(metrics: &[(String, dispatcher::MetricsSnapshot)]) {
    println!("\n=== Delivery Summary ===");
    for (name, snapshot) in metrics {
        println!(
            "  {name}: delivered={} failed={} filtered={} skipped={}",
            snapshot.delivered_count,
            snapshot.failure_count,
            snapshot.filtered_count,
            snapshot.skipped_count
        );
    }
}
