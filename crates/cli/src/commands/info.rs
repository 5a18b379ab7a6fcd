//! `info` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::{ServiceConfig, Severity};

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    queue: String,
    target_error_timeout_ms: u64,
    component: String,
    instance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    levels: Option<LevelsInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    targets: Vec<TargetInfo>,
    event_channels: Vec<String>,
}

#[derive(Serialize)]
struct LevelsInfo {
    severity: Severity,
    /// Most severe first
    hierarchy: Vec<(String, i64)>,
    mapping: Vec<(String, String)>,
    on_unknown_level: String,
    on_target_failed_to_handle: String,
}

#[derive(Serialize)]
struct TargetInfo {
    name: String,
    kind: String,
    level: String,
    enabled: bool,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&config, args);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(config: &ServiceConfig, args: &InfoArgs) -> ConfigInfo {
    let levels = args.levels.then(|| {
        let mut hierarchy: Vec<_> = config
            .levels
            .hierarchy
            .iter()
            .map(|(name, rank)| (name.clone(), *rank))
            .collect();
        hierarchy.sort_by_key(|(_, rank)| *rank);
        if config.levels.severity == Severity::HigherIsMoreSevere {
            hierarchy.reverse();
        }

        LevelsInfo {
            severity: config.levels.severity,
            hierarchy,
            mapping: config
                .levels
                .mapping
                .iter()
                .map(|(token, level)| (token.clone(), level.clone()))
                .collect(),
            on_unknown_level: config.levels.internal.on_unknown_level.clone(),
            on_target_failed_to_handle: config.levels.internal.on_target_failed_to_handle.clone(),
        }
    });

    let targets = if args.targets {
        config
            .targets
            .iter()
            .map(|t| TargetInfo {
                name: t.display_name().to_string(),
                kind: t.kind.type_name().to_string(),
                level: t.level.clone(),
                enabled: t.enabled,
            })
            .collect()
    } else {
        Vec::new()
    };

    let event_channels = if config.events.enabled {
        config
            .events
            .channels
            .iter()
            .map(|event| format!("{}:{}", config.events.prefix, event))
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        queue: config.queue.clone(),
        target_error_timeout_ms: config.target_error_timeout_ms,
        component: config.identity.component.clone(),
        instance: config.identity.instance.clone(),
        levels,
        targets,
        event_channels,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("\n=== Log Hub Configuration ===\n");
    println!("Queue: {}", info.queue);
    println!("Target error timeout: {} ms", info.target_error_timeout_ms);
    println!("Identity: {} / {}", info.component, info.instance);

    if let Some(ref levels) = info.levels {
        println!("\nLevels (most severe first, {:?}):", levels.severity);
        for (name, rank) in &levels.hierarchy {
            println!("  {:>4}  {}", rank, name);
        }
        println!("\nMapping:");
        for (token, level) in &levels.mapping {
            println!("  {} -> {}", token, level);
        }
        println!("\nInternal:");
        println!("  unknown level: {}", levels.on_unknown_level);
        println!("  target failure: {}", levels.on_target_failed_to_handle);
    }

    if !info.targets.is_empty() {
        println!("\nTargets ({}):", info.targets.len());
        for target in &info.targets {
            let state = if target.enabled { "" } else { " [disabled]" };
            println!(
                "  - {} ({}) >= {}{}",
                target.name, target.kind, target.level, state
            );
        }
    }

    if info.event_channels.is_empty() {
        println!("\nEvent bridge: disabled");
    } else {
        println!("\nEvent channels:");
        for channel in &info.event_channels {
            println!("  - {}", channel);
        }
    }

    println!();
}
