//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::ServiceConfig;

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
    queue: String,
    level_count: usize,
    target_count: usize,
    enabled_target_count: usize,
    event_channel_count: usize,
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

    // Try to load and validate
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
                    queue: config.queue.clone(),
                    level_count: config.levels.hierarchy.len(),
                    target_count: config.targets.len(),
                    enabled_target_count: config.targets.iter().filter(|t| t.enabled).count(),
                    event_channel_count: if config.events.enabled {
                        config.events.channels.len()
                    } else {
                        0
                    },
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
fn collect_warnings(config: &ServiceConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.targets.iter().all(|t| !t.enabled) {
        warnings.push("No enabled targets - every record will be dropped".to_string());
    }

    if config.events.enabled && config.events.channels.is_empty() {
        warnings.push("events.enabled is set but no channels are configured".to_string());
    }

    if config.target_error_timeout_ms == 0 {
        warnings.push("target_error_timeout_ms is 0 - failing targets are never skipped".to_string());
    }

    // Internal records below every threshold reach no one
    for internal in [
        &config.levels.internal.on_unknown_level,
        &config.levels.internal.on_target_failed_to_handle,
    ] {
        let Some(rank) = config.levels.rank(internal) else {
            continue;
        };
        let reaches_any = config
            .targets
            .iter()
            .filter(|t| t.enabled)
            .filter_map(|t| config.levels.rank(&t.level))
            .any(|threshold| config.levels.admits(rank, threshold));
        if !reaches_any && !config.targets.is_empty() {
            warnings.push(format!(
                "Internal level '{internal}' passes no target threshold - its reports are lost"
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Queue: {}", summary.queue);
            println!("  Levels: {}", summary.level_count);
            println!(
                "  Targets: {} ({} enabled)",
                summary.target_count, summary.enabled_target_count
            );
            println!("  Event channels: {}", summary.event_channel_count);
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
