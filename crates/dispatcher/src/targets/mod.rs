//! Target implementations and the startup initializer
//!
//! Contains ConsoleTarget, CacheTarget, DocumentStoreTarget and ChatTarget.

mod cache;
mod chat;
mod console;
mod document_store;

pub use self::cache::CacheTarget;
pub use self::chat::{escape_markdown, ChatTarget};
pub use self::console::ConsoleTarget;
pub use self::document_store::DocumentStoreTarget;

use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use serde_json::Value;
use tracing::{info, instrument, warn};

use contracts::{ContractError, LevelConfig, LogRecord, TargetConfig, TargetKind};
use log_cache::CacheRegistry;

use crate::dispatcher::shutdown_targets;
use crate::error::DispatcherError;
use crate::handle::TargetHandle;

/// Build every enabled target in configuration order.
///
/// If one target fails to build, the ones already built are stopped before
/// the error is returned.
#[instrument(name = "initialize_targets", skip_all, fields(configured = configs.len()))]
pub async fn initialize_targets(
    configs: &[TargetConfig],
    levels: &LevelConfig,
    registry: &Arc<CacheRegistry<LogRecord>>,
) -> Result<Vec<TargetHandle>, DispatcherError> {
    let mut handles = Vec::with_capacity(configs.len());

    for config in configs {
        let name = config.display_name();
        if !config.enabled {
            info!(target_name = %name, "Target disabled, skipping");
            continue;
        }

        match create_target_handle(config, levels, registry) {
            Ok(handle) => {
                info!(
                    target_name = %name,
                    kind = config.kind.type_name(),
                    level = %config.level,
                    "Target initialized"
                );
                handles.push(handle);
            }
            Err(e) => {
                warn!(target_name = %name, error = %e, "Target failed to build, stopping the others");
                shutdown_targets(handles).await;
                return Err(e);
            }
        }
    }

    Ok(handles)
}

/// Build one target and spawn its worker
pub fn create_target_handle(
    config: &TargetConfig,
    levels: &LevelConfig,
    registry: &Arc<CacheRegistry<LogRecord>>,
) -> Result<TargetHandle, DispatcherError> {
    let name = config.display_name().to_string();
    let threshold = levels.rank(&config.level).ok_or_else(|| {
        DispatcherError::target_creation(
            &name,
            format!("level '{}' is not part of the hierarchy", config.level),
        )
    })?;

    let built = match &config.kind {
        TargetKind::Console(c) => {
            ConsoleTarget::build(&name, c.clone()).map(|t| TargetHandle::spawn(t, threshold))
        }
        TargetKind::Cache(c) => CacheTarget::build(&name, c, Arc::clone(registry))
            .map(|t| TargetHandle::spawn(t, threshold)),
        TargetKind::DocumentStore(c) => {
            DocumentStoreTarget::build(&name, c).map(|t| TargetHandle::spawn(t, threshold))
        }
        TargetKind::Chat(c) => {
            ChatTarget::build(&name, c.clone()).map(|t| TargetHandle::spawn(t, threshold))
        }
    };

    built.map_err(|e| DispatcherError::target_creation(name, e.to_string()))
}

/// Reject strftime strings chrono cannot render
pub(crate) fn check_timestamp_format(target: &str, format: &str) -> Result<(), ContractError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ContractError::target_build(
            target,
            format!("invalid timestamp format '{format}'"),
        ));
    }
    Ok(())
}

/// Human readable rendering of record data. Strings are kept as is.
pub(crate) fn readable(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
