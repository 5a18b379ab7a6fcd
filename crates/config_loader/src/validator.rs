//! 配置校验模块
//!
//! 校验规则：
//! - queue 为合法标识符
//! - levels.hierarchy / levels.mapping 非空
//! - mapping 的值与 internal 级别都存在于 hierarchy
//! - 每个 target 的 level 存在于 hierarchy，且类型字段合法
//! - events 启用时 prefix 非空、level 存在于 hierarchy

use validator::Validate;

use contracts::{is_valid_queue_name, ContractError, ServiceConfig, TargetKind};

/// 校验 ServiceConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &ServiceConfig) -> Result<(), ContractError> {
    validate_queue(config)?;
    validate_levels(config)?;
    validate_targets(config)?;
    validate_events(config)?;
    Ok(())
}

fn validate_queue(config: &ServiceConfig) -> Result<(), ContractError> {
    if !is_valid_queue_name(&config.queue) {
        return Err(ContractError::config_validation(
            "queue",
            format!("'{}' is not a queue identifier [A-Za-z0-9_.:-]+", config.queue),
        ));
    }
    Ok(())
}

/// 校验级别配置
fn validate_levels(config: &ServiceConfig) -> Result<(), ContractError> {
    let levels = &config.levels;

    if levels.hierarchy.is_empty() {
        return Err(ContractError::config_validation(
            "levels.hierarchy",
            "hierarchy cannot be empty",
        ));
    }
    if levels.mapping.is_empty() {
        return Err(ContractError::config_validation(
            "levels.mapping",
            "mapping cannot be empty",
        ));
    }

    let dangling = levels.dangling_levels();
    if !dangling.is_empty() {
        return Err(ContractError::config_validation(
            "levels",
            format!("levels not found in hierarchy: {}", dangling.join(", ")),
        ));
    }

    Ok(())
}

/// 校验 target 配置
fn validate_targets(config: &ServiceConfig) -> Result<(), ContractError> {
    for (idx, target) in config.targets.iter().enumerate() {
        if config.levels.rank(&target.level).is_none() {
            return Err(ContractError::config_validation(
                format!("targets[{idx}].level"),
                format!("level '{}' not found in hierarchy", target.level),
            ));
        }

        let fields = match &target.kind {
            TargetKind::Console(c) => c.validate(),
            TargetKind::Cache(c) => c.validate(),
            TargetKind::DocumentStore(c) => c.validate(),
            TargetKind::Chat(c) => c.validate(),
        };
        fields.map_err(|errors| match ContractError::from(errors) {
            ContractError::ConfigValidation { field, message } => {
                ContractError::config_validation(format!("targets[{idx}].{field}"), message)
            }
            other => other,
        })?;
    }
    Ok(())
}

/// 校验事件桥配置
fn validate_events(config: &ServiceConfig) -> Result<(), ContractError> {
    let events = &config.events;
    if !events.enabled {
        return Ok(());
    }

    if events.prefix.is_empty() {
        return Err(ContractError::config_validation(
            "events.prefix",
            "prefix cannot be empty",
        ));
    }
    if config.levels.rank(&events.level).is_none() {
        return Err(ContractError::config_validation(
            "events.level",
            format!("level '{}' not found in hierarchy", events.level),
        ));
    }
    Ok(())
}
