//! 配置校验模块
//!
//! 校验规则：
//! - queue_capacity > 0
//! - batch.flush_timeout_ms > 0
//! - batch.max_size 为 0 或 >= batch.min_size
//! - partition.metadata_keys 非空、无空白项、无重复

use std::collections::HashSet;

use contracts::{BatcherConfig, ContractError};

/// 校验 BatcherConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &BatcherConfig) -> Result<(), ContractError> {
    validate_queue(config)?;
    validate_batch(config)?;
    validate_partition(config)?;
    Ok(())
}

/// 校验分片队列容量
fn validate_queue(config: &BatcherConfig) -> Result<(), ContractError> {
    if config.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "queue_capacity",
            "queue_capacity must be > 0",
        ));
    }
    Ok(())
}

/// 校验批次策略
fn validate_batch(config: &BatcherConfig) -> Result<(), ContractError> {
    let batch = &config.batch;

    if batch.flush_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "batch.flush_timeout_ms",
            "flush_timeout_ms must be > 0",
        ));
    }

    if batch.max_size > 0 && batch.max_size < batch.min_size {
        return Err(ContractError::config_validation(
            "batch.min_size / batch.max_size",
            format!(
                "max_size ({}) must be 0 or >= min_size ({})",
                batch.max_size, batch.min_size
            ),
        ));
    }

    Ok(())
}

/// 校验分区配置
fn validate_partition(config: &BatcherConfig) -> Result<(), ContractError> {
    let Some(partition) = &config.partition else {
        return Ok(());
    };

    if partition.metadata_keys.is_empty() {
        return Err(ContractError::config_validation(
            "partition.metadata_keys",
            "at least one metadata key is required",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, key) in partition.metadata_keys.iter().enumerate() {
        if key.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("partition.metadata_keys[{idx}]"),
                "metadata key cannot be blank",
            ));
        }
        if !seen.insert(key.as_str()) {
            return Err(ContractError::config_validation(
                format!("partition.metadata_keys[{idx}]"),
                format!("duplicate metadata key '{key}'"),
            ));
        }
    }

    Ok(())
}
