//! Layered error definitions
//!
//! Categorized by source: config / send / shard

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Send Errors =====
    /// Downstream send failure
    #[error("downstream send failed: {message}")]
    Send { message: String },

    // ===== Shard Errors =====
    /// Shard is no longer accepting requests
    #[error("shard '{partition}' is closed")]
    ShardClosed { partition: String },

    /// Batch could not be flushed
    #[error("flush aborted for shard '{partition}': {message}")]
    FlushAborted { partition: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create downstream send error
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
        }
    }

    /// Create shard closed error
    pub fn shard_closed(partition: impl Into<String>) -> Self {
        Self::ShardClosed {
            partition: partition.into(),
        }
    }

    /// Create flush aborted error
    pub fn flush_aborted(partition: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FlushAborted {
            partition: partition.into(),
            message: message.into(),
        }
    }
}
