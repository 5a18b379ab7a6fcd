//! Layered error definitions
//!
//! Categorized by source: config / target / general

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

    // ===== Target Errors =====
    /// Target build error
    #[error("target '{target}' build error: {message}")]
    TargetBuild { target: String, message: String },

    /// Target failed to handle a record
    #[error("target '{target}' write error: {message}")]
    TargetWrite { target: String, message: String },

    /// Target failed to release its resources
    #[error("target '{target}' stop error: {message}")]
    TargetStop { target: String, message: String },

    /// Target worker is gone (panicked or already shut down)
    #[error("target '{target}' is unavailable")]
    TargetUnavailable { target: String },

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

    /// Create target build error
    pub fn target_build(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TargetBuild {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create target write error
    pub fn target_write(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TargetWrite {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create target stop error
    pub fn target_stop(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TargetStop {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Short variant name, used as `SerializedError::name`
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. } => "ConfigParse",
            Self::ConfigValidation { .. } => "ConfigValidation",
            Self::TargetBuild { .. } => "TargetBuild",
            Self::TargetWrite { .. } => "TargetWrite",
            Self::TargetStop { .. } => "TargetStop",
            Self::TargetUnavailable { .. } => "TargetUnavailable",
            Self::Io(_) => "Io",
            Self::Other(_) => "Other",
        }
    }
}

impl From<validator::ValidationErrors> for ContractError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_default();
        Self::ConfigValidation {
            field,
            message: errors.to_string(),
        }
    }
}
