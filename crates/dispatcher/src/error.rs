//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Invalid startup parameter, prevents startup
    #[error("cannot start dispatcher: invalid parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Target creation error
    #[error("failed to create target '{name}': {message}")]
    TargetCreation { name: String, message: String },

    /// Inbound record failed validation
    #[error("invalid log request: {reason}")]
    Rejected { reason: String },

    /// Target error (from contract)
    #[error("target error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// Transport error
    #[error("transport error: {0}")]
    Transport(#[from] transport::TransportError),
}

impl DispatcherError {
    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a target creation error
    pub fn target_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TargetCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}
