//! Layered error definitions
//!
//! Categorized by source: config / payload / transport

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

    // ===== Payload Errors =====
    /// Payload read error (offset corruption, handle gone)
    #[error("payload read error: {message}")]
    PayloadRead { message: String },

    // ===== Transport Errors =====
    /// Transport refused the operation synchronously
    #[error("transport '{transport}' dispatch error: {message}")]
    TransportDispatch { transport: String, message: String },

    /// Transport is shutting down
    #[error("transport '{transport}' is shutting down")]
    TransportShutdown { transport: String },

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

    /// Create payload read error
    pub fn payload_read(message: impl Into<String>) -> Self {
        Self::PayloadRead {
            message: message.into(),
        }
    }

    /// Create transport dispatch error
    pub fn transport_dispatch(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransportDispatch {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Create transport shutdown error
    pub fn transport_shutdown(transport: impl Into<String>) -> Self {
        Self::TransportShutdown {
            transport: transport.into(),
        }
    }
}
