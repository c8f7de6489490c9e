//! Data export error types

use std::time::Duration;

use contracts::{CorrelationToken, ExportChannel};
use thiserror::Error;

/// Data-export-specific errors
#[derive(Debug, Error)]
pub enum DataExportError {
    /// Correlation registry has no free slot
    #[error("correlation registry full ({capacity} operations in flight)")]
    RegistryFull { capacity: usize },

    /// Token already present in the registry
    #[error("correlation token {token} already registered")]
    DuplicateToken { token: CorrelationToken },

    /// Token was issued before the registry was cleared
    #[error("correlation token {token} is stale (registry epoch {epoch})")]
    StaleToken {
        token: CorrelationToken,
        epoch: u32,
    },

    /// Serialized send could not enter the gate in time
    #[error("submission serializer busy, gave up after {waited:?}")]
    SerializerTimeout { waited: Duration },

    /// Completion callback did not arrive before the deadline
    #[error("completion for {token} not observed before the deadline")]
    CallbackTimeout { token: CorrelationToken },

    /// Transport asked the application to stop
    #[error("transport '{transport}' requested shutdown")]
    TransportShutdown { transport: String },

    /// Channel is administratively disabled
    #[error("export channel '{channel}' is disabled")]
    ChannelDisabled { channel: ExportChannel },

    /// Contract-level error (config, payload, transport)
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DataExportError {
    /// Create a transport shutdown error
    pub fn transport_shutdown(transport: impl Into<String>) -> Self {
        Self::TransportShutdown {
            transport: transport.into(),
        }
    }
}
