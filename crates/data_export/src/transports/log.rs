//! LogTransport - logs requests via tracing and completes them immediately

use std::time::Duration;

use contracts::{
    CompletionCallback, CompletionReason, ContractError, CorrelationToken, PumpStatus, Transport,
    TransportRequest,
};
use tracing::{info, instrument};

/// Transport that only logs, for dry runs and debugging
pub struct LogTransport {
    name: String,
}

impl LogTransport {
    /// Create a new LogTransport with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Transport for LogTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_transport_dispatch",
        skip(self, request, on_complete),
        fields(transport = %self.name, token = %token)
    )]
    fn dispatch(
        &self,
        request: TransportRequest,
        token: CorrelationToken,
        on_complete: CompletionCallback,
    ) -> Result<(), ContractError> {
        info!(
            transport = %self.name,
            channel = %request.channel,
            method = %request.method,
            target = request.target.describe(),
            bytes = request.payload.len(),
            "Export request"
        );
        on_complete(token, CompletionReason::Done);
        Ok(())
    }

    fn pump_events(&self, _timeout: Duration) -> PumpStatus {
        // completions are delivered inside dispatch
        PumpStatus::Idle
    }
}
