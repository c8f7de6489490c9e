//! Transport trait - export output interface
//!
//! The engine never moves bytes itself. It hands a [`TransportRequest`] plus a
//! [`CorrelationToken`] to a [`Transport`] and later receives exactly one
//! completion for every dispatch the transport accepted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::{ContractError, ExportChannel, PayloadReader, TransportMethod};

/// Correlation token of an in-flight operation
///
/// Issued by the engine at submit time. `epoch` changes whenever the
/// registry is force-cleared, so completions for operations dropped by a
/// clear can never match a newer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationToken {
    epoch: u32,
    sequence: u64,
}

impl CorrelationToken {
    pub fn new(epoch: u32, sequence: u64) -> Self {
        Self { epoch, sequence }
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.epoch, self.sequence)
    }
}

/// Reason code delivered with a completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// Upload finished / telemetry sent
    Done,
    /// Transport is exiting; the operation was abandoned
    Exit,
    /// Backend refused the operation
    Denied,
    /// Transport-level error
    Error,
    /// Code this SDK does not know about
    Other(i32),
}

/// Completion callback type
///
/// May run inside `dispatch`, inside `pump_events`, or on a thread owned by
/// the transport.
pub type CompletionCallback = Arc<dyn Fn(CorrelationToken, CompletionReason) + Send + Sync>;

/// Where a request is going
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportTarget {
    /// `PUT <url>`
    Http { url: String },
    /// PUT `remote_name` into the named storage
    NamedStorage {
        storage_name: Option<String>,
        remote_name: String,
    },
    /// Telemetry entry published under `key`
    Telemetry { key: String },
}

impl TransportTarget {
    /// Object name / URL / key, for logging
    pub fn describe(&self) -> &str {
        match self {
            Self::Http { url } => url,
            Self::NamedStorage { remote_name, .. } => remote_name,
            Self::Telemetry { key } => key,
        }
    }
}

/// A single dispatch
#[derive(Debug)]
pub struct TransportRequest {
    /// Channel the payload came from
    pub channel: ExportChannel,
    /// Resolved method (never `Unknown`)
    pub method: TransportMethod,
    /// Destination
    pub target: TransportTarget,
    /// Bytes to send
    pub payload: PayloadReader,
}

/// Outcome of one `pump_events` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStatus {
    /// Nothing happened before the timeout
    Idle,
    /// This many completions were delivered
    Delivered(usize),
    /// The transport wants the application to stop
    ShutdownRequested,
}

/// Backend transport
///
/// Implementations guarantee at most one completion per accepted dispatch and
/// none for a dispatch that returned `Err`.
pub trait Transport: Send + Sync {
    /// Transport name (used for logging)
    fn name(&self) -> &str;

    /// Start an operation
    ///
    /// # Errors
    /// Synchronous refusal; no completion will follow
    fn dispatch(
        &self,
        request: TransportRequest,
        token: CorrelationToken,
        on_complete: CompletionCallback,
    ) -> Result<(), ContractError>;

    /// Drive the transport's event loop for at most `timeout`
    ///
    /// Not reentrant: callers serialize access.
    fn pump_events(&self, timeout: Duration) -> PumpStatus;
}
