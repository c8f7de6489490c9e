//! ExportResult - outcome taxonomy of an export operation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of an export operation
///
/// `Uninitialized` and `Enqueued` are the only non-terminal values. `Timeout`
/// is never stored on a future; it is what a bounded wait reports when the
/// future was still `Enqueued` at its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportResult {
    /// Never touched
    #[default]
    Uninitialized,
    /// Dispatched, waiting for the completion callback
    Enqueued,
    /// Transport reported completion
    Success,
    /// Generic or transport-reported failure
    Failure,
    /// Wait deadline elapsed (wait-local)
    Timeout,
    /// Transport explicitly refused, or no room to track the operation
    Denied,
    /// Bad caller input
    InvalidParam,
    /// Payload exceeds what the engine accepts
    DataTooLarge,
}

impl ExportResult {
    /// Whether a future holding this value will never change again
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Uninitialized | Self::Enqueued)
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Stable label (metrics, JSON output)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Enqueued => "enqueued",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::Denied => "denied",
            Self::InvalidParam => "invalid_param",
            Self::DataTooLarge => "data_too_large",
        }
    }
}

impl fmt::Display for ExportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
