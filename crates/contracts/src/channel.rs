//! Export channels and transport methods
//!
//! A channel names *what* is exported (input tensor vs. metadata), the
//! transport method names *how* it reaches the backend.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 导出通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportChannel {
    /// Raw captured data (input tensor / image)
    Raw,
    /// Inference output (metadata)
    Metadata,
}

impl ExportChannel {
    /// Key of this channel inside `port_settings`
    pub fn port_key(self) -> &'static str {
        match self {
            Self::Raw => "input_tensor",
            Self::Metadata => "metadata",
        }
    }
}

impl fmt::Display for ExportChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.port_key())
    }
}

/// Transport method configured for a channel
///
/// Configuration carries the numeric code; anything outside the known range
/// resolves to [`TransportMethod::Unknown`] and is rejected at submit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMethod {
    /// Telemetry / pub-sub send (code 0)
    Telemetry,
    /// Bulk object PUT over the named-storage transport (code 1)
    NamedStorage,
    /// Bulk object PUT over HTTP (code 2)
    HttpStorage,
    /// Unrecognized code
    Unknown(u32),
}

impl TransportMethod {
    /// Method reported for a channel that has no port configured
    pub const UNCONFIGURED: Self = Self::Unknown(u32::MAX);

    /// Map a configuration code to a method
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Telemetry,
            1 => Self::NamedStorage,
            2 => Self::HttpStorage,
            other => Self::Unknown(other),
        }
    }

    /// Configuration code of this method
    pub fn code(self) -> u32 {
        match self {
            Self::Telemetry => 0,
            Self::NamedStorage => 1,
            Self::HttpStorage => 2,
            Self::Unknown(code) => code,
        }
    }

    /// Bulk object upload (as opposed to telemetry)
    pub fn is_blob(self) -> bool {
        matches!(self, Self::NamedStorage | Self::HttpStorage)
    }
}

impl fmt::Display for TransportMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telemetry => f.write_str("telemetry"),
            Self::NamedStorage => f.write_str("named_storage"),
            Self::HttpStorage => f.write_str("http_storage"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// Subframe position of a chunked payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subframe {
    /// 1-based index of this chunk
    pub current: u32,
    /// Total number of chunks
    pub total: u32,
}

impl Subframe {
    pub fn new(current: u32, total: u32) -> Self {
        Self { current, total }
    }

    /// Whether the object name carries the `_<current>_of_<total>` suffix
    pub fn is_numbered(self) -> bool {
        self.current >= 2 && self.total > 1
    }
}
