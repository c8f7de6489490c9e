//! Configuration and state-reporting collaborators

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{EngineSettings, ExportChannel, TransportMethod};

/// Resolved destination of a channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destination {
    /// Remote path prefix
    pub base_path: String,
    /// HTTP endpoint (http storage)
    pub endpoint: Option<String>,
    /// Storage name (named storage)
    pub storage_name: Option<String>,
}

/// Configuration collaborator
///
/// Read on every submission, so implementations may change answers at
/// runtime.
pub trait ExportConfig: Send + Sync {
    /// Whether the channel is administratively enabled
    fn is_channel_enabled(&self, channel: ExportChannel) -> bool;

    /// Configured transport method
    fn resolve_transport_method(&self, channel: ExportChannel) -> TransportMethod;

    /// Configured destination
    fn resolve_destination(&self, channel: ExportChannel) -> Destination;

    /// Object name extension without the dot, if any
    fn file_extension(&self, channel: ExportChannel) -> Option<&'static str>;

    /// Engine tuning
    fn engine_settings(&self) -> EngineSettings;
}

/// Application lifecycle state the engine may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    #[default]
    Running,
    /// Transport asked to stop; finish what is in flight
    Draining,
    Idle,
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Idle => "idle",
        };
        f.write_str(s)
    }
}

/// State-reporting collaborator
pub trait StateReporter: Send + Sync {
    /// Publish a structured state document under `topic`
    fn report_state(&self, topic: &str, state: serde_json::Value);

    /// Ask the application to move to `next`
    fn request_transition(&self, next: ExportState);
}
