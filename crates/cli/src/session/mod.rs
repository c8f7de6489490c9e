//! Export session: one `send` run against a freshly built engine.

mod runner;
mod stats;

pub use runner::{ExportSession, SessionConfig};
pub use stats::SessionStats;
