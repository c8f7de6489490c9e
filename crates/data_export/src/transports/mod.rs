//! Transport implementations
//!
//! Contains LogTransport, FileTransport, and MockTransport.

mod file;
mod log;
mod mock;

pub use self::file::{FileTransport, FileTransportConfig};
pub use self::log::LogTransport;
pub use self::mock::{MockBehavior, MockTransport, RecordedRequest};
