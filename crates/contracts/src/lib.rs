//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Timestamps are Unix time in nanoseconds (u64), as delivered by the sensor
//! - Object names are derived from them in UTC with millisecond resolution

mod channel;
mod config;
mod error;
mod payload;
mod result;
mod settings;
mod transport;

pub use channel::*;
pub use config::*;
pub use error::*;
pub use payload::{Payload, PayloadReader};
pub use result::*;
pub use settings::*;
pub use transport::*;
