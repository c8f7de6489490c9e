//! Remote object naming
//!
//! `yyyyMMddHHmmssSSS` (UTC) of the capture timestamp, an optional
//! `_<current>_of_<total>` chunk suffix, then the codec extension.

use chrono::{DateTime, Utc};
use contracts::{Destination, Subframe, TransportMethod, TransportTarget};

/// Key telemetry entries are published under
pub const TELEMETRY_KEY: &str = "placeholder";

/// Format a nanosecond timestamp with millisecond resolution
pub fn format_timestamp(timestamp_ns: u64) -> String {
    let millis = timestamp_ns / 1_000_000;
    let secs = i64::try_from(millis / 1000).unwrap_or(i64::MAX);
    let nanos = ((millis % 1000) * 1_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        .format("%Y%m%d%H%M%S%3f")
        .to_string()
}

/// File name of an exported object
pub fn object_file_name(
    timestamp_ns: u64,
    subframe: Option<Subframe>,
    extension: Option<&str>,
) -> String {
    let mut name = format_timestamp(timestamp_ns);
    if let Some(sf) = subframe.filter(|sf| sf.is_numbered()) {
        name.push_str(&format!("_{}_of_{}", sf.current, sf.total));
    }
    if let Some(ext) = extension {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// Build the transport target for a resolved method
///
/// Returns `None` for an unknown method.
pub fn build_target(
    method: TransportMethod,
    destination: &Destination,
    file_name: &str,
) -> Option<TransportTarget> {
    let path = destination.base_path.as_str();
    match method {
        TransportMethod::HttpStorage => {
            let endpoint = destination.endpoint.as_deref().unwrap_or_default();
            Some(TransportTarget::Http {
                url: format!("{endpoint}/{path}/{file_name}"),
            })
        }
        TransportMethod::NamedStorage => Some(TransportTarget::NamedStorage {
            storage_name: destination.storage_name.clone(),
            remote_name: format!("{path}/{file_name}"),
        }),
        TransportMethod::Telemetry => Some(TransportTarget::Telemetry {
            key: TELEMETRY_KEY.to_string(),
        }),
        TransportMethod::Unknown(_) => None,
    }
}
