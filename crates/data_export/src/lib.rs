//! # Data Export
//!
//! 异步数据导出引擎。
//!
//! 负责：
//! - 将 payload 提交到后端 transport，返回可等待的 `ExportFuture`
//! - 通过 correlation token 关联异步完成回调
//! - 回调与 cleanup 双方到齐后才释放传输资源
//! - 串行化同步发送（`SerializedExporter`）

pub mod engine;
pub mod error;
pub mod future;
pub mod metrics;
pub mod naming;
pub mod registry;
pub mod serializer;
pub mod state;
pub mod transports;

pub use contracts::{ExportChannel, ExportResult, Payload, Subframe, Transport};
pub use engine::{CONFIG_ERROR_TOPIC, DataExport, DataExportBuilder, DrainOutcome, ExportRequest};
pub use error::DataExportError;
pub use future::{ExportFuture, FutureObserver, Rendezvous};
pub use metrics::{ExportMetrics, ExportMetricsSnapshot};
pub use registry::Registry;
pub use serializer::{BackgroundPump, SerializedExporter};
pub use state::StateStore;
pub use transports::{
    FileTransport, FileTransportConfig, LogTransport, MockBehavior, MockTransport, RecordedRequest,
};

#[cfg(test)]
pub(crate) mod test_support;
