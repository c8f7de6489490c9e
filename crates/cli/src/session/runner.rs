//! Session runner - builds the engine and pushes every input through it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use config_loader::SettingsStore;
use contracts::{ExportChannel, ExportResult, ExportSettings, Payload, Transport, TransportMethod};
use data_export::{
    BackgroundPump, DataExport, DataExportError, ExportRequest, FileTransport,
    FileTransportConfig, LogTransport, SerializedExporter, StateStore,
};
use observability::{record_export_latency_ms, record_export_result, record_pending_operations};
use tracing::{debug, info, warn};

use super::SessionStats;
use crate::cli::TransportArg;
use crate::error::{CliError, Result};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Loaded export settings
    pub settings: ExportSettings,

    /// Channel every input goes out on
    pub channel: ExportChannel,

    /// Files to export
    pub inputs: Vec<PathBuf>,

    /// Backend transport
    pub transport: TransportArg,

    /// Output directory (file transport)
    pub output: PathBuf,

    /// Use the submission serializer
    pub serialized: bool,

    /// Export every input this many times
    pub repeat: u32,

    /// Per-operation timeout, negative = forever
    pub timeout_ms: i64,

    /// Final drain budget
    pub drain: Duration,
}

/// One `send` run
pub struct ExportSession {
    config: SessionConfig,
}

impl ExportSession {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Run the session to completion (blocking)
    pub fn run(self) -> Result<SessionStats> {
        let start = Instant::now();
        let config = &self.config;

        for input in &config.inputs {
            if !input.is_file() {
                return Err(CliError::input_not_found(input.display().to_string()));
            }
        }
        warn_unknown_methods(&config.settings);

        let transport: Arc<dyn Transport> = match config.transport {
            TransportArg::File => Arc::new(FileTransport::new(
                "file",
                FileTransportConfig {
                    base_path: config.output.clone(),
                },
            )?),
            TransportArg::Log => Arc::new(LogTransport::new("log")),
        };
        let state = Arc::new(StateStore::new());
        let export = DataExport::builder(
            Arc::new(SettingsStore::new(config.settings.clone())),
            transport,
        )
        .reporter(state.clone())
        .build()
        .map_err(|e| CliError::export(e.to_string()))?;

        info!(
            transport = export.transport_name(),
            channel = %config.channel,
            inputs = config.inputs.len(),
            repeat = config.repeat,
            serialized = config.serialized,
            "Export session starting"
        );

        let pump = BackgroundPump::spawn(&export)?;
        let mut stats = SessionStats::default();
        if config.serialized {
            self.run_serialized(&export, &mut stats)?;
        } else {
            self.run_concurrent(&export, &mut stats)?;
        }
        pump.stop();

        stats.drain = export.shutdown(config.drain);
        stats.engine = export.metrics();
        stats.final_state = state.state();
        stats.duration = start.elapsed();
        record_pending_operations(export.pending_count());

        info!(
            attempted = stats.attempted,
            succeeded = stats.results.succeeded,
            abandoned = stats.drain.abandoned,
            "Export session finished"
        );
        Ok(stats)
    }

    fn run_serialized(&self, export: &DataExport, stats: &mut SessionStats) -> Result<()> {
        let exporter = SerializedExporter::new(export.clone());
        let timeout = u64::try_from(self.config.timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or(Duration::MAX);

        for (input, request) in self.requests()? {
            stats.attempted += 1;
            let bytes = request.payload.len();
            let started = Instant::now();

            let result = match exporter.send(request, timeout) {
                Ok(result) => result,
                Err(DataExportError::ChannelDisabled { channel }) => {
                    debug!(%channel, "Channel disabled, skipping");
                    stats.not_submitted += 1;
                    continue;
                }
                Err(DataExportError::CallbackTimeout { token }) => {
                    warn!(input = %input.display(), token = %token, "Completion timed out");
                    ExportResult::Timeout
                }
                Err(e @ DataExportError::TransportShutdown { .. }) => {
                    warn!(error = %e, "Transport shut down, stopping session");
                    self.record(stats, ExportResult::Failure, started, bytes);
                    break;
                }
                Err(e) => {
                    warn!(input = %input.display(), error = %e, "Send failed");
                    ExportResult::Failure
                }
            };
            self.record(stats, result, started, bytes);
        }
        Ok(())
    }

    fn run_concurrent(&self, export: &DataExport, stats: &mut SessionStats) -> Result<()> {
        let mut in_flight = Vec::new();
        for (input, request) in self.requests()? {
            stats.attempted += 1;
            let bytes = request.payload.len();
            let started = Instant::now();
            match export.submit(request) {
                Some(future) => in_flight.push((input, future, started, bytes)),
                None => stats.not_submitted += 1,
            }
        }
        record_pending_operations(export.pending_count());

        for (input, future, started, bytes) in in_flight {
            let result = future.wait_ms(self.config.timeout_ms);
            debug!(
                input = %input.display(),
                object = future.object_name().as_deref().unwrap_or_default(),
                result = %result,
                "Operation finished"
            );
            self.record(stats, result, started, bytes);
            future.cleanup();
        }
        Ok(())
    }

    fn record(&self, stats: &mut SessionStats, result: ExportResult, started: Instant, bytes: u64) {
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        record_export_result(self.config.channel, result);
        record_export_latency_ms(self.config.channel, latency_ms);
        stats.results.update(result, latency_ms, bytes);
    }

    /// Every (input, request) pair in submission order
    fn requests(&self) -> Result<Vec<(PathBuf, ExportRequest)>> {
        let mut requests = Vec::new();
        for _ in 0..self.config.repeat {
            for input in &self.config.inputs {
                let payload =
                    Payload::from_file(input).map_err(|e| CliError::export(e.to_string()))?;
                let request = ExportRequest::new(self.config.channel, payload, now_ns());
                requests.push((input.clone(), request));
            }
        }
        Ok(requests)
    }
}

fn warn_unknown_methods(settings: &ExportSettings) {
    for (channel, port) in settings.configured_ports() {
        if port.enabled && matches!(port.transport_method(), TransportMethod::Unknown(_)) {
            warn!(
                %channel,
                method = port.method,
                "Unknown transport method, exports on this channel will fail"
            );
        }
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
