//! Serialized Upload Demo
//!
//! Loads an export config (or uses a built-in one), writes objects through
//! the file transport one at a time, and prints the run summary.
//!
//! Run with: cargo run --bin serialized_upload [config.toml]

use std::sync::Arc;
use std::time::{Duration, Instant};

use config_loader::{ConfigLoader, SettingsStore};
use contracts::{ExportChannel, ExportSettings, Payload, PortSetting};
use data_export::{
    BackgroundPump, DataExport, ExportRequest, FileTransport, FileTransportConfig,
    SerializedExporter,
};
use observability::{ExportMetricsAggregator, LogFormat, ObservabilityConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // pump and writes show up at debug
    observability::init_with_config(
        ObservabilityConfig::default()
            .with_format(LogFormat::Compact)
            .with_engine_log_level("debug"),
    )?;

    let settings = if let Some(path) = std::env::args().nth(1) {
        tracing::info!(path = %path, "Loading export config");
        ConfigLoader::load_from_path(std::path::Path::new(&path))?
    } else {
        default_settings()
    };

    let output = std::env::temp_dir().join("edge-export-demo");
    let transport = Arc::new(FileTransport::new(
        "file",
        FileTransportConfig {
            base_path: output.clone(),
        },
    )?);
    let export = DataExport::builder(Arc::new(SettingsStore::new(settings)), transport).build()?;
    let pump = BackgroundPump::spawn(&export)?;
    let exporter = SerializedExporter::new(export.clone());

    let mut aggregator = ExportMetricsAggregator::new();
    for i in 0u64..10 {
        let (channel, payload) = if i % 2 == 0 {
            (ExportChannel::Raw, Payload::from_bytes(vec![i as u8; 4096]))
        } else {
            (
                ExportChannel::Metadata,
                Payload::from_bytes(format!("{{\"frame\":{i}}}")),
            )
        };
        // one frame every 33ms
        let timestamp_ns = 1_737_107_832_000_000_000 + i * 33_000_000;
        let bytes = payload.len();

        let started = Instant::now();
        let result = exporter.send(
            ExportRequest::new(channel, payload, timestamp_ns),
            Duration::from_secs(2),
        )?;
        aggregator.update(result, started.elapsed().as_secs_f64() * 1000.0, bytes);
    }

    pump.stop();
    export.shutdown(Duration::from_secs(1));
    tracing::info!(output = %output.display(), "Objects written");
    println!("{}", aggregator.summary());
    Ok(())
}

fn default_settings() -> ExportSettings {
    let mut settings = ExportSettings::default()
        .with_port(
            ExportChannel::Raw,
            PortSetting {
                method: 2,
                enabled: true,
                path: "frames".into(),
                endpoint: Some("http://localhost:8080".into()),
                storage_name: None,
            },
        )
        .with_port(
            ExportChannel::Metadata,
            PortSetting {
                method: 0,
                enabled: true,
                path: "meta".into(),
                endpoint: None,
                storage_name: None,
            },
        );
    settings.codec_settings.format = 2;
    settings
}
