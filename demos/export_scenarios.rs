//! Export Scenarios Demo
//!
//! Walks the engine through its main lifecycles against the mock transport:
//! immediate completion, deferred completion, timeout with a late callback,
//! a disabled channel and a full registry.
//!
//! Run with: cargo run --bin export_scenarios

use std::sync::Arc;
use std::time::Duration;

use config_loader::SettingsStore;
use contracts::{
    CompletionReason, EngineSettings, ExportChannel, ExportSettings, Payload, PortSetting,
};
use data_export::{DataExport, ExportRequest, MockBehavior, MockTransport};
use observability::{LogFormat, ObservabilityConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_with_config(
        ObservabilityConfig::default().with_format(LogFormat::Compact),
    )?;

    tracing::info!("Starting Export Scenarios Demo");

    let store = Arc::new(SettingsStore::new(demo_settings()));
    let transport = Arc::new(MockTransport::new());
    let export = DataExport::builder(store.clone(), transport.clone()).build()?;

    // ==== A: transport completes inside dispatch ====
    let future = export
        .submit(frame())
        .ok_or("raw channel should be enabled")?;
    tracing::info!(result = %future.wait_ms(-1), object = ?future.object_name(), "A: immediate");
    future.cleanup();

    // ==== B: completion from a transport thread ====
    transport.set_behavior(MockBehavior::Deferred {
        reason: CompletionReason::Done,
        delay: Duration::from_millis(500),
    });
    let future = export
        .submit(frame())
        .ok_or("raw channel should be enabled")?;
    let result = future.wait_async(None).await;
    tracing::info!(result = %result, "B: deferred");
    future.cleanup();

    // ==== C: timeout, then the late completion ====
    transport.set_behavior(MockBehavior::Never);
    let future = export
        .submit(frame())
        .ok_or("raw channel should be enabled")?;
    let observer = future.observer();
    tracing::info!(result = %future.wait_ms(1), "C: bounded wait");
    future.cleanup();
    transport.complete_held(CompletionReason::Done);
    tracing::info!(
        result = %observer.result(),
        released = observer.is_released(),
        "C: late completion"
    );

    // ==== D: disabled channel ====
    let mut settings = store.snapshot();
    if let Some(port) = settings.port_settings.get_mut(ExportChannel::Raw) {
        port.enabled = false;
    }
    let previous = store.replace(settings);
    tracing::info!(submitted = export.submit(frame()).is_some(), "D: disabled channel");
    store.replace(previous);

    // ==== E: full registry ====
    let held: Vec<_> = (0..2).filter_map(|_| export.submit(frame())).collect();
    let denied = export
        .submit(frame())
        .ok_or("raw channel should be enabled")?;
    tracing::info!(
        pending = export.pending_count(),
        result = %denied.result(),
        "E: full registry"
    );
    transport.complete_held(CompletionReason::Done);
    drop(held);

    let outcome = export.shutdown(Duration::from_secs(1));
    tracing::info!(?outcome, metrics = ?export.metrics(), "Demo finished");
    Ok(())
}

fn demo_settings() -> ExportSettings {
    let mut settings = ExportSettings::default().with_port(
        ExportChannel::Raw,
        PortSetting {
            method: 1,
            enabled: true,
            path: "demo".into(),
            endpoint: None,
            storage_name: Some("edge-bucket".into()),
        },
    );
    settings.codec_settings.format = 1;
    settings.engine = EngineSettings {
        registry_capacity: 2,
        ..EngineSettings::default()
    };
    settings
}

fn frame() -> ExportRequest {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    ExportRequest::new(ExportChannel::Raw, Payload::from_bytes(vec![0u8; 1024]), now)
}
