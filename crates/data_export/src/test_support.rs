//! Shared fixtures for unit tests

use std::sync::{Arc, Mutex};

use contracts::{
    Destination, EngineSettings, ExportChannel, ExportConfig, Payload, TransportMethod,
};

use crate::engine::{DataExport, ExportRequest};
use crate::state::StateStore;
use crate::transports::MockTransport;

// 2025-01-17T09:57:12.459Z
pub const TS_NS: u64 = 1_737_107_832_459_000_000;

/// Mutable in-memory config
pub struct TestConfig {
    pub raw_enabled: Mutex<bool>,
    pub metadata_enabled: Mutex<bool>,
    pub raw_method: Mutex<TransportMethod>,
    pub engine: Mutex<EngineSettings>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            raw_enabled: Mutex::new(true),
            metadata_enabled: Mutex::new(true),
            raw_method: Mutex::new(TransportMethod::HttpStorage),
            engine: Mutex::new(EngineSettings::default()),
        }
    }
}

impl ExportConfig for TestConfig {
    fn is_channel_enabled(&self, channel: ExportChannel) -> bool {
        match channel {
            ExportChannel::Raw => *self.raw_enabled.lock().unwrap(),
            ExportChannel::Metadata => *self.metadata_enabled.lock().unwrap(),
        }
    }

    fn resolve_transport_method(&self, channel: ExportChannel) -> TransportMethod {
        match channel {
            ExportChannel::Raw => *self.raw_method.lock().unwrap(),
            ExportChannel::Metadata => TransportMethod::Telemetry,
        }
    }

    fn resolve_destination(&self, _channel: ExportChannel) -> Destination {
        Destination {
            base_path: "images".into(),
            endpoint: Some("http://host:8080".into()),
            storage_name: Some("bucket".into()),
        }
    }

    fn file_extension(&self, channel: ExportChannel) -> Option<&'static str> {
        match channel {
            ExportChannel::Raw => Some("jpg"),
            ExportChannel::Metadata => Some("txt"),
        }
    }

    fn engine_settings(&self) -> EngineSettings {
        self.engine.lock().unwrap().clone()
    }
}

pub struct Fixture {
    pub export: DataExport,
    pub config: Arc<TestConfig>,
    pub transport: Arc<MockTransport>,
    pub state: Arc<StateStore>,
}

pub fn fixture() -> Fixture {
    fixture_with(TestConfig::default())
}

pub fn fixture_with(config: TestConfig) -> Fixture {
    let config = Arc::new(config);
    let transport = Arc::new(MockTransport::new());
    let state = Arc::new(StateStore::new());
    let export = DataExport::builder(config.clone(), transport.clone())
        .reporter(state.clone())
        .build()
        .unwrap();
    Fixture {
        export,
        config,
        transport,
        state,
    }
}

pub fn raw(bytes: &'static [u8]) -> ExportRequest {
    ExportRequest::new(ExportChannel::Raw, Payload::from_bytes(bytes), TS_NS)
}

pub fn metadata(text: &'static str) -> ExportRequest {
    ExportRequest::new(ExportChannel::Metadata, Payload::from_bytes(text), TS_NS)
}
