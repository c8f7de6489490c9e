//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置加载 -> 引擎 -> transport 全链路
//! - 端到端场景（立即完成、延迟完成、超时、通道关闭、关联表满）
//! - 并发提交与两方释放

#[cfg(test)]
mod support {
    use std::sync::Arc;

    use config_loader::{ConfigFormat, ConfigLoader, SettingsStore};
    use contracts::{ExportChannel, Payload};
    use data_export::{DataExport, ExportRequest, MockTransport, StateStore};

    pub const CONFIG: &str = r#"
[port_settings.input_tensor]
method = 2
enabled = true
path = "images"
endpoint = "http://localhost:8080"

[port_settings.metadata]
method = 0
enabled = true
path = "meta"

[codec_settings]
format = 1

[engine]
registry_capacity = 4
pump_timeout_ms = 20
"#;

    pub struct Harness {
        pub export: DataExport,
        pub store: Arc<SettingsStore>,
        pub transport: Arc<MockTransport>,
        pub state: Arc<StateStore>,
    }

    pub fn harness() -> Harness {
        let settings = ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap();
        let store = Arc::new(SettingsStore::new(settings));
        let transport = Arc::new(MockTransport::new());
        let state = Arc::new(StateStore::new());
        let export = DataExport::builder(store.clone(), transport.clone())
            .reporter(state.clone())
            .build()
            .unwrap();
        Harness {
            export,
            store,
            transport,
            state,
        }
    }

    pub fn frame(bytes: &'static [u8]) -> ExportRequest {
        // 2025-01-17T09:57:12.459Z
        ExportRequest::new(
            ExportChannel::Raw,
            Payload::from_bytes(bytes),
            1_737_107_832_459_000_000,
        )
    }

    pub fn inference(json: &'static str) -> ExportRequest {
        ExportRequest::new(
            ExportChannel::Metadata,
            Payload::from_bytes(json),
            1_737_107_832_459_000_000,
        )
    }
}

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = contracts::ConfigVersion::V1;
    }

    #[test]
    fn test_sample_config_round_trips() {
        let settings = ConfigLoader::load_from_str(super::support::CONFIG, ConfigFormat::Toml)
            .unwrap();
        let toml = ConfigLoader::to_toml(&settings).unwrap();
        let again = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(again.engine.registry_capacity, 4);
        assert_eq!(again.codec_settings.raw_extension(), Some("jpg"));
    }
}

#[cfg(test)]
mod scenario_tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use contracts::{CompletionReason, ExportChannel, ExportResult};
    use data_export::MockBehavior;

    use super::support::{frame, harness, inference};

    /// A: 立即完成，await 不阻塞
    #[test]
    fn test_scenario_a_immediate_success() {
        let h = harness();
        let future = h.export.submit(frame(b"jpeg")).unwrap();

        let started = Instant::now();
        assert_eq!(future.wait_ms(-1), ExportResult::Success);
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(
            future.object_name().as_deref(),
            Some("http://localhost:8080/images/20250117095712459.jpg")
        );
        future.cleanup();
        assert!(!h.export.has_pending_operations());
    }

    /// B: 后台线程 500ms 后回调，无限等待
    #[test]
    fn test_scenario_b_deferred_completion() {
        let h = harness();
        h.transport.set_behavior(MockBehavior::Deferred {
            reason: CompletionReason::Done,
            delay: Duration::from_millis(500),
        });

        let future = h.export.submit(inference("{\"objects\":[]}")).unwrap();
        assert_eq!(future.result(), ExportResult::Enqueued);

        let started = Instant::now();
        assert_eq!(future.wait_ms(-1), ExportResult::Success);
        assert!(started.elapsed() >= Duration::from_millis(400));
        future.cleanup();
    }

    /// C: 永不回调 -> Timeout；之后的真实回调不崩溃，cleanup 后释放
    #[test]
    fn test_scenario_c_timeout_then_late_callback() {
        let h = harness();
        h.transport.set_behavior(MockBehavior::Never);

        let future = h.export.submit(frame(b"jpeg")).unwrap();
        let observer = future.observer();
        assert_eq!(future.wait_ms(1), ExportResult::Timeout);
        assert_eq!(future.result(), ExportResult::Enqueued);

        future.cleanup();
        assert!(!observer.is_released());

        let late = {
            let transport = h.transport.clone();
            thread::spawn(move || transport.complete_held(CompletionReason::Done))
        };
        assert_eq!(late.join().unwrap(), 1);
        assert!(observer.is_released());
        assert_eq!(observer.result(), ExportResult::Success);
        assert!(!h.export.has_pending_operations());
    }

    /// D: 通道关闭 -> 无 future、无登记、无 dispatch
    #[test]
    fn test_scenario_d_disabled_channel() {
        let h = harness();
        let mut settings = h.store.snapshot();
        if let Some(port) = settings.port_settings.get_mut(ExportChannel::Raw) {
            port.enabled = false;
        }
        h.store.replace(settings);

        assert!(h.export.submit(frame(b"jpeg")).is_none());
        assert_eq!(h.export.pending_count(), 0);
        assert_eq!(h.transport.dispatch_count(), 0);
    }

    /// E: 关联表满 -> Denied，表大小不变
    #[test]
    fn test_scenario_e_registry_full() {
        let h = harness();
        h.transport.set_behavior(MockBehavior::Never);

        let held: Vec<_> = (0..4)
            .map(|_| h.export.submit(frame(b"x")).unwrap())
            .collect();
        assert_eq!(h.export.pending_count(), 4);

        let denied = h.export.submit(frame(b"y")).unwrap();
        assert_eq!(denied.result(), ExportResult::Denied);
        assert_eq!(h.export.pending_count(), 4);
        assert_eq!(h.transport.dispatch_count(), 4);

        h.transport.complete_held(CompletionReason::Done);
        assert!(held.iter().all(|f| f.result() == ExportResult::Success));
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use contracts::{CompletionReason, ExportResult, ExportState};
    use data_export::{
        BackgroundPump, DataExport, DataExportError, FileTransport, FileTransportConfig,
        MockBehavior, Rendezvous, SerializedExporter,
    };
    use tempfile::tempdir;

    use super::support::{frame, harness, inference};

    #[test]
    fn test_concurrent_submissions_distinct_tokens() {
        let h = harness();
        h.transport.set_behavior(MockBehavior::Never);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let export = h.export.clone();
                thread::spawn(move || export.submit(frame(b"x")).unwrap())
            })
            .collect();
        let futures: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();

        let mut tokens: Vec<_> = futures.iter().filter_map(|f| f.token()).collect();
        tokens.sort();
        tokens.dedup();
        assert_eq!(tokens.len(), 4);

        let recorded: Vec<_> = h.transport.requests().iter().map(|r| r.token).collect();
        assert_eq!(recorded.len(), 4);
        h.transport.complete_held(CompletionReason::Done);
    }

    #[test]
    fn test_release_requires_both_parties() {
        let h = harness();
        h.transport.set_behavior(MockBehavior::Never);

        // callback first
        let first = h.export.submit(frame(b"one")).unwrap();
        let first_obs = first.observer();
        h.transport.complete_held(CompletionReason::Done);
        assert_eq!(first_obs.rendezvous(), Rendezvous::CallbackOnly);
        assert!(!first_obs.is_released());
        drop(first);
        assert!(first_obs.is_released());

        // cleanup first
        let second = h.export.submit(frame(b"two")).unwrap();
        let second_obs = second.observer();
        second.cleanup();
        assert_eq!(second_obs.rendezvous(), Rendezvous::CleanupOnly);
        assert!(!second_obs.is_released());
        h.transport.complete_held(CompletionReason::Done);
        assert!(second_obs.is_released());

        assert_eq!(h.export.metrics().released, 2);
    }

    #[test]
    fn test_serialized_sends_from_many_threads() {
        let h = harness();
        h.transport.set_behavior(MockBehavior::Deferred {
            reason: CompletionReason::Done,
            delay: Duration::from_millis(5),
        });
        let exporter = SerializedExporter::new(h.export.clone());

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let exporter = exporter.clone();
                thread::spawn(move || {
                    let request = if i % 2 == 0 {
                        frame(b"frame")
                    } else {
                        inference("{}")
                    };
                    exporter.send(request, Duration::from_secs(5))
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), ExportResult::Success);
        }
        assert_eq!(h.transport.requests().len(), 6);
        assert!(!h.export.has_pending_operations());
    }

    #[test]
    fn test_serialized_send_times_out_without_callback() {
        let h = harness();
        h.transport.set_behavior(MockBehavior::Never);
        let exporter = SerializedExporter::new(h.export.clone());

        let err = exporter
            .send(frame(b"jpeg"), Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, DataExportError::CallbackTimeout { .. }));

        // the late completion still finds its registry entry
        assert_eq!(h.transport.complete_held(CompletionReason::Done), 1);
        assert_eq!(h.export.metrics().orphan_callbacks, 0);
        assert!(!h.export.has_pending_operations());
    }

    #[test]
    fn test_file_transport_end_to_end() {
        let dir = tempdir().unwrap();
        let settings = config_loader::ConfigLoader::load_from_str(
            super::support::CONFIG,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();
        let transport = Arc::new(
            FileTransport::new(
                "file",
                FileTransportConfig {
                    base_path: dir.path().to_path_buf(),
                },
            )
            .unwrap(),
        );
        let export = DataExport::builder(
            Arc::new(config_loader::SettingsStore::new(settings)),
            transport.clone(),
        )
        .build()
        .unwrap();
        let pump = BackgroundPump::spawn(&export).unwrap();

        let image = export.submit(frame(b"jpeg-bytes")).unwrap();
        let meta = export.submit(inference("{\"n\":1}")).unwrap();
        assert_eq!(image.wait(Some(Duration::from_secs(2))), ExportResult::Success);
        assert_eq!(meta.wait(Some(Duration::from_secs(2))), ExportResult::Success);

        let written = dir
            .path()
            .join("http/localhost:8080/images/20250117095712459.jpg");
        assert_eq!(std::fs::read(written).unwrap(), b"jpeg-bytes");
        assert!(dir.path().join("telemetry.jsonl").is_file());

        // shutdown from the backend stops the pump and drains
        transport.request_shutdown();
        let outcome = export.shutdown(Duration::from_millis(200));
        assert_eq!(outcome.abandoned, 0);
        pump.stop();
        drop((image, meta));
        assert_eq!(export.metrics().released, 2);
    }

    #[test]
    fn test_shutdown_abandons_and_requests_draining() {
        let h = harness();
        h.transport.set_behavior(MockBehavior::Never);
        let future = h.export.submit(frame(b"jpeg")).unwrap();

        h.transport.request_shutdown();
        let outcome = h.export.shutdown(Duration::from_secs(1));
        assert!(outcome.shutdown_requested);
        assert_eq!(outcome.abandoned, 1);
        assert_eq!(future.wait(None), ExportResult::Failure);
        assert_eq!(h.state.state(), ExportState::Draining);

        h.transport.complete_held(CompletionReason::Done);
        assert_eq!(h.export.metrics().orphan_callbacks, 1);
    }

    #[tokio::test]
    async fn test_async_wait_and_state_watch() {
        let h = harness();
        h.transport.set_behavior(MockBehavior::Deferred {
            reason: CompletionReason::Done,
            delay: Duration::from_millis(20),
        });
        let mut states = h.state.subscribe();

        let future = h.export.submit(frame(b"jpeg")).unwrap();
        assert_eq!(future.wait_async(None).await, ExportResult::Success);

        h.export.stop_self();
        states.changed().await.unwrap();
        assert_eq!(*states.borrow(), ExportState::Idle);
    }
}

#[cfg(test)]
mod metrics_tests {
    use contracts::{ExportChannel, ExportResult};
    use observability::ExportMetricsAggregator;

    use super::support::{frame, harness};

    #[test]
    fn test_engine_counters_feed_summary() {
        let h = harness();
        let mut aggregator = ExportMetricsAggregator::new();
        for _ in 0..3 {
            let future = h.export.submit(frame(b"jpeg")).unwrap();
            let result = future.wait(None);
            observability::record_export_result(ExportChannel::Raw, result);
            aggregator.update(result, 0.5, 4);
        }

        let snapshot = h.export.metrics();
        assert_eq!(snapshot.submitted, 3);
        assert_eq!(snapshot.succeeded, 3);
        assert_eq!(aggregator.summary().succeeded, 3);
        assert_eq!(
            aggregator.summary().result_counts,
            vec![(ExportResult::Success.as_str(), 3)]
        );
    }
}
