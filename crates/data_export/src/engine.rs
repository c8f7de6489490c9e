//! DataExport - submission path and completion handling

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use contracts::{
    CompletionCallback, CompletionReason, CorrelationToken, ExportChannel, ExportConfig,
    ExportResult, ExportState, Payload, PumpStatus, StateReporter, Subframe, Transport,
    TransportRequest,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::error::DataExportError;
use crate::future::{ExportFuture, FutureShared, TransportState};
use crate::metrics::{ExportMetrics, ExportMetricsSnapshot};
use crate::naming;
use crate::registry::Registry;
use crate::serializer::{GatePermit, SubmissionGate};
use crate::state::StateStore;

/// Topic configuration errors are reported under
pub const CONFIG_ERROR_TOPIC: &str = "custom_settings";

/// Response code for an invalid argument
const RESPONSE_CODE_INVALID_ARGUMENT: u32 = 3;

/// A single export submission
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub channel: ExportChannel,
    pub payload: Payload,
    /// Capture time, Unix nanoseconds
    pub timestamp_ns: u64,
    /// Chunk position for divided input tensors
    pub subframe: Option<Subframe>,
}

impl ExportRequest {
    pub fn new(channel: ExportChannel, payload: Payload, timestamp_ns: u64) -> Self {
        Self {
            channel,
            payload,
            timestamp_ns,
            subframe: None,
        }
    }

    pub fn with_subframe(mut self, subframe: Subframe) -> Self {
        self.subframe = Some(subframe);
        self
    }
}

/// Outcome of [`DataExport::shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainOutcome {
    /// Operations still pending at the deadline, finalized as `Failure`
    pub abandoned: usize,
    /// Transport asked to stop while draining
    pub shutdown_requested: bool,
}

/// State shared by every handle of one engine
pub(crate) struct ExportCore {
    pub(crate) config: Arc<dyn ExportConfig>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) reporter: Arc<dyn StateReporter>,
    pub(crate) registry: Registry<Arc<FutureShared>>,
    pub(crate) gate: SubmissionGate,
    pub(crate) metrics: Arc<ExportMetrics>,
}

impl ExportCore {
    /// Submission path
    ///
    /// `permit` is set by the serializer; the token is bound to its callback
    /// slot right before dispatch.
    pub(crate) fn submit(
        self: &Arc<Self>,
        request: ExportRequest,
        permit: Option<&GatePermit<'_>>,
    ) -> Option<ExportFuture> {
        let ExportRequest {
            channel,
            payload,
            timestamp_ns,
            subframe,
        } = request;

        if !self.config.is_channel_enabled(channel) {
            debug!(%channel, "Channel disabled, nothing submitted");
            self.metrics.inc_not_submitted();
            return None;
        }
        self.metrics.inc_submitted();

        let engine = self.config.engine_settings();
        if payload.len() > engine.max_payload_bytes {
            warn!(
                %channel,
                len = payload.len(),
                max = engine.max_payload_bytes,
                "Rejecting oversized payload"
            );
            return Some(self.reject(payload, ExportResult::DataTooLarge));
        }

        let shared = FutureShared::new(Arc::clone(&self.metrics));
        let token = self.registry.issue_token();
        if let Err(e) = self.registry.insert(token, Arc::clone(&shared)) {
            warn!(%channel, token = %token, error = %e, "Cannot track operation");
            return Some(self.reject(payload, ExportResult::Denied));
        }
        shared.set_enqueued();

        let method = self.config.resolve_transport_method(channel);
        let destination = self.config.resolve_destination(channel);
        let file_name = naming::object_file_name(
            timestamp_ns,
            subframe,
            self.config.file_extension(channel),
        );
        let Some(target) = naming::build_target(method, &destination, &file_name) else {
            error!(%channel, %method, "An invalid argument was specified.");
            self.registry.remove(token);
            shared.attach(TransportState {
                payload,
                object_name: file_name,
                method: None,
            });
            shared.finalize(ExportResult::Failure);
            self.report_invalid_argument();
            return Some(ExportFuture::new(shared, Some(token)));
        };

        let transport_request = TransportRequest {
            channel,
            method,
            target,
            payload: payload.reader(),
        };
        shared.attach(TransportState {
            payload,
            object_name: transport_request.target.describe().to_string(),
            method: Some(method),
        });

        if let Some(permit) = permit {
            permit.bind(token);
        }
        debug!(
            %channel,
            %method,
            token = %token,
            target = transport_request.target.describe(),
            "Dispatching export"
        );
        match self
            .transport
            .dispatch(transport_request, token, self.completion_callback())
        {
            Ok(()) => self.metrics.inc_dispatched(),
            Err(e) => {
                error!(token = %token, error = %e, "Dispatch failed");
                if self.registry.remove(token).is_some() {
                    shared.finalize(ExportResult::Failure);
                } else {
                    warn!(token = %token, "Transport completed an operation it refused");
                }
            }
        }

        Some(ExportFuture::new(shared, Some(token)))
    }

    /// Completion callback entry point
    pub(crate) fn on_complete(&self, token: CorrelationToken, reason: CompletionReason) {
        match self.registry.remove(token) {
            Some(shared) => {
                shared.complete(token, reason);
            }
            None => {
                self.metrics.inc_orphan_callbacks();
                warn!(
                    token = %token,
                    ?reason,
                    "State might be corrupted: completion for an operation not in the registry"
                );
            }
        }
        self.gate.callback_observed(token);
    }

    fn completion_callback(self: &Arc<Self>) -> CompletionCallback {
        let core: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |token, reason| match core.upgrade() {
            Some(core) => core.on_complete(token, reason),
            None => warn!(token = %token, ?reason, "Completion after engine was dropped"),
        })
    }

    /// Pre-processed terminal future, never registered
    fn reject(&self, payload: Payload, result: ExportResult) -> ExportFuture {
        let shared = FutureShared::new(Arc::clone(&self.metrics));
        shared.attach(TransportState {
            payload,
            object_name: String::new(),
            method: None,
        });
        shared.finalize(result);
        ExportFuture::new(shared, None)
    }

    fn report_invalid_argument(&self) {
        let state = json!({
            "res_info": {
                "res_id": "",
                "code": RESPONSE_CODE_INVALID_ARGUMENT,
                "detail_msg": "An invalid argument was specified."
            }
        });
        self.reporter.report_state(CONFIG_ERROR_TOPIC, state);
    }

    /// Drive the transport once; the caller holds the operation slot
    pub(crate) fn pump_once(&self, timeout: Duration) -> PumpStatus {
        let status = self.transport.pump_events(timeout);
        if status == PumpStatus::ShutdownRequested {
            info!(transport = self.transport.name(), "Transport requested shutdown");
            self.reporter.request_transition(ExportState::Draining);
        }
        status
    }

    pub(crate) fn pump_timeout(&self) -> Duration {
        Duration::from_millis(self.config.engine_settings().pump_timeout_ms)
    }
}

/// Builder for creating a DataExport
pub struct DataExportBuilder {
    config: Arc<dyn ExportConfig>,
    transport: Arc<dyn Transport>,
    reporter: Option<Arc<dyn StateReporter>>,
    metrics: Option<Arc<ExportMetrics>>,
}

impl DataExportBuilder {
    pub fn new(config: Arc<dyn ExportConfig>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            reporter: None,
            metrics: None,
        }
    }

    /// State reporter (defaults to a fresh [`StateStore`])
    pub fn reporter(mut self, reporter: Arc<dyn StateReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Share an existing metrics instance
    pub fn metrics(mut self, metrics: Arc<ExportMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the engine
    ///
    /// # Errors
    /// Registry capacity of zero
    #[instrument(name = "data_export_build", skip(self))]
    pub fn build(self) -> Result<DataExport, DataExportError> {
        let engine = self.config.engine_settings();
        if engine.registry_capacity == 0 {
            return Err(contracts::ContractError::config_validation(
                "engine.registry_capacity",
                "registry capacity must be > 0",
            )
            .into());
        }

        let core = ExportCore {
            config: self.config,
            transport: self.transport,
            reporter: self
                .reporter
                .unwrap_or_else(|| Arc::new(StateStore::new())),
            registry: Registry::new(engine.registry_capacity),
            gate: SubmissionGate::new(),
            metrics: self.metrics.unwrap_or_default(),
        };
        info!(
            transport = core.transport.name(),
            capacity = engine.registry_capacity,
            "Data export engine ready"
        );
        Ok(DataExport {
            core: Arc::new(core),
        })
    }
}

/// Handle to an export engine
///
/// Cheap to clone; all clones share the registry, the serializer and the
/// collaborators.
#[derive(Clone)]
pub struct DataExport {
    pub(crate) core: Arc<ExportCore>,
}

impl DataExport {
    pub fn builder(
        config: Arc<dyn ExportConfig>,
        transport: Arc<dyn Transport>,
    ) -> DataExportBuilder {
        DataExportBuilder::new(config, transport)
    }

    /// Submit a payload for export
    ///
    /// Returns `None` when the channel is disabled. Any returned future must
    /// be cleaned up (or dropped) by the caller, including pre-failed ones.
    #[instrument(
        name = "data_export_submit",
        skip(self, request),
        fields(channel = %request.channel, len = request.payload.len())
    )]
    pub fn submit(&self, request: ExportRequest) -> Option<ExportFuture> {
        self.core.submit(request, None)
    }

    /// Whether any operation is still waiting for its completion
    pub fn has_pending_operations(&self) -> bool {
        !self.core.registry.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.core.registry.len()
    }

    /// Publish a state document through the reporter
    pub fn send_state(&self, topic: &str, state: Value) {
        debug!(topic, "Sending state");
        self.core.reporter.report_state(topic, state);
    }

    /// Ask the application to go idle
    pub fn stop_self(&self) {
        info!("Setting state to idle");
        self.core.reporter.request_transition(ExportState::Idle);
    }

    pub fn metrics(&self) -> ExportMetricsSnapshot {
        self.core.metrics.snapshot()
    }

    pub fn transport_name(&self) -> &str {
        self.core.transport.name()
    }

    /// Drain pending operations by pumping the transport
    ///
    /// Anything still pending at the deadline is dropped from the registry
    /// and finalized as `Failure`; its late completion is ignored.
    #[instrument(name = "data_export_shutdown", skip(self))]
    pub fn shutdown(&self, timeout: Duration) -> DrainOutcome {
        let deadline = Instant::now().checked_add(timeout);
        let mut outcome = DrainOutcome::default();

        while let Some(token) = self.core.registry.peek() {
            let remaining = match deadline {
                Some(d) => d.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                break;
            }
            debug!(token = %token, pending = self.pending_count(), "Waiting for pending operation");

            let Some(_slot) = self.core.gate.acquire_pump(deadline) else {
                break;
            };
            let status = self
                .core
                .pump_once(self.core.pump_timeout().min(remaining));
            if status == PumpStatus::ShutdownRequested {
                outcome.shutdown_requested = true;
                break;
            }
        }

        let dropped = self.core.registry.clear();
        outcome.abandoned = dropped.len();
        for shared in dropped {
            shared.finalize(ExportResult::Failure);
        }
        if outcome.abandoned > 0 {
            warn!(abandoned = outcome.abandoned, "Pending operations abandoned at shutdown");
        } else {
            info!("All export operations drained");
        }
        outcome
    }
}

impl std::fmt::Debug for DataExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataExport")
            .field("transport", &self.core.transport.name())
            .field("pending", &self.pending_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture, fixture_with, metadata, raw, TestConfig};
    use crate::transports::MockBehavior;
    use contracts::{EngineSettings, TransportMethod, TransportTarget};

    #[test]
    fn test_synchronous_completion() {
        let fx = fixture();
        let future = fx.export.submit(raw(b"jpeg")).unwrap();

        assert_eq!(future.result(), ExportResult::Success);
        assert_eq!(future.wait(Some(Duration::ZERO)), ExportResult::Success);
        assert_eq!(
            future.object_name().as_deref(),
            Some("http://host:8080/images/20250117095712459.jpg")
        );
        assert!(!fx.export.has_pending_operations());

        let observer = future.observer();
        future.cleanup();
        assert!(observer.is_released());

        let recorded = fx.transport.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].payload, b"jpeg");
        assert_eq!(recorded[0].method, TransportMethod::HttpStorage);
    }

    #[test]
    fn test_disabled_channel_submits_nothing() {
        let fx = fixture();
        *fx.config.raw_enabled.lock().unwrap() = false;

        assert!(fx.export.submit(raw(b"jpeg")).is_none());
        assert_eq!(fx.transport.dispatch_count(), 0);
        assert_eq!(fx.export.metrics().not_submitted, 1);
        assert_eq!(fx.export.metrics().submitted, 0);
    }

    #[test]
    fn test_unpositioned_subframe_dispatches_plain_name() {
        let fx = fixture();

        let future = fx
            .export
            .submit(raw(b"meta-only").with_subframe(Subframe::new(0, 0)))
            .unwrap();
        assert_eq!(future.result(), ExportResult::Success);
        assert_eq!(
            future.object_name().as_deref(),
            Some("http://host:8080/images/20250117095712459.jpg")
        );

        let empty = fx.export.submit(raw(b"")).unwrap();
        assert_eq!(empty.result(), ExportResult::Success);
        assert!(empty.token().is_some());

        assert_eq!(fx.transport.dispatch_count(), 2);
        assert!(fx.transport.requests()[1].payload.is_empty());
        assert_eq!(fx.export.metrics().rejected, 0);
    }

    #[test]
    fn test_oversized_payload() {
        let config = TestConfig::default();
        config.engine.lock().unwrap().max_payload_bytes = 4;
        let fx = fixture_with(config);

        let future = fx.export.submit(raw(b"12345")).unwrap();
        assert_eq!(future.result(), ExportResult::DataTooLarge);
        assert_eq!(fx.transport.dispatch_count(), 0);

        let at_limit = fx.export.submit(raw(b"1234")).unwrap();
        assert_eq!(at_limit.result(), ExportResult::Success);
    }

    #[test]
    fn test_numbered_subframe_in_object_name() {
        let fx = fixture();
        let future = fx
            .export
            .submit(raw(b"chunk").with_subframe(Subframe::new(2, 3)))
            .unwrap();
        assert_eq!(
            future.object_name().as_deref(),
            Some("http://host:8080/images/20250117095712459_2_of_3.jpg")
        );
    }

    #[test]
    fn test_full_registry_denies() {
        let config = TestConfig::default();
        config.engine.lock().unwrap().registry_capacity = 1;
        let fx = fixture_with(config);
        fx.transport.set_behavior(MockBehavior::Never);

        let first = fx.export.submit(raw(b"a")).unwrap();
        assert_eq!(first.result(), ExportResult::Enqueued);
        let second = fx.export.submit(raw(b"b")).unwrap();
        assert_eq!(second.result(), ExportResult::Denied);
        assert_eq!(second.token(), None);
        assert_eq!(fx.export.pending_count(), 1);
        assert_eq!(fx.transport.dispatch_count(), 1);

        fx.transport.complete_held(CompletionReason::Done);
        assert_eq!(first.wait(None), ExportResult::Success);
        let third = fx.export.submit(raw(b"c")).unwrap();
        assert_eq!(third.result(), ExportResult::Enqueued);
    }

    #[test]
    fn test_unknown_method_reports_invalid_argument() {
        let fx = fixture();
        *fx.config.raw_method.lock().unwrap() = TransportMethod::Unknown(7);

        let future = fx.export.submit(raw(b"jpeg")).unwrap();
        assert_eq!(future.result(), ExportResult::Failure);
        assert!(future.token().is_some());
        assert!(!fx.export.has_pending_operations());
        assert_eq!(fx.transport.dispatch_count(), 0);

        let report = fx.state.topic(CONFIG_ERROR_TOPIC).unwrap();
        assert_eq!(report["res_info"]["code"], 3);
        assert_eq!(
            report["res_info"]["detail_msg"],
            "An invalid argument was specified."
        );
    }

    #[test]
    fn test_dispatch_failure() {
        let fx = fixture();
        fx.transport.set_behavior(MockBehavior::Fail);

        let future = fx.export.submit(raw(b"jpeg")).unwrap();
        assert_eq!(future.result(), ExportResult::Failure);
        assert!(!fx.export.has_pending_operations());
        assert_eq!(fx.export.metrics().dispatched, 0);
    }

    #[test]
    fn test_telemetry_denied() {
        let fx = fixture();
        fx.transport
            .set_behavior(MockBehavior::Complete(CompletionReason::Denied));

        let future = fx.export.submit(metadata("{\"speed\":1}")).unwrap();
        assert_eq!(future.result(), ExportResult::Denied);
        let recorded = fx.transport.requests();
        assert_eq!(
            recorded[0].target,
            TransportTarget::Telemetry {
                key: naming::TELEMETRY_KEY.into()
            }
        );
    }

    #[test]
    fn test_deferred_completion_after_cleanup() {
        let fx = fixture();
        fx.transport.set_behavior(MockBehavior::Never);

        let future = fx.export.submit(raw(b"jpeg")).unwrap();
        let observer = future.observer();
        future.cleanup();
        assert!(!observer.is_released());
        assert_eq!(observer.held_bytes(), Some(4));

        fx.transport.complete_held(CompletionReason::Done);
        assert!(observer.is_released());
        assert_eq!(observer.result(), ExportResult::Success);
        assert_eq!(fx.export.metrics().released, 1);
    }

    #[test]
    fn test_orphan_completion_after_shutdown() {
        let fx = fixture();
        fx.transport.set_behavior(MockBehavior::Never);

        let future = fx.export.submit(raw(b"jpeg")).unwrap();
        let outcome = fx.export.shutdown(Duration::ZERO);
        assert_eq!(outcome.abandoned, 1);
        assert_eq!(future.result(), ExportResult::Failure);

        // late completion is dropped, the future keeps its result
        fx.transport.complete_held(CompletionReason::Done);
        assert_eq!(future.result(), ExportResult::Failure);
        assert_eq!(fx.export.metrics().orphan_callbacks, 1);
    }

    #[test]
    fn test_shutdown_drains_queued_completions() {
        let fx = fixture();
        fx.transport
            .set_behavior(MockBehavior::Queued(CompletionReason::Done));

        let a = fx.export.submit(raw(b"a")).unwrap();
        let b = fx.export.submit(metadata("{}")).unwrap();
        assert_eq!(fx.export.pending_count(), 2);

        let outcome = fx.export.shutdown(Duration::from_secs(2));
        assert_eq!(outcome, DrainOutcome::default());
        assert_eq!(a.result(), ExportResult::Success);
        assert_eq!(b.result(), ExportResult::Success);
    }

    #[test]
    fn test_shutdown_request_moves_to_draining() {
        let fx = fixture();
        fx.transport.set_behavior(MockBehavior::Never);
        let future = fx.export.submit(raw(b"a")).unwrap();
        fx.transport.request_shutdown();

        let outcome = fx.export.shutdown(Duration::from_secs(2));
        assert!(outcome.shutdown_requested);
        assert_eq!(outcome.abandoned, 1);
        assert_eq!(future.result(), ExportResult::Failure);
        assert_eq!(fx.state.transitions(), vec![ExportState::Draining]);
    }

    #[test]
    fn test_stop_self_and_send_state() {
        let fx = fixture();
        fx.export.stop_self();
        fx.export.send_state("status", json!({"ok": true}));

        assert_eq!(fx.state.state(), ExportState::Idle);
        assert_eq!(fx.state.topic("status"), Some(json!({"ok": true})));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = TestConfig::default();
        *config.engine.lock().unwrap() = EngineSettings {
            registry_capacity: 0,
            ..EngineSettings::default()
        };
        let result = DataExport::builder(Arc::new(config), Arc::new(crate::MockTransport::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_concurrent_submissions_get_distinct_tokens() {
        let fx = fixture();
        fx.transport.set_behavior(MockBehavior::Never);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let export = fx.export.clone();
                std::thread::spawn(move || export.submit(raw(b"x")).unwrap())
            })
            .collect();
        let futures: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut tokens: Vec<_> = futures.iter().filter_map(ExportFuture::token).collect();
        tokens.sort();
        tokens.dedup();
        assert_eq!(tokens.len(), 8);
        assert_eq!(fx.export.pending_count(), 8);

        assert_eq!(fx.transport.complete_held(CompletionReason::Done), 8);
        assert!(futures.iter().all(|f| f.result() == ExportResult::Success));
        assert!(!fx.export.has_pending_operations());
    }
}
