//! Submission serializer
//!
//! The transport's event pump is single-threaded. The gate admits one
//! submission (or pump driver) at a time into the operation slot, and one
//! outstanding completion into the callback slot.
//!
//! ```text
//! send:  acquire ─► submit/bind ─► pump once ─► release op ─► wait callback ─► wait future
//!                                                    │
//! pump:  (background) ◄── op slot free ──────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{CorrelationToken, ExportResult, PumpStatus};
use tracing::{debug, info, instrument, warn};

use crate::engine::{DataExport, ExportCore, ExportRequest};
use crate::error::DataExportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackSlot {
    Free,
    /// Held by a submission that has not dispatched yet
    Reserved,
    Outstanding(CorrelationToken),
}

#[derive(Debug)]
struct GateState {
    operation_in_progress: bool,
    callback: CallbackSlot,
}

/// Operation slot + callback slot behind one mutex/condvar pair
pub(crate) struct SubmissionGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl SubmissionGate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                operation_in_progress: false,
                callback: CallbackSlot::Free,
            }),
            changed: Condvar::new(),
        }
    }

    /// Take both slots, waiting until `deadline` (`None` = forever)
    pub(crate) fn acquire(&self, deadline: Option<Instant>) -> Option<GatePermit<'_>> {
        let mut state = self.wait_until(deadline, |s| {
            !s.operation_in_progress && s.callback == CallbackSlot::Free
        })?;
        state.operation_in_progress = true;
        state.callback = CallbackSlot::Reserved;
        Some(GatePermit {
            gate: self,
            holds_operation: AtomicBool::new(true),
            claim: Mutex::new(Claim::Reserved),
        })
    }

    /// Take the operation slot only, for pumping
    pub(crate) fn acquire_pump(&self, deadline: Option<Instant>) -> Option<PumpSlot<'_>> {
        let mut state = self.wait_until(deadline, |s| !s.operation_in_progress)?;
        state.operation_in_progress = true;
        Some(PumpSlot { gate: self })
    }

    /// Take the operation slot if nobody holds it
    pub(crate) fn try_acquire_pump(&self) -> Option<PumpSlot<'_>> {
        let mut state = self.lock();
        if state.operation_in_progress {
            return None;
        }
        state.operation_in_progress = true;
        Some(PumpSlot { gate: self })
    }

    /// A completion for `token` arrived; idempotent
    pub(crate) fn callback_observed(&self, token: CorrelationToken) {
        let mut state = self.lock();
        if state.callback == CallbackSlot::Outstanding(token) {
            state.callback = CallbackSlot::Free;
            self.changed.notify_all();
        }
    }

    fn release_operation(&self) {
        let mut state = self.lock();
        state.operation_in_progress = false;
        self.changed.notify_all();
    }

    fn wait_until(
        &self,
        deadline: Option<Instant>,
        ready: impl Fn(&GateState) -> bool,
    ) -> Option<MutexGuard<'_, GateState>> {
        let mut state = self.lock();
        while !ready(&state) {
            match deadline {
                None => {
                    state = self
                        .changed
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let (guard, _) = self
                        .changed
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                }
            }
        }
        Some(state)
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What a permit still owns of the callback slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Reserved,
    Bound(CorrelationToken),
    Released,
}

impl Claim {
    fn slot(self) -> Option<CallbackSlot> {
        match self {
            Claim::Reserved => Some(CallbackSlot::Reserved),
            Claim::Bound(token) => Some(CallbackSlot::Outstanding(token)),
            Claim::Released => None,
        }
    }
}

/// RAII hold on both slots
///
/// Dropping releases the operation slot and a callback slot that was never
/// bound to a token. A bound slot stays until its completion is observed or
/// [`clear_callback`](Self::clear_callback) force-clears it. A permit only
/// ever touches the callback slot while the slot still carries its own claim;
/// once the next send has reserved it, this permit leaves it alone.
pub(crate) struct GatePermit<'a> {
    gate: &'a SubmissionGate,
    holds_operation: AtomicBool,
    claim: Mutex<Claim>,
}

impl GatePermit<'_> {
    /// Tie the callback slot to the operation about to be dispatched
    pub(crate) fn bind(&self, token: CorrelationToken) {
        let mut claim = self.lock_claim();
        if *claim != Claim::Reserved {
            return;
        }
        let mut state = self.gate.lock();
        if state.callback == CallbackSlot::Reserved {
            state.callback = CallbackSlot::Outstanding(token);
            *claim = Claim::Bound(token);
        }
    }

    /// Let the next submission in while our completion is still outstanding
    pub(crate) fn release_operation(&self) {
        if self.holds_operation.swap(false, Ordering::AcqRel) {
            self.gate.release_operation();
        }
    }

    /// Wait for the bound completion; false on deadline
    pub(crate) fn wait_callback(&self, token: CorrelationToken, deadline: Option<Instant>) -> bool {
        self.gate
            .wait_until(deadline, |s| s.callback != CallbackSlot::Outstanding(token))
            .is_some()
    }

    /// Force our own callback claim free
    pub(crate) fn clear_callback(&self) {
        let mut claim = self.lock_claim();
        let owned = claim.slot();
        *claim = Claim::Released;
        let mut state = self.gate.lock();
        if owned == Some(state.callback) {
            state.callback = CallbackSlot::Free;
            self.gate.changed.notify_all();
        }
    }

    fn lock_claim(&self) -> MutexGuard<'_, Claim> {
        self.claim.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        let claim = *self.lock_claim();
        let mut state = self.gate.lock();
        // never dispatched
        if claim == Claim::Reserved && state.callback == CallbackSlot::Reserved {
            state.callback = CallbackSlot::Free;
        }
        if self.holds_operation.swap(false, Ordering::AcqRel) {
            state.operation_in_progress = false;
        }
        self.gate.changed.notify_all();
    }
}

/// RAII hold on the operation slot
pub(crate) struct PumpSlot<'a> {
    gate: &'a SubmissionGate,
}

impl Drop for PumpSlot<'_> {
    fn drop(&mut self) {
        self.gate.release_operation();
    }
}

/// One-at-a-time exporter
///
/// Every `send` owns the transport pump while it dispatches and waits for its
/// own completion before the next `send` may dispatch.
#[derive(Clone)]
pub struct SerializedExporter {
    export: DataExport,
}

impl SerializedExporter {
    pub fn new(export: DataExport) -> Self {
        Self { export }
    }

    pub fn export(&self) -> &DataExport {
        &self.export
    }

    /// Submit, pump and wait, all bounded by `timeout`
    ///
    /// Returns the terminal result of the operation. Errors describe why the
    /// result could not be observed.
    ///
    /// # Errors
    /// - `SerializerTimeout`: another send held the gate past the deadline
    /// - `ChannelDisabled`: nothing was submitted
    /// - `TransportShutdown`: the pump asked to stop
    /// - `CallbackTimeout`: the completion did not arrive in time
    #[instrument(
        name = "serialized_send",
        skip(self, request),
        fields(channel = %request.channel)
    )]
    pub fn send(
        &self,
        request: ExportRequest,
        timeout: Duration,
    ) -> Result<ExportResult, DataExportError> {
        let core: &Arc<ExportCore> = &self.export.core;
        let deadline = Instant::now().checked_add(timeout);

        let permit = core
            .gate
            .acquire(deadline)
            .ok_or(DataExportError::SerializerTimeout { waited: timeout })?;

        let channel = request.channel;
        let Some(future) = core.submit(request, Some(&permit)) else {
            return Err(DataExportError::ChannelDisabled { channel });
        };

        let result = future.result();
        if result.is_terminal() {
            // refused before or during dispatch, or completed synchronously
            permit.clear_callback();
            future.cleanup();
            return Ok(result);
        }

        if core.pump_once(core.pump_timeout()) == PumpStatus::ShutdownRequested {
            permit.clear_callback();
            drop(permit);
            future.cleanup();
            return Err(DataExportError::transport_shutdown(core.transport.name()));
        }
        permit.release_operation();

        let Some(token) = future.token() else {
            permit.clear_callback();
            return Ok(future.result());
        };
        if !permit.wait_callback(token, deadline) {
            warn!(token = %token, ?timeout, "Completion not observed, clearing callback slot");
            permit.clear_callback();
            core.metrics.inc_timeouts();
            future.cleanup();
            return Err(DataExportError::CallbackTimeout { token });
        }
        drop(permit);

        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        let result = future.wait(remaining);
        future.cleanup();
        debug!(token = %token, result = %result, "Serialized send finished");
        Ok(result)
    }
}

/// Drives `pump_events` while no submission holds the operation slot
///
/// Stops on [`stop`](Self::stop), on drop, or when the transport requests
/// shutdown.
pub struct BackgroundPump {
    stop: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    fn is_set(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self) {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_all();
    }

    /// Sleep up to `timeout`, returning early when stopped
    fn sleep(&self, timeout: Duration) {
        let guard = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        if *guard {
            return;
        }
        let _ = self
            .cond
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Back-off after an idle pump or a busy slot
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

impl BackgroundPump {
    /// Spawn the pump thread
    ///
    /// # Errors
    /// Thread spawn failure
    pub fn spawn(export: &DataExport) -> std::io::Result<Self> {
        let stop = Arc::new(StopSignal::default());
        let core = Arc::clone(&export.core);
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("export-pump".into())
            .spawn(move || pump_loop(&core, &thread_stop))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Whether the pump thread has exited
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop and join the pump thread
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.set();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Pump thread panicked");
            }
        }
    }
}

impl Drop for BackgroundPump {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn pump_loop(core: &ExportCore, stop: &StopSignal) {
    info!(transport = core.transport.name(), "Background pump started");
    while !stop.is_set() {
        let Some(slot) = core.gate.try_acquire_pump() else {
            stop.sleep(IDLE_BACKOFF);
            continue;
        };
        let status = core.pump_once(core.pump_timeout());
        drop(slot);

        match status {
            PumpStatus::ShutdownRequested => break,
            PumpStatus::Delivered(n) => debug!(delivered = n, "Pumped completions"),
            PumpStatus::Idle => stop.sleep(IDLE_BACKOFF),
        }
    }
    info!("Background pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(sequence: u64) -> CorrelationToken {
        CorrelationToken::new(0, sequence)
    }

    #[test]
    fn test_second_acquire_waits_for_release() {
        let gate = SubmissionGate::new();
        let permit = gate.acquire(None).unwrap();
        let soon = Instant::now() + Duration::from_millis(20);
        assert!(gate.acquire(Some(soon)).is_none());

        drop(permit);
        assert!(gate.acquire(Some(Instant::now())).is_some());
    }

    #[test]
    fn test_bound_callback_blocks_next_send() {
        let gate = SubmissionGate::new();
        let permit = gate.acquire(None).unwrap();
        permit.bind(token(1));
        permit.release_operation();
        drop(permit);

        // operation slot free, callback outstanding
        assert!(gate.try_acquire_pump().is_some());
        let soon = Instant::now() + Duration::from_millis(20);
        assert!(gate.acquire(Some(soon)).is_none());

        // a stale token does not free it, the right one does
        gate.callback_observed(token(7));
        assert!(gate.acquire(Some(Instant::now())).is_none());
        gate.callback_observed(token(1));
        gate.callback_observed(token(1));
        assert!(gate.acquire(Some(Instant::now())).is_some());
    }

    #[test]
    fn test_wait_callback_and_force_clear() {
        let gate = SubmissionGate::new();
        let permit = gate.acquire(None).unwrap();
        permit.bind(token(3));
        let soon = Instant::now() + Duration::from_millis(20);
        assert!(!permit.wait_callback(token(3), Some(soon)));

        permit.clear_callback();
        assert!(permit.wait_callback(token(3), Some(Instant::now())));
        drop(permit);

        // late completion is a no-op
        gate.callback_observed(token(3));
        assert!(gate.acquire(Some(Instant::now())).is_some());
    }

    #[test]
    fn test_finished_permit_leaves_next_reservation_alone() {
        let gate = SubmissionGate::new();
        let first = gate.acquire(None).unwrap();
        first.bind(token(1));
        first.release_operation();
        gate.callback_observed(token(1));
        assert!(first.wait_callback(token(1), Some(Instant::now())));

        // next send gets in before the first permit goes away
        let second = gate.acquire(Some(Instant::now())).unwrap();
        drop(first);
        second.bind(token(2));
        second.release_operation();

        let soon = Instant::now() + Duration::from_millis(20);
        assert!(gate.acquire(Some(soon)).is_none());
        assert!(!second.wait_callback(token(2), Some(soon)));

        gate.callback_observed(token(2));
        assert!(second.wait_callback(token(2), Some(Instant::now())));
        drop(second);
        assert!(gate.acquire(Some(Instant::now())).is_some());
    }

    #[test]
    fn test_clear_callback_only_frees_own_claim() {
        let gate = SubmissionGate::new();
        let first = gate.acquire(None).unwrap();
        first.bind(token(1));
        first.release_operation();
        gate.callback_observed(token(1));

        let second = gate.acquire(Some(Instant::now())).unwrap();
        second.bind(token(2));
        second.release_operation();

        // stale clear from the first send
        first.clear_callback();
        drop(first);
        let soon = Instant::now() + Duration::from_millis(20);
        assert!(gate.acquire(Some(soon)).is_none());

        second.clear_callback();
        drop(second);
        assert!(gate.acquire(Some(Instant::now())).is_some());
    }

    #[test]
    fn test_pump_slot_excludes_submissions() {
        let gate = SubmissionGate::new();
        let slot = gate.try_acquire_pump().unwrap();
        assert!(gate.try_acquire_pump().is_none());
        assert!(gate
            .acquire(Some(Instant::now() + Duration::from_millis(10)))
            .is_none());
        drop(slot);
        assert!(gate.acquire_pump(Some(Instant::now())).is_some());
    }

    mod send {
        use super::super::*;
        use crate::test_support::{fixture, fixture_with, metadata, raw, TestConfig};
        use crate::transports::MockBehavior;
        use contracts::CompletionReason;

        const SEND_TIMEOUT: Duration = Duration::from_secs(2);

        #[test]
        fn test_send_synchronous_completion() {
            let fx = fixture();
            let exporter = SerializedExporter::new(fx.export.clone());
            assert_eq!(
                exporter.send(raw(b"jpeg"), SEND_TIMEOUT).unwrap(),
                ExportResult::Success
            );
            assert!(!fx.export.has_pending_operations());
        }

        #[test]
        fn test_send_completion_delivered_by_pump() {
            let fx = fixture();
            fx.transport
                .set_behavior(MockBehavior::Queued(CompletionReason::Done));
            let exporter = SerializedExporter::new(fx.export.clone());
            assert_eq!(
                exporter.send(metadata("{}"), SEND_TIMEOUT).unwrap(),
                ExportResult::Success
            );
        }

        #[test]
        fn test_send_completion_from_transport_thread() {
            let fx = fixture();
            fx.transport.set_behavior(MockBehavior::Deferred {
                reason: CompletionReason::Exit,
                delay: Duration::from_millis(30),
            });
            let exporter = SerializedExporter::new(fx.export.clone());
            assert_eq!(
                exporter.send(raw(b"jpeg"), SEND_TIMEOUT).unwrap(),
                ExportResult::Denied
            );
        }

        #[test]
        fn test_send_callback_timeout_frees_gate() {
            let fx = fixture();
            fx.transport.set_behavior(MockBehavior::Never);
            let exporter = SerializedExporter::new(fx.export.clone());

            let err = exporter
                .send(raw(b"jpeg"), Duration::from_millis(50))
                .unwrap_err();
            assert!(matches!(err, DataExportError::CallbackTimeout { .. }));
            assert_eq!(fx.export.metrics().timeouts, 1);

            fx.transport
                .set_behavior(MockBehavior::Complete(CompletionReason::Done));
            assert_eq!(
                exporter.send(raw(b"next"), SEND_TIMEOUT).unwrap(),
                ExportResult::Success
            );
        }

        #[test]
        fn test_send_disabled_channel() {
            let fx = fixture();
            *fx.config.metadata_enabled.lock().unwrap() = false;
            let exporter = SerializedExporter::new(fx.export.clone());
            let err = exporter.send(metadata("{}"), SEND_TIMEOUT).unwrap_err();
            assert!(matches!(err, DataExportError::ChannelDisabled { .. }));
        }

        #[test]
        fn test_send_rejected_request_is_not_an_error() {
            let config = TestConfig::default();
            config.engine.lock().unwrap().max_payload_bytes = 2;
            let fx = fixture_with(config);
            let exporter = SerializedExporter::new(fx.export.clone());
            assert_eq!(
                exporter.send(raw(b"jpeg"), SEND_TIMEOUT).unwrap(),
                ExportResult::DataTooLarge
            );
            // the gate is free again
            assert_eq!(
                exporter.send(raw(b"ok"), SEND_TIMEOUT).unwrap(),
                ExportResult::Success
            );
        }

        #[test]
        fn test_send_transport_shutdown() {
            let fx = fixture();
            fx.transport.set_behavior(MockBehavior::Never);
            fx.transport.request_shutdown();
            let exporter = SerializedExporter::new(fx.export.clone());

            // dispatch itself is refused once the mock is shutting down
            assert_eq!(
                exporter.send(raw(b"jpeg"), SEND_TIMEOUT).unwrap(),
                ExportResult::Failure
            );
        }

        #[test]
        fn test_send_pump_requests_shutdown() {
            let fx = fixture();
            fx.transport.set_behavior(MockBehavior::Never);
            let exporter = SerializedExporter::new(fx.export.clone());

            let transport = Arc::clone(&fx.transport);
            let stopper = thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                transport.request_shutdown();
            });
            let err = exporter.send(raw(b"jpeg"), SEND_TIMEOUT).unwrap_err();
            stopper.join().unwrap();
            assert!(matches!(err, DataExportError::TransportShutdown { .. }));
        }

        #[test]
        fn test_concurrent_sends_all_complete() {
            let fx = fixture();
            fx.transport.set_behavior(MockBehavior::Deferred {
                reason: CompletionReason::Done,
                delay: Duration::from_millis(5),
            });
            let exporter = SerializedExporter::new(fx.export.clone());

            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let exporter = exporter.clone();
                    thread::spawn(move || exporter.send(raw(b"x"), Duration::from_secs(5)))
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap().unwrap(), ExportResult::Success);
            }
            assert_eq!(fx.transport.requests().len(), 4);
        }

        #[test]
        fn test_background_pump_delivers_and_stops() {
            let fx = fixture();
            fx.transport
                .set_behavior(MockBehavior::Queued(CompletionReason::Done));
            let pump = BackgroundPump::spawn(&fx.export).unwrap();

            let future = fx.export.submit(raw(b"jpeg")).unwrap();
            assert_eq!(future.wait(Some(SEND_TIMEOUT)), ExportResult::Success);
            assert!(!pump.is_finished());
            pump.stop();
        }

        #[test]
        fn test_background_pump_exits_on_transport_shutdown() {
            let fx = fixture();
            let pump = BackgroundPump::spawn(&fx.export).unwrap();
            fx.transport.request_shutdown();

            let deadline = Instant::now() + SEND_TIMEOUT;
            while !pump.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            assert!(pump.is_finished());
        }
    }
}
