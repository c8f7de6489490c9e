//! ExportFuture - handle to an in-flight export operation
//!
//! Two parties hold on to an operation: the completion callback and the
//! caller. The transport state (payload, object name) is released once both
//! have signed off, whichever comes last, under the future's own lock.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use contracts::{CompletionReason, CorrelationToken, ExportResult, Payload, TransportMethod};
use tracing::{debug, error, warn};

use crate::metrics::ExportMetrics;

/// Which parties have signed off on an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rendezvous {
    #[default]
    Neither,
    /// Completion observed (or the operation never reached the transport)
    CallbackOnly,
    /// Caller cleaned up, completion still outstanding
    CleanupOnly,
    Both,
}

impl Rendezvous {
    fn with_callback(self) -> Self {
        match self {
            Self::Neither | Self::CallbackOnly => Self::CallbackOnly,
            Self::CleanupOnly | Self::Both => Self::Both,
        }
    }

    fn with_cleanup(self) -> Self {
        match self {
            Self::Neither | Self::CleanupOnly => Self::CleanupOnly,
            Self::CallbackOnly | Self::Both => Self::Both,
        }
    }

    pub fn callback_seen(self) -> bool {
        matches!(self, Self::CallbackOnly | Self::Both)
    }

    pub fn cleanup_requested(self) -> bool {
        matches!(self, Self::CleanupOnly | Self::Both)
    }
}

/// Resources owned by the operation until release
pub(crate) struct TransportState {
    pub payload: Payload,
    pub object_name: String,
    pub method: Option<TransportMethod>,
}

#[derive(Default)]
struct FutureState {
    result: ExportResult,
    rendezvous: Rendezvous,
    transport: Option<TransportState>,
    released: bool,
}

/// State shared between the caller's handle and the registry
pub(crate) struct FutureShared {
    state: Mutex<FutureState>,
    ready: Condvar,
    metrics: Arc<ExportMetrics>,
}

impl FutureShared {
    pub(crate) fn new(metrics: Arc<ExportMetrics>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FutureState::default()),
            ready: Condvar::new(),
            metrics,
        })
    }

    /// Hand the transport state over to the future
    pub(crate) fn attach(&self, transport: TransportState) {
        self.lock().transport = Some(transport);
    }

    pub(crate) fn set_enqueued(&self) {
        self.lock().result = ExportResult::Enqueued;
    }

    /// Finalize an operation no callback will ever arrive for
    pub(crate) fn finalize(&self, result: ExportResult) {
        let mut state = self.lock();
        state.result = result;
        state.rendezvous = state.rendezvous.with_callback();
        self.metrics.record_result(result);
        self.ready.notify_all();
        self.release_if_done(&mut state);
    }

    /// Completion side of the rendezvous
    pub(crate) fn complete(&self, token: CorrelationToken, reason: CompletionReason) -> ExportResult {
        let mut state = self.lock();
        if state.rendezvous.callback_seen() {
            warn!(token = %token, ?reason, "Second completion for the same operation ignored");
            return state.result;
        }

        let method = state.transport.as_ref().and_then(|t| t.method);
        let result = map_completion(method, reason);
        debug!(token = %token, ?reason, result = %result, "Completion received");

        state.result = result;
        state.rendezvous = state.rendezvous.with_callback();
        self.metrics.record_result(result);
        self.ready.notify_all();
        self.release_if_done(&mut state);
        result
    }

    /// Caller side of the rendezvous
    fn request_cleanup(&self) {
        let mut state = self.lock();
        state.rendezvous = state.rendezvous.with_cleanup();
        self.release_if_done(&mut state);
    }

    fn release_if_done(&self, state: &mut FutureState) {
        if state.rendezvous != Rendezvous::Both {
            debug!(rendezvous = ?state.rendezvous, "Keeping operation state");
            return;
        }
        if state.released {
            return;
        }
        let freed = state.transport.take();
        state.released = true;
        self.metrics.inc_released();
        debug!(
            object = freed.as_ref().map(|t| t.object_name.as_str()),
            "Released operation state"
        );
    }

    fn wait(&self, timeout: Option<Duration>) -> ExportResult {
        let mut state = self.lock();
        if state.result != ExportResult::Enqueued {
            return state.result;
        }

        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        match deadline {
            None => {
                while state.result == ExportResult::Enqueued {
                    state = self
                        .ready
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
            Some(deadline) => {
                while state.result == ExportResult::Enqueued {
                    let now = Instant::now();
                    if now >= deadline {
                        self.metrics.inc_timeouts();
                        debug!(?timeout, "Wait deadline elapsed, operation still enqueued");
                        return ExportResult::Timeout;
                    }
                    let (guard, _) = self
                        .ready
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                }
            }
        }
        state.result
    }

    fn lock(&self) -> MutexGuard<'_, FutureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Map a transport completion reason onto an export result
///
/// Bulk uploads: `Done` succeeds, `Exit` is a refusal, anything else is a
/// failure. Telemetry: `Done` succeeds, `Denied`/`Exit`/`Error` are refusals.
pub(crate) fn map_completion(
    method: Option<TransportMethod>,
    reason: CompletionReason,
) -> ExportResult {
    match method {
        Some(TransportMethod::Telemetry) => match reason {
            CompletionReason::Done => ExportResult::Success,
            CompletionReason::Denied | CompletionReason::Exit | CompletionReason::Error => {
                ExportResult::Denied
            }
            CompletionReason::Other(code) => {
                error!(code, "Telemetry completion reason not recognized");
                ExportResult::Failure
            }
        },
        _ => match reason {
            CompletionReason::Done => ExportResult::Success,
            CompletionReason::Exit => ExportResult::Denied,
            other => {
                error!(reason = ?other, "Blob completion reason not recognized");
                ExportResult::Failure
            }
        },
    }
}

/// Caller's handle to an export operation
///
/// Dropping the handle (or calling [`cleanup`](Self::cleanup)) signs off the
/// caller's side; the operation's resources go away once the completion has
/// been observed too.
pub struct ExportFuture {
    shared: Arc<FutureShared>,
    token: Option<CorrelationToken>,
}

impl ExportFuture {
    pub(crate) fn new(shared: Arc<FutureShared>, token: Option<CorrelationToken>) -> Self {
        Self { shared, token }
    }

    /// Correlation token, `None` if the operation was rejected before registration
    pub fn token(&self) -> Option<CorrelationToken> {
        self.token
    }

    /// Current stored result (never `Timeout`)
    pub fn result(&self) -> ExportResult {
        self.shared.lock().result
    }

    /// Remote object name / URL / telemetry key
    pub fn object_name(&self) -> Option<String> {
        let state = self.shared.lock();
        state.transport.as_ref().map(|t| t.object_name.clone())
    }

    /// Block until the operation is terminal or `timeout` elapses
    ///
    /// `None` waits forever. A deadline returns [`ExportResult::Timeout`]
    /// without touching the stored result; a later wait can still observe
    /// the real outcome.
    pub fn wait(&self, timeout: Option<Duration>) -> ExportResult {
        self.shared.wait(timeout)
    }

    /// [`wait`](Self::wait) with a millisecond timeout, negative meaning forever
    pub fn wait_ms(&self, timeout_ms: i64) -> ExportResult {
        let timeout = u64::try_from(timeout_ms).ok().map(Duration::from_millis);
        self.wait(timeout)
    }

    /// Async wait, runs the blocking wait on tokio's blocking pool
    pub async fn wait_async(&self, timeout: Option<Duration>) -> ExportResult {
        let shared = Arc::clone(&self.shared);
        match tokio::task::spawn_blocking(move || shared.wait(timeout)).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Blocking wait task failed");
                ExportResult::Failure
            }
        }
    }

    /// Read-only view that outlives the handle
    pub fn observer(&self) -> FutureObserver {
        FutureObserver {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Sign off the caller's side
    pub fn cleanup(self) {
        debug!(token = ?self.token, "Cleanup requested");
        drop(self);
    }
}

impl Drop for ExportFuture {
    fn drop(&mut self) {
        self.shared.request_cleanup();
    }
}

impl fmt::Debug for ExportFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportFuture")
            .field("token", &self.token)
            .field("result", &self.result())
            .finish()
    }
}

/// Inspection handle, does not take part in the rendezvous
#[derive(Clone)]
pub struct FutureObserver {
    shared: Arc<FutureShared>,
}

impl FutureObserver {
    pub fn result(&self) -> ExportResult {
        self.shared.lock().result
    }

    pub fn rendezvous(&self) -> Rendezvous {
        self.shared.lock().rendezvous
    }

    /// Whether the operation's resources have been released
    pub fn is_released(&self) -> bool {
        self.shared.lock().released
    }

    /// Payload bytes still held by the operation
    pub fn held_bytes(&self) -> Option<u64> {
        let state = self.shared.lock();
        state.transport.as_ref().map(|t| t.payload.len())
    }
}
