//! Mock transport
//!
//! 用于单元测试的 mock 实现，可注入各种完成时序与失败场景。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use contracts::{
    CompletionCallback, CompletionReason, ContractError, CorrelationToken, ExportChannel,
    PumpStatus, Transport, TransportMethod, TransportRequest, TransportTarget,
};
use tracing::{debug, instrument};

/// Mock 完成行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// 在 dispatch 内同步回调
    Complete(CompletionReason),
    /// 在后台线程延迟回调
    Deferred {
        reason: CompletionReason,
        delay: Duration,
    },
    /// 永不回调，直到调用 `complete_held`
    Never,
    /// dispatch 直接返回错误
    Fail,
    /// 回调排队，由下一次 `pump_events` 投递
    Queued(CompletionReason),
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self::Complete(CompletionReason::Done)
    }
}

/// 已记录的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub token: CorrelationToken,
    pub channel: ExportChannel,
    pub method: TransportMethod,
    pub target: TransportTarget,
    pub payload: Vec<u8>,
}

struct Pending {
    token: CorrelationToken,
    callback: CompletionCallback,
    reason: CompletionReason,
}

#[derive(Default)]
struct MockState {
    behavior: MockBehavior,
    requests: Vec<RecordedRequest>,
    /// `Never` 行为下挂起的回调
    held: Vec<(CorrelationToken, CompletionCallback)>,
    /// `Queued` 行为下等待 pump 的回调
    queued: VecDeque<Pending>,
    shutting_down: bool,
}

/// Mock transport
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    wake: Condvar,
    dispatch_count: AtomicUsize,
}

impl MockTransport {
    /// 创建默认 mock（同步 Done）
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定行为创建 mock
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        let mock = Self::default();
        mock.set_behavior(behavior);
        mock
    }

    /// 修改后续 dispatch 的行为
    pub fn set_behavior(&self, behavior: MockBehavior) {
        self.lock().behavior = behavior;
    }

    /// 获取所有已接受的请求
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// dispatch 调用次数（包括失败的）
    pub fn dispatch_count(&self) -> usize {
        self.dispatch_count.load(Ordering::SeqCst)
    }

    /// 挂起的回调数量
    pub fn held_count(&self) -> usize {
        self.lock().held.len()
    }

    /// 投递所有挂起的回调，返回投递数量
    pub fn complete_held(&self, reason: CompletionReason) -> usize {
        let held = std::mem::take(&mut self.lock().held);
        let count = held.len();
        for (token, callback) in held {
            callback(token, reason);
        }
        count
    }

    /// 模拟后端要求退出
    pub fn request_shutdown(&self) {
        self.lock().shutting_down = true;
        self.wake.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    #[instrument(name = "mock_transport_dispatch", skip(self, request, on_complete), fields(token = %token))]
    fn dispatch(
        &self,
        request: TransportRequest,
        token: CorrelationToken,
        on_complete: CompletionCallback,
    ) -> Result<(), ContractError> {
        self.dispatch_count.fetch_add(1, Ordering::SeqCst);

        let TransportRequest {
            channel,
            method,
            target,
            mut payload,
        } = request;

        let behavior = {
            let mut state = self.lock();
            if state.shutting_down {
                return Err(ContractError::transport_shutdown("mock"));
            }
            if state.behavior == MockBehavior::Fail {
                return Err(ContractError::transport_dispatch("mock", "mock failure"));
            }
            let payload = payload.read_to_end()?;
            state.requests.push(RecordedRequest {
                token,
                channel,
                method,
                target,
                payload,
            });
            state.behavior
        };
        debug!(?behavior, "Mock dispatch accepted");

        match behavior {
            MockBehavior::Complete(reason) => on_complete(token, reason),
            MockBehavior::Deferred { reason, delay } => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    on_complete(token, reason);
                });
            }
            MockBehavior::Never => self.lock().held.push((token, on_complete)),
            MockBehavior::Queued(reason) => {
                self.lock().queued.push_back(Pending {
                    token,
                    callback: on_complete,
                    reason,
                });
                self.wake.notify_all();
            }
            MockBehavior::Fail => {}
        }
        Ok(())
    }

    fn pump_events(&self, timeout: Duration) -> PumpStatus {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.lock();
        while state.queued.is_empty() && !state.shutting_down {
            let remaining = match deadline {
                Some(d) => d.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                return PumpStatus::Idle;
            }
            let (guard, _) = self
                .wake
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }

        if state.shutting_down {
            return PumpStatus::ShutdownRequested;
        }
        let ready: Vec<_> = state.queued.drain(..).collect();
        drop(state);

        let delivered = ready.len();
        for pending in ready {
            (pending.callback)(pending.token, pending.reason);
        }
        PumpStatus::Delivered(delivered)
    }
}
