//! FileTransport - writes exported objects to disk
//!
//! Objects land under `base_path` mirroring their remote names: HTTP URLs
//! under `http/<host>/<path>`, named storage under `<storage>/<remote_name>`,
//! telemetry appended to `telemetry.jsonl`. Completions are queued and
//! delivered from [`Transport::pump_events`].

use std::collections::{HashSet, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use contracts::{
    CompletionCallback, CompletionReason, ContractError, CorrelationToken, PayloadReader,
    PumpStatus, Transport, TransportRequest, TransportTarget,
};
use tracing::{debug, info, instrument, warn};

/// Chunk size used when streaming a payload to disk
const CHUNK_SIZE: usize = 64 * 1024;

/// Configuration for FileTransport
#[derive(Debug, Clone)]
pub struct FileTransportConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl Default for FileTransportConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./output"),
        }
    }
}

struct Completion {
    token: CorrelationToken,
    callback: CompletionCallback,
}

#[derive(Default)]
struct Queue {
    pending: VecDeque<Completion>,
    shutting_down: bool,
}

/// Transport that writes objects to local files
pub struct FileTransport {
    name: String,
    config: FileTransportConfig,
    queue: Mutex<Queue>,
    ready: Condvar,
    created_dirs: Mutex<HashSet<PathBuf>>,
}

impl FileTransport {
    /// Create a new FileTransport
    pub fn new(name: impl Into<String>, config: FileTransportConfig) -> std::io::Result<Self> {
        // Create base directory if it doesn't exist
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            queue: Mutex::new(Queue::default()),
            ready: Condvar::new(),
            created_dirs: Mutex::new(HashSet::new()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Stop accepting work; queued completions will report `Exit`
    pub fn request_shutdown(&self) {
        info!(transport = %self.name, "Shutdown requested");
        self.lock_queue().shutting_down = true;
        self.ready.notify_all();
    }

    /// Completions waiting for the next pump
    pub fn queued(&self) -> usize {
        self.lock_queue().pending.len()
    }

    /// Local path an object is written to
    pub fn local_path(&self, target: &TransportTarget) -> PathBuf {
        let relative = match target {
            TransportTarget::Http { url } => {
                let without_scheme = url.split_once("://").map_or(url.as_str(), |(_, rest)| rest);
                Path::new("http").join(sanitize(without_scheme))
            }
            TransportTarget::NamedStorage {
                storage_name,
                remote_name,
            } => Path::new(storage_name.as_deref().unwrap_or("default")).join(sanitize(remote_name)),
            TransportTarget::Telemetry { .. } => PathBuf::from("telemetry.jsonl"),
        };
        self.config.base_path.join(relative)
    }

    fn write_object(&self, path: &Path, payload: &mut PayloadReader) -> Result<(), ContractError> {
        self.ensure_parent(path)?;
        let mut file = File::create(path)?;
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let n = payload.read_into(&mut chunk)?;
            if n == 0 {
                break;
            }
            file.write_all(&chunk[..n])?;
        }
        file.flush()?;
        Ok(())
    }

    fn append_telemetry(
        &self,
        path: &Path,
        key: &str,
        payload: &mut PayloadReader,
    ) -> Result<(), ContractError> {
        self.ensure_parent(path)?;
        let value = payload.read_to_end()?;
        let line = serde_json::json!({
            "key": key,
            "value": String::from_utf8_lossy(&value),
        });
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn ensure_parent(&self, path: &Path) -> std::io::Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let mut created = self
            .created_dirs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !created.contains(parent) {
            fs::create_dir_all(parent)?;
            created.insert(parent.to_path_buf());
        }
        Ok(())
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keep only normal path components
fn sanitize(remote: &str) -> PathBuf {
    Path::new(remote)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

impl Transport for FileTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_transport_dispatch",
        skip(self, request, on_complete),
        fields(transport = %self.name, token = %token)
    )]
    fn dispatch(
        &self,
        request: TransportRequest,
        token: CorrelationToken,
        on_complete: CompletionCallback,
    ) -> Result<(), ContractError> {
        if self.lock_queue().shutting_down {
            return Err(ContractError::transport_shutdown(&self.name));
        }

        let TransportRequest {
            target,
            mut payload,
            ..
        } = request;
        let path = self.local_path(&target);
        match &target {
            TransportTarget::Telemetry { key } => self.append_telemetry(&path, key, &mut payload)?,
            _ => self.write_object(&path, &mut payload)?,
        }
        debug!(path = %path.display(), bytes = payload.offset(), "Object written");

        self.lock_queue().pending.push_back(Completion {
            token,
            callback: on_complete,
        });
        self.ready.notify_all();
        Ok(())
    }

    fn pump_events(&self, timeout: Duration) -> PumpStatus {
        let deadline = Instant::now().checked_add(timeout);
        let mut queue = self.lock_queue();
        while queue.pending.is_empty() && !queue.shutting_down {
            let remaining = match deadline {
                Some(d) => d.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                return PumpStatus::Idle;
            }
            let (guard, _) = self
                .ready
                .wait_timeout(queue, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            queue = guard;
        }

        let shutting_down = queue.shutting_down;
        let drained: Vec<_> = queue.pending.drain(..).collect();
        drop(queue);

        let reason = if shutting_down {
            CompletionReason::Exit
        } else {
            CompletionReason::Done
        };
        let delivered = drained.len();
        for completion in drained {
            (completion.callback)(completion.token, reason);
        }

        if shutting_down {
            if delivered > 0 {
                warn!(transport = %self.name, abandoned = delivered, "Pending uploads abandoned");
            }
            PumpStatus::ShutdownRequested
        } else {
            PumpStatus::Delivered(delivered)
        }
    }
}
