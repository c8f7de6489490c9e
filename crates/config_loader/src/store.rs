//! 运行时配置存储
//!
//! `SettingsStore` 持有当前生效的 `ExportSettings`，实现 `ExportConfig`。
//! 每次提交都会重新读取，因此 `replace` 之后立即生效。

use std::sync::{PoisonError, RwLock};

use contracts::{
    Destination, EngineSettings, ExportChannel, ExportConfig, ExportSettings, TransportMethod,
};

/// 线程安全的配置存储
#[derive(Debug, Default)]
pub struct SettingsStore {
    inner: RwLock<ExportSettings>,
}

impl SettingsStore {
    pub fn new(settings: ExportSettings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    /// 替换整份配置，返回旧配置
    pub fn replace(&self, settings: ExportSettings) -> ExportSettings {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, settings)
    }

    /// 当前配置的副本
    pub fn snapshot(&self) -> ExportSettings {
        self.read(Clone::clone)
    }

    fn read<T>(&self, f: impl FnOnce(&ExportSettings) -> T) -> T {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}

impl From<ExportSettings> for SettingsStore {
    fn from(settings: ExportSettings) -> Self {
        Self::new(settings)
    }
}

impl ExportConfig for SettingsStore {
    fn is_channel_enabled(&self, channel: ExportChannel) -> bool {
        self.read(|s| s.port_settings.get(channel).is_some_and(|p| p.enabled))
    }

    fn resolve_transport_method(&self, channel: ExportChannel) -> TransportMethod {
        self.read(|s| {
            s.port_settings
                .get(channel)
                .map_or(TransportMethod::UNCONFIGURED, |p| p.transport_method())
        })
    }

    fn resolve_destination(&self, channel: ExportChannel) -> Destination {
        self.read(|s| match s.port_settings.get(channel) {
            Some(port) => Destination {
                base_path: port.path.clone(),
                endpoint: port.endpoint.clone(),
                storage_name: port.storage_name.clone(),
            },
            None => Destination::default(),
        })
    }

    fn file_extension(&self, channel: ExportChannel) -> Option<&'static str> {
        match channel {
            ExportChannel::Raw => self.read(|s| s.codec_settings.raw_extension()),
            ExportChannel::Metadata => Some("txt"),
        }
    }

    fn engine_settings(&self) -> EngineSettings {
        self.read(|s| s.engine.clone())
    }
}
