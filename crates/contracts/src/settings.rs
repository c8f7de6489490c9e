//! ExportSettings - Config Loader 输出
//!
//! 描述导出端口配置：每个通道是否启用、使用哪种传输方式、目标路径，
//! 以及编码格式与引擎参数。

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{ExportChannel, TransportMethod};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的导出配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportSettings {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 端口配置
    #[serde(default)]
    pub port_settings: PortSettings,

    /// 编码配置 (决定 raw 通道的文件扩展名)
    #[serde(default)]
    pub codec_settings: CodecSettings,

    /// 引擎参数
    #[serde(default)]
    pub engine: EngineSettings,
}

/// 各通道的端口配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSettings {
    /// 原始数据 (input tensor) 端口
    #[serde(default)]
    pub input_tensor: Option<PortSetting>,

    /// 推理结果 (metadata) 端口
    #[serde(default)]
    pub metadata: Option<PortSetting>,
}

impl PortSettings {
    /// 获取通道对应的端口配置
    pub fn get(&self, channel: ExportChannel) -> Option<&PortSetting> {
        match channel {
            ExportChannel::Raw => self.input_tensor.as_ref(),
            ExportChannel::Metadata => self.metadata.as_ref(),
        }
    }

    /// 可变访问 (运行时重配置)
    pub fn get_mut(&mut self, channel: ExportChannel) -> &mut Option<PortSetting> {
        match channel {
            ExportChannel::Raw => &mut self.input_tensor,
            ExportChannel::Metadata => &mut self.metadata,
        }
    }
}

/// 单个端口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSetting {
    /// 传输方式编码 (0 telemetry, 1 named storage, 2 http storage)
    pub method: u32,

    /// 是否启用
    #[serde(default)]
    pub enabled: bool,

    /// 远端路径前缀
    #[serde(default)]
    pub path: String,

    /// HTTP 端点 (http storage)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// 存储名称 (named storage)
    #[serde(default)]
    pub storage_name: Option<String>,
}

impl PortSetting {
    /// 解析传输方式
    pub fn transport_method(&self) -> TransportMethod {
        TransportMethod::from_code(self.method)
    }
}

/// 编码配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodecSettings {
    /// 编码格式编码 (0 bin, 1 jpg, 2 bmp)
    #[serde(default)]
    pub format: u32,
}

impl CodecSettings {
    /// raw 通道文件扩展名，未知格式返回 None
    pub fn raw_extension(&self) -> Option<&'static str> {
        match self.format {
            0 => Some("bin"),
            1 => Some("jpg"),
            2 => Some("bmp"),
            _ => None,
        }
    }
}

/// 引擎参数
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineSettings {
    /// 关联表容量 (同时在途的操作上限)
    #[serde(default = "default_registry_capacity")]
    #[validate(range(min = 1))]
    pub registry_capacity: usize,

    /// 单个载荷最大字节数
    #[serde(default = "default_max_payload_bytes")]
    #[validate(range(min = 1))]
    pub max_payload_bytes: u64,

    /// 每次驱动传输事件循环的时长 (毫秒)
    #[serde(default = "default_pump_timeout_ms")]
    pub pump_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            registry_capacity: default_registry_capacity(),
            max_payload_bytes: default_max_payload_bytes(),
            pump_timeout_ms: default_pump_timeout_ms(),
        }
    }
}

fn default_registry_capacity() -> usize {
    100
}

fn default_max_payload_bytes() -> u64 {
    16 * 1024 * 1024
}

fn default_pump_timeout_ms() -> u64 {
    100
}

impl ExportSettings {
    /// 启用指定通道
    pub fn with_port(mut self, channel: ExportChannel, setting: PortSetting) -> Self {
        *self.port_settings.get_mut(channel) = Some(setting);
        self
    }

    /// 所有已配置的端口
    pub fn configured_ports(&self) -> impl Iterator<Item = (ExportChannel, &PortSetting)> {
        [ExportChannel::Raw, ExportChannel::Metadata]
            .into_iter()
            .filter_map(|channel| self.port_settings.get(channel).map(|p| (channel, p)))
    }
}
