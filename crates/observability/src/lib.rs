//! # Observability
//!
//! 导出引擎的日志与指标初始化。
//!
//! `edge-export` 和 demo 都通过 [`init_with_config`] 安装 subscriber，
//! 引擎 crate (`data_export`, `config_loader`) 可以单独调整日志级别，
//! 便于只看 dispatch / pump 细节而不被其他输出淹没。
//!
//! ```ignore
//! let config = ObservabilityConfig::from_verbosity(1, false)
//!     .with_engine_log_level("trace");
//! observability::init_with_config(config)?;
//!
//! let result = exporter.send(request, timeout)?;
//! observability::record_export_result(channel, result);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use crate::metrics::{
    record_export_latency_ms, record_export_result, record_pending_operations,
    ExportMetricsAggregator, MetricsSummary, RunningStats, StatsSummary,
};

/// 受 `engine_log_level` 控制的 target
pub const ENGINE_TARGETS: &[&str] = &["data_export", "config_loader"];

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志，带线程名 (`export-pump`) 与源码位置
    Json,
    /// 人类可读格式
    #[default]
    Pretty,
    /// 紧凑单行格式
    Compact,
}

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// 默认日志级别，`RUST_LOG` 存在时以其为准
    pub log_level: String,
    /// 引擎 crate 的日志级别，None 时跟随 `log_level`
    pub engine_log_level: Option<String>,
    /// Prometheus 端口 (None = 禁用)
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_level: "info".to_string(),
            engine_log_level: None,
            metrics_port: None,
        }
    }
}

impl ObservabilityConfig {
    /// 由 `-v` 次数和 `-q` 推导默认级别
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let log_level = if quiet {
            "warn"
        } else {
            match verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        };
        Self {
            log_level: log_level.to_string(),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn with_engine_log_level(mut self, level: impl Into<String>) -> Self {
        self.engine_log_level = Some(level.into());
        self
    }

    pub fn with_metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }
}

/// 构造过滤器：`RUST_LOG` 或默认级别，再叠加引擎 target 的级别
pub fn build_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("Invalid log level '{}'", config.log_level))?;

    if let Some(level) = &config.engine_log_level {
        for target in ENGINE_TARGETS {
            let directive: Directive = format!("{target}={level}")
                .parse()
                .with_context(|| format!("Invalid engine log level '{level}'"))?;
            filter = filter.add_directive(directive);
        }
    }
    Ok(filter)
}

/// 安装全局 subscriber，并按需启动 Prometheus exporter
///
/// # Errors
/// - 级别字符串无法解析
/// - 全局 subscriber 已安装
/// - Prometheus 端口无法监听
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_thread_names(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        engine_log_level = config.engine_log_level.as_deref().unwrap_or("inherit"),
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
///
/// `send` 命令在日志已安装后才知道端口，走这个入口。
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
