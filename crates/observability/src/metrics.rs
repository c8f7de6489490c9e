//! 导出指标收集模块
//!
//! 通过 `metrics` facade 发布导出结果，并在内存中聚合一次运行的统计。

use std::collections::HashMap;

use contracts::{ExportChannel, ExportResult};
use metrics::{counter, gauge, histogram};

/// 记录一次导出的终态结果
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_export_result;
///
/// let result = exporter.send(request, timeout)?;
/// record_export_result(ExportChannel::Raw, result);
/// ```
pub fn record_export_result(channel: ExportChannel, result: ExportResult) {
    counter!(
        "edge_export_results_total",
        "channel" => channel.port_key(),
        "result" => result.as_str()
    )
    .increment(1);

    if !result.is_success() {
        counter!("edge_export_failures_total", "channel" => channel.port_key()).increment(1);
    }
}

/// 记录在途操作数量
pub fn record_pending_operations(pending: usize) {
    gauge!("edge_export_pending_operations").set(pending as f64);
}

/// 记录从提交到终态的延迟
pub fn record_export_latency_ms(channel: ExportChannel, latency_ms: f64) {
    histogram!("edge_export_latency_ms", "channel" => channel.port_key()).record(latency_ms);
}

/// 导出指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct ExportMetricsAggregator {
    /// 总次数
    pub total: u64,

    /// 成功次数
    pub succeeded: u64,

    /// 各结果次数
    pub result_counts: HashMap<ExportResult, u64>,

    /// 延迟统计 (毫秒)
    pub latency_stats: RunningStats,

    /// 载荷大小统计 (字节)
    pub size_stats: RunningStats,
}

impl ExportMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, result: ExportResult, latency_ms: f64, bytes: u64) {
        self.total += 1;
        if result.is_success() {
            self.succeeded += 1;
        }
        *self.result_counts.entry(result).or_insert(0) += 1;
        self.latency_stats.push(latency_ms);
        self.size_stats.push(bytes as f64);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let mut result_counts: Vec<_> = self
            .result_counts
            .iter()
            .map(|(result, count)| (result.as_str(), *count))
            .collect();
        result_counts.sort_unstable();

        MetricsSummary {
            total: self.total,
            succeeded: self.succeeded,
            success_rate: if self.total > 0 {
                self.succeeded as f64 / self.total as f64 * 100.0
            } else {
                0.0
            },
            latency_ms: StatsSummary::from(&self.latency_stats),
            payload_bytes: StatsSummary::from(&self.size_stats),
            result_counts,
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total: u64,
    pub succeeded: u64,
    pub success_rate: f64,
    pub latency_ms: StatsSummary,
    pub payload_bytes: StatsSummary,
    /// 按结果名排序
    pub result_counts: Vec<(&'static str, u64)>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Export Summary ===")?;
        writeln!(f, "Total exports: {}", self.total)?;
        writeln!(
            f,
            "Succeeded: {} ({:.2}%)",
            self.succeeded, self.success_rate
        )?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;
        writeln!(f, "Payload size (bytes): {}", self.payload_bytes)?;

        if !self.result_counts.is_empty() {
            writeln!(f, "Results:")?;
            for (result, count) in &self.result_counts {
                writeln!(f, "  {}: {}", result, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
