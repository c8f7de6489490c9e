//! Session statistics.

use std::time::Duration;

use contracts::ExportState;
use data_export::{DrainOutcome, ExportMetricsSnapshot};
use observability::ExportMetricsAggregator;

/// Statistics from a `send` run
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Operations attempted (inputs x repeat)
    pub attempted: u64,

    /// Attempts skipped because the channel is disabled
    pub not_submitted: u64,

    /// Total duration of the session
    pub duration: Duration,

    /// Per-operation results and latencies
    pub results: ExportMetricsAggregator,

    /// Engine counters at the end of the run
    pub engine: ExportMetricsSnapshot,

    /// Outcome of the final drain
    pub drain: DrainOutcome,

    /// Lifecycle state requested by the engine
    pub final_state: ExportState,
}

impl SessionStats {
    /// Completed operations per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.results.total as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Whether every submitted operation succeeded
    pub fn all_succeeded(&self) -> bool {
        self.results.succeeded == self.results.total && self.drain.abandoned == 0
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Export Statistics                         ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Attempted: {}", self.attempted);
        println!("   ├─ Not submitted (disabled): {}", self.not_submitted);
        println!("   ├─ Throughput: {:.2} ops/s", self.throughput());
        println!("   └─ Final state: {}", self.final_state);

        let summary = self.results.summary();
        println!("\n📈 Results");
        println!(
            "   ├─ Succeeded: {}/{} ({:.2}%)",
            summary.succeeded, summary.total, summary.success_rate
        );
        for (result, count) in &summary.result_counts {
            println!("   ├─ {}: {}", result, count);
        }
        println!("   ├─ Latency (ms): {}", summary.latency_ms);
        println!("   └─ Payload size (bytes): {}", summary.payload_bytes);

        println!("\n⚙️  Engine");
        println!("   ├─ Dispatched: {}", self.engine.dispatched);
        println!("   ├─ Released: {}", self.engine.released);
        println!("   ├─ Orphan callbacks: {}", self.engine.orphan_callbacks);
        println!("   └─ Abandoned at shutdown: {}", self.drain.abandoned);

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ExportResult;

    #[test]
    fn test_throughput_and_success() {
        let mut stats = SessionStats {
            duration: Duration::from_secs(2),
            ..SessionStats::default()
        };
        stats.results.update(ExportResult::Success, 1.0, 10);
        stats.results.update(ExportResult::Success, 1.0, 10);
        assert!((stats.throughput() - 1.0).abs() < 1e-9);
        assert!(stats.all_succeeded());

        stats.results.update(ExportResult::Denied, 1.0, 10);
        assert!(!stats.all_succeeded());
    }

    #[test]
    fn test_zero_duration() {
        assert_eq!(SessionStats::default().throughput(), 0.0);
    }
}
