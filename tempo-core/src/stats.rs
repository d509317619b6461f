#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Summary statistics for a single named metric.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricSummary {
    pub count: u64,
    pub sum: Duration,
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
    /// Offset of the first sample from when the aggregator was created.
    pub first_seen: Duration,
    /// Offset of the most recent sample, on the same clock as `first_seen`.
    pub last_seen: Duration,
}

impl fmt::Display for MetricSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "count={}, min={}, mean={}, p50={}, p90={}, p95={}, p99={}, max={}",
            self.count,
            humantime::format_duration(self.min),
            humantime::format_duration(self.mean),
            humantime::format_duration(self.p50),
            humantime::format_duration(self.p90),
            humantime::format_duration(self.p95),
            humantime::format_duration(self.p99),
            humantime::format_duration(self.max),
        )
    }
}

/// Pass/fail tally for a named check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CheckSummary {
    pub passes: u64,
    pub fails: u64,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Fraction of evaluations that passed; 0 when never evaluated.
    pub fn pass_rate(&self) -> f64 {
        match self.total() {
            0 => 0.,
            total => self.passes as f64 / total as f64,
        }
    }
}

/// Point-in-time view of everything the aggregator holds.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Snapshot {
    pub metrics: BTreeMap<String, MetricSummary>,
    pub checks: BTreeMap<String, CheckSummary>,
    /// Iterations handed to a virtual user.
    pub dispatched: u64,
    /// Iterations that submitted a sample.
    pub completed: u64,
    /// Dispatch attempts dropped because the concurrency ceiling was reached.
    pub saturation_drops: u64,
    /// Iterations skipped because the shared context was unusable.
    pub iteration_skips: u64,
    /// Iterations whose request failed at the transport level.
    pub request_failures: u64,
    /// In-flight iterations aborted by a drain deadline.
    pub cancelled: u64,
}

impl Snapshot {
    pub fn count(&self, metric: &str) -> u64 {
        self.metrics.get(metric).map(|m| m.count).unwrap_or(0)
    }
}

/// Statistics for a completed scenario run.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunStatistics {
    pub name: String,
    pub target_rate: f64,
    pub duration: Duration,
    /// Length of the scheduling window that actually ran.
    pub window: Duration,
    /// Wall time from setup to the end of the drain.
    pub elapsed: Duration,
    /// Highest number of simultaneously in-flight iterations.
    pub peak_vus: usize,
    /// Virtual users constructed, pre-warmed ones included.
    pub spawned_vus: usize,
    pub snapshot: Snapshot,
}

impl RunStatistics {
    /// Iterations dispatched per second of scheduling window.
    pub fn actual_rate(&self) -> f64 {
        let secs = self.window.as_secs_f64();
        if secs > 0. {
            self.snapshot.dispatched as f64 / secs
        } else {
            0.
        }
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = &self.snapshot;
        writeln!(
            f,
            "{}: target={:.2}/s actual={:.2}/s window={} elapsed={}",
            self.name,
            self.target_rate,
            self.actual_rate(),
            humantime::format_duration(self.window),
            humantime::format_duration(self.elapsed),
        )?;
        writeln!(
            f,
            "  iterations: dispatched={} completed={} dropped={} skipped={} failed={} cancelled={}",
            snapshot.dispatched,
            snapshot.completed,
            snapshot.saturation_drops,
            snapshot.iteration_skips,
            snapshot.request_failures,
            snapshot.cancelled,
        )?;
        writeln!(
            f,
            "  vus: peak={} spawned={}",
            self.peak_vus, self.spawned_vus
        )?;
        for (name, metric) in &snapshot.metrics {
            writeln!(f, "  {name}: {metric}")?;
        }
        for (name, check) in &snapshot.checks {
            writeln!(
                f,
                "  check '{name}': {:.2}% ({} passed, {} failed)",
                check.pass_rate() * 100.,
                check.passes,
                check.fails,
            )?;
        }
        Ok(())
    }
}
