use crate::check::CheckResult;
use arc_swap::ArcSwap;
use pdatastructs::tdigest::{TDigest, K1};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tempo_core::{CheckSummary, MetricSummary, Snapshot};
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// One duration measurement produced by a single iteration.
#[derive(Debug, Clone)]
pub struct Sample {
    pub metric: Arc<str>,
    pub duration: Duration,
    pub timestamp: Instant,
}

/// Owner of every piece of mutable run state: per-metric statistics, check tallies and
/// the scheduler/VU event counters.
///
/// Metric entries are created on first use. The table itself is swapped atomically, so
/// finding an existing metric never takes a lock; each metric then has its own mutex so
/// count, sum, min, max and the quantile digest always move together.
pub struct Aggregator {
    started: Instant,
    metrics: Table<Mutex<MetricState>>,
    checks: Table<CheckCounter>,
    dispatched: AtomicU64,
    completed: AtomicU64,
    saturation_drops: AtomicU64,
    iteration_skips: AtomicU64,
    request_failures: AtomicU64,
    cancelled: AtomicU64,
}

impl Aggregator {
    pub fn new() -> Self {
        #[cfg(feature = "metrics")]
        describe_metrics();

        Self {
            started: Instant::now(),
            metrics: Table::new(),
            checks: Table::new(),
            dispatched: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            saturation_drops: AtomicU64::new(0),
            iteration_skips: AtomicU64::new(0),
            request_failures: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        }
    }

    pub fn submit(&self, sample: Sample) {
        let offset = sample.timestamp.saturating_duration_since(self.started);
        self.record_at(&sample.metric, sample.duration, offset);
    }

    pub fn record(&self, metric: &str, duration: Duration) {
        self.record_at(metric, duration, self.started.elapsed());
    }

    fn record_at(&self, metric: &str, duration: Duration, offset: Duration) {
        let state = self.metrics.get_or_insert(metric, || {
            trace!("First sample for metric {metric}");
            Mutex::new(MetricState::new())
        });
        state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration, offset);

        #[cfg(feature = "metrics")]
        metrics::histogram!("tempo_sample_duration_seconds", "metric" => metric.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn record_check(&self, result: &CheckResult) {
        let counter = self
            .checks
            .get_or_insert(&result.name, CheckCounter::default);
        if result.passed {
            counter.passes.fetch_add(1, Ordering::Relaxed);
        } else {
            counter.fails.fetch_add(1, Ordering::Relaxed);
        }

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "tempo_checks_total",
            "check" => result.name.to_string(),
            "result" => if result.passed { "pass" } else { "fail" }
        )
        .increment(1);
    }

    pub fn record_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("tempo_dispatched_total").increment(1);
    }

    pub fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns true for the first drop of the run.
    pub fn record_saturation_drop(&self) -> bool {
        #[cfg(feature = "metrics")]
        metrics::counter!("tempo_saturation_drops_total").increment(1);
        self.saturation_drops.fetch_add(1, Ordering::Relaxed) == 0
    }

    /// Returns true for the first skip of the run.
    pub fn record_skip(&self) -> bool {
        #[cfg(feature = "metrics")]
        metrics::counter!("tempo_iteration_skips_total").increment(1);
        self.iteration_skips.fetch_add(1, Ordering::Relaxed) == 0
    }

    pub fn record_request_failure(&self) {
        self.request_failures.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "metrics")]
        metrics::counter!("tempo_request_failures_total").increment(1);
    }

    pub fn record_cancelled(&self, count: u64) {
        self.cancelled.fetch_add(count, Ordering::Relaxed);
    }

    /// Read-only view of everything recorded so far.
    ///
    /// Metrics are visited one at a time and each is locked only while its summary is
    /// computed, so writers to other metrics are never held up.
    pub fn snapshot(&self) -> Snapshot {
        let metrics = self
            .metrics
            .entries()
            .iter()
            .filter_map(|(name, state)| {
                let state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.summary().map(|summary| (name.to_string(), summary))
            })
            .collect();

        let checks = self
            .checks
            .entries()
            .iter()
            .map(|(name, counter)| (name.to_string(), counter.summary()))
            .collect();

        Snapshot {
            metrics,
            checks,
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            saturation_drops: self.saturation_drops.load(Ordering::Relaxed),
            iteration_skips: self.iteration_skips.load(Ordering::Relaxed),
            request_failures: self.request_failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Name-keyed table of lazily created entries.
struct Table<T> {
    entries: ArcSwap<HashMap<Arc<str>, Arc<T>>>,
}

impl<T> Table<T> {
    fn new() -> Self {
        Self {
            entries: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    fn get_or_insert(&self, name: &str, init: impl Fn() -> T) -> Arc<T> {
        loop {
            if let Some(entry) = self.entries.load().get(name) {
                return entry.clone();
            }

            // NOTE: `rcu` may run the closure several times under contention; keeping any
            // entry a racing writer already inserted is what prevents lost samples.
            self.entries.rcu(|current| {
                let mut next = HashMap::clone(current);
                next.entry(Arc::from(name))
                    .or_insert_with(|| Arc::new(init()));
                next
            });
        }
    }

    fn entries(&self) -> BTreeMap<Arc<str>, Arc<T>> {
        self.entries
            .load()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }
}

#[derive(Default)]
struct CheckCounter {
    passes: AtomicU64,
    fails: AtomicU64,
}

impl CheckCounter {
    fn summary(&self) -> CheckSummary {
        CheckSummary {
            passes: self.passes.load(Ordering::Relaxed),
            fails: self.fails.load(Ordering::Relaxed),
        }
    }
}

struct MetricState {
    count: u64,
    sum: Duration,
    min: Duration,
    max: Duration,
    first_seen: Duration,
    last_seen: Duration,
    latency: TDigest<K1>,
}

impl MetricState {
    fn new() -> Self {
        Self {
            count: 0,
            sum: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
            first_seen: Duration::MAX,
            last_seen: Duration::ZERO,
            latency: default_tdigest(),
        }
    }

    fn push(&mut self, duration: Duration, offset: Duration) {
        self.count += 1;
        self.sum = self.sum.saturating_add(duration);
        self.min = self.min.min(duration);
        self.max = self.max.max(duration);
        self.first_seen = self.first_seen.min(offset);
        self.last_seen = self.last_seen.max(offset);
        self.latency.insert(duration.as_secs_f64());
    }

    fn mean(&self) -> Duration {
        let nanos = self.sum.as_nanos() / u128::from(self.count.max(1));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    fn quantile(&self, q: f64, mean: Duration) -> Duration {
        let secs = self.latency.quantile(q);

        // TDigest can hand back NaN for degenerate inputs.
        if !secs.is_finite() {
            error!("Non-finite p{} estimate; reporting the mean instead.", q * 100.);
            return mean;
        }

        Duration::from_secs_f64(secs.max(0.)).clamp(self.min, self.max)
    }

    fn summary(&self) -> Option<MetricSummary> {
        if self.count == 0 {
            return None;
        }

        let mean = self.mean();
        Some(MetricSummary {
            count: self.count,
            sum: self.sum,
            min: self.min,
            max: self.max,
            mean,
            p50: self.quantile(0.5, mean),
            p90: self.quantile(0.9, mean),
            p95: self.quantile(0.95, mean),
            p99: self.quantile(0.99, mean),
            first_seen: self.first_seen,
            last_seen: self.last_seen,
        })
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}

#[cfg(feature = "metrics")]
fn describe_metrics() {
    metrics::describe_histogram!(
        "tempo_sample_duration_seconds",
        metrics::Unit::Seconds,
        "Duration of each completed iteration's request"
    );
    metrics::describe_counter!(
        "tempo_saturation_drops_total",
        "Dispatch attempts dropped at the concurrency ceiling"
    );
    metrics::describe_counter!(
        "tempo_iteration_skips_total",
        "Iterations skipped for lack of a usable shared context"
    );
}
