//! Scenario builder and run orchestration
use crate::aggregator::Aggregator;
use crate::context::SharedContext;
use crate::error::RunError;
use crate::mixer::Mixer;
use crate::scheduler::Scheduler;
use crate::setup::Setup;
use crate::variant::Variant;
use crate::vu::VuFactory;
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tempo_core::{DrainPolicy, RunStatistics, ScenarioConfig};
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

type RunnerFuture = Pin<Box<dyn Future<Output = Result<RunStatistics, RunError>> + Send>>;

/// Load test scenario
///
/// Describes the workload (variants and an optional setup phase) and the pacing. Awaiting
/// the scenario runs it to completion.
///
/// # Example
/// ```no_run
/// use tempo::prelude::*;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let stats = Scenario::new("browse_submit")
///         .variant(Variant::new("browse", 0.8, |_| async {
///             Outcome::completed(200, Duration::from_millis(3), vec![])
///         }))
///         .variant(Variant::new("submit", 0.2, |_| async {
///             Outcome::completed(200, Duration::from_millis(9), vec![])
///         }))
///         .rate(100.)
///         .duration(Duration::from_secs(30))
///         .await
///         .unwrap();
///
///     println!("{stats}");
/// }
/// ```
#[pin_project::pin_project]
pub struct Scenario {
    plan: Plan,
    aggregator: Arc<Aggregator>,
    runner_fut: Option<RunnerFuture>,
}

#[derive(Clone, Debug)]
pub(crate) struct Plan {
    config: ScenarioConfig,
    setup: Option<Setup>,
    variants: Vec<Variant>,
    requires: Vec<String>,
}

impl Scenario {
    pub fn new(name: &str) -> Self {
        Self::from_config(ScenarioConfig::new(name))
    }

    /// Start from an existing configuration, e.g. one loaded from a file.
    pub fn from_config(config: ScenarioConfig) -> Self {
        Self {
            plan: Plan {
                config,
                setup: None,
                variants: vec![],
                requires: vec![],
            },
            aggregator: Arc::new(Aggregator::new()),
            runner_fut: None,
        }
    }

    /// Run `setup` once before the first iteration and share what it publishes.
    pub fn setup(mut self, setup: Setup) -> Self {
        self.plan.setup = Some(setup);
        self
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.plan.variants.push(variant);
        self
    }

    /// Iterations are skipped, not failed, while the shared context lacks a usable `key`.
    pub fn require(mut self, key: &str) -> Self {
        self.plan.requires.push(key.to_string());
        self
    }

    /// Live handle on the run's metrics, for snapshots while the scenario is in flight.
    pub fn metrics(&self) -> Arc<Aggregator> {
        self.aggregator.clone()
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.plan.config
    }
}

impl Future for Scenario {
    type Output = Result<RunStatistics, RunError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let runner = this.runner_fut.get_or_insert_with(|| {
            let plan = this.plan.clone();
            let aggregator = this.aggregator.clone();
            Box::pin(async move { run_scenario(plan, aggregator).await })
        });

        runner.as_mut().poll(cx)
    }
}

pub trait ConfigurableScenario<T: Send>: Future<Output = T> + Sized + Send {
    fn rate(self, rate: f64) -> Self;
    fn duration(self, duration: Duration) -> Self;
    fn preallocated_vus(self, vus: usize) -> Self;
    fn max_vus(self, vus: usize) -> Self;
    fn drain(self, drain: DrainPolicy) -> Self;
    fn seed(self, seed: u64) -> Self;
}

impl ConfigurableScenario<Result<RunStatistics, RunError>> for Scenario {
    /// Start this many iterations per second, however long each one takes.
    ///
    /// NOTE: Must supply a `.duration()` as well
    ///
    /// # Example
    /// ```no_run
    /// use tempo::prelude::*;
    /// use std::time::Duration;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let _ = Scenario::new("steady")
    ///         .variant(Variant::new("noop", 1., |_| async {
    ///             Outcome::completed(200, Duration::ZERO, vec![])
    ///         }))
    ///         .rate(250.)
    ///         .duration(Duration::from_secs(60))
    ///         .await;
    /// }
    /// ```
    fn rate(mut self, rate: f64) -> Self {
        self.plan.config.target_rate = Some(rate);
        self
    }

    /// Length of the scheduling window. In-flight iterations are drained afterwards.
    ///
    /// NOTE: Must supply a `.rate()` as well
    fn duration(mut self, duration: Duration) -> Self {
        self.plan.config.duration = Some(duration);
        self
    }

    /// VUs built before the first tick, so early iterations don't pay for construction.
    fn preallocated_vus(mut self, vus: usize) -> Self {
        self.plan.config.preallocated_vus = vus;
        self
    }

    /// Ceiling on concurrent iterations. Ticks that find every VU busy are dropped and
    /// counted, never queued.
    fn max_vus(mut self, vus: usize) -> Self {
        self.plan.config.max_vus = vus;
        self
    }

    fn drain(mut self, drain: DrainPolicy) -> Self {
        self.plan.config.drain = drain;
        self
    }

    /// Seed every VU's variant selection for reproducible mixes.
    fn seed(mut self, seed: u64) -> Self {
        self.plan.config.seed = Some(seed);
        self
    }
}

#[instrument(name="scenario", skip_all, fields(name=plan.config.name))]
pub(crate) async fn run_scenario(
    plan: Plan,
    aggregator: Arc<Aggregator>,
) -> Result<RunStatistics, RunError> {
    let Plan {
        config,
        setup,
        variants,
        requires,
    } = plan;
    info!("Running {} with config {:?}", config.name, &config);

    config.validate()?;
    let mixer = Arc::new(Mixer::new(variants)?);

    let start = Instant::now();
    let ctx = match &setup {
        Some(setup) => match setup.run(&aggregator).await {
            Ok(ctx) => ctx,
            Err(err) => {
                error!("Aborting before the first iteration: {err}");
                return Err(err.into());
            }
        },
        None => SharedContext::default(),
    };

    let factory = VuFactory {
        mixer,
        aggregator: aggregator.clone(),
        requires: requires.into(),
        seed: config.seed,
    };

    let report = Scheduler::new(&config, factory)?
        .run(Arc::new(ctx))
        .await;
    let elapsed = start.elapsed();

    let stats = RunStatistics {
        name: config.name.clone(),
        target_rate: config.target_rate.unwrap_or_default(),
        duration: config.duration.unwrap_or_default(),
        window: report.window,
        elapsed,
        peak_vus: report.peak_vus,
        spawned_vus: report.spawned_vus,
        snapshot: aggregator.snapshot(),
    };

    info!(
        "Scenario complete: {} dispatched at {:.2}/s, {} dropped, {} skipped",
        stats.snapshot.dispatched,
        stats.actual_rate(),
        stats.snapshot.saturation_drops,
        stats.snapshot.iteration_skips
    );

    Ok(stats)
}
