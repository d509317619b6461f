mod timer;

use crate::aggregator::Aggregator;
use crate::context::SharedContext;
use crate::vu::{VirtualUser, VuFactory};
use std::sync::Arc;
use std::time::Duration;
use tempo_core::{ConfigError, DrainPolicy, ScenarioConfig};
use timer::Timer;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// What the pacing loop observed, beyond the aggregator's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SchedulerReport {
    /// Time from the first tick to the close of the scheduling window.
    pub window: Duration,
    pub peak_vus: usize,
    pub spawned_vus: usize,
}

/// Open-model pacing loop: starts one iteration per tick regardless of how long earlier
/// iterations take, bounded by `max_vus` concurrently in flight.
pub(crate) struct Scheduler {
    period: Duration,
    duration: Duration,
    preallocated_vus: usize,
    max_vus: usize,
    drain: DrainPolicy,
    factory: VuFactory,
    aggregator: Arc<Aggregator>,

    idle: Vec<VirtualUser>,
    in_flight: JoinSet<VirtualUser>,
    next_id: u64,
    peak_vus: usize,
}

impl Scheduler {
    pub fn new(config: &ScenarioConfig, factory: VuFactory) -> Result<Self, ConfigError> {
        config.validate()?;
        let period = config.tick_period().ok_or(ConfigError::MissingRate)?;
        let duration = config.duration.ok_or(ConfigError::MissingDuration)?;

        Ok(Self {
            period,
            duration,
            preallocated_vus: config.preallocated_vus,
            max_vus: config.max_vus,
            drain: config.drain,
            aggregator: factory.aggregator.clone(),
            factory,
            idle: vec![],
            in_flight: JoinSet::new(),
            next_id: 0,
            peak_vus: 0,
        })
    }

    pub async fn run(mut self, ctx: Arc<SharedContext>) -> SchedulerReport {
        while self.idle.len() < self.preallocated_vus {
            let vu = self.new_vu();
            self.idle.push(vu);
        }
        debug!("Pre-allocated {} VUs", self.idle.len());

        let mut timer = Timer::new(self.period);
        info!(
            "Dispatching every {timer} for {}, up to {} VUs",
            humantime::format_duration(self.duration),
            self.max_vus
        );

        let start = Instant::now();
        let deadline = tokio::time::sleep(self.duration);
        tokio::pin!(deadline);

        // NOTE: Order matters. The window closes before any tick due at the same instant,
        // and finished VUs return to the pool before the next dispatch decision.
        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => break,
                Some(joined) = self.in_flight.join_next() => self.reclaim(joined),
                tick = timer.tick() => {
                    trace!("Tick {tick}");
                    self.dispatch(&ctx);
                }
            }
        }

        let window = start.elapsed();
        info!(
            "Scheduling window closed after {}; draining {} in-flight iterations",
            humantime::format_duration(window),
            self.in_flight.len()
        );

        self.drain().await;

        SchedulerReport {
            window,
            peak_vus: self.peak_vus,
            spawned_vus: self.next_id as usize,
        }
    }

    fn dispatch(&mut self, ctx: &Arc<SharedContext>) {
        if self.in_flight.len() >= self.max_vus {
            if self.aggregator.record_saturation_drop() {
                warn!(
                    "All {} VUs are busy; dropping dispatches until one frees up",
                    self.max_vus
                );
            } else {
                trace!("Saturated; dispatch dropped");
            }
            return;
        }

        let mut vu = match self.idle.pop() {
            Some(vu) => vu,
            None => self.new_vu(),
        };

        self.aggregator.record_dispatch();
        let ctx = ctx.clone();
        self.in_flight.spawn(async move {
            vu.iterate(&ctx).await;
            vu
        });
        self.peak_vus = self.peak_vus.max(self.in_flight.len());
    }

    fn new_vu(&mut self) -> VirtualUser {
        let vu = self.factory.spawn(self.next_id);
        self.next_id += 1;
        if self.next_id as usize > self.preallocated_vus {
            debug!("Growing VU pool to {}", self.next_id);
        }
        vu
    }

    fn reclaim(&mut self, joined: Result<VirtualUser, JoinError>) {
        match joined {
            Ok(vu) => {
                trace!("VU {} returned to the pool", vu.id());
                self.idle.push(vu);
            }
            Err(err) if err.is_panic() => {
                error!("VU task panicked; it will not be reused: {err}");
            }
            Err(err) => {
                debug!("VU task ended without completing: {err}");
            }
        }
    }

    async fn drain(&mut self) {
        match self.drain {
            DrainPolicy::Graceful => {
                while let Some(joined) = self.in_flight.join_next().await {
                    self.reclaim(joined);
                }
            }
            DrainPolicy::Deadline(grace) => {
                let finished = tokio::time::timeout(grace, async {
                    while let Some(joined) = self.in_flight.join_next().await {
                        self.reclaim(joined);
                    }
                })
                .await;

                if finished.is_err() {
                    self.in_flight.abort_all();
                    let mut cancelled = 0;
                    while let Some(joined) = self.in_flight.join_next().await {
                        match joined {
                            Err(err) if err.is_cancelled() => cancelled += 1,
                            other => self.reclaim(other),
                        }
                    }

                    warn!(
                        "Cancelled {cancelled} iterations still running after the {} grace period",
                        humantime::format_duration(grace)
                    );
                    self.aggregator.record_cancelled(cancelled);
                }
            }
        }
    }
}
