use crate::aggregator::{Aggregator, Sample};
use crate::context::SharedContext;
use crate::mixer::Mixer;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// A single concurrent execution unit. Owned by exactly one task while an iteration is in
/// flight, and by the scheduler's idle pool otherwise.
pub(crate) struct VirtualUser {
    id: u64,
    rng: SmallRng,
    mixer: Arc<Mixer>,
    aggregator: Arc<Aggregator>,
    requires: Arc<[String]>,
}

/// Everything a scheduler needs to mint new virtual users.
#[derive(Clone)]
pub(crate) struct VuFactory {
    pub mixer: Arc<Mixer>,
    pub aggregator: Arc<Aggregator>,
    pub requires: Arc<[String]>,
    pub seed: Option<u64>,
}

impl VuFactory {
    pub fn spawn(&self, id: u64) -> VirtualUser {
        let rng = match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(id)),
            None => SmallRng::from_entropy(),
        };

        VirtualUser {
            id,
            rng,
            mixer: self.mixer.clone(),
            aggregator: self.aggregator.clone(),
            requires: self.requires.clone(),
        }
    }
}

impl VirtualUser {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run one iteration against `ctx`.
    ///
    /// The only suspension point is the variant's action. Exactly one sample is submitted
    /// per iteration that reaches it, whatever the checks or the transport say.
    pub async fn iterate(&mut self, ctx: &Arc<SharedContext>) {
        if let Some(missing) = self.requires.iter().find(|key| !ctx.has(key)) {
            if self.aggregator.record_skip() {
                warn!(
                    "VU {} skipping iteration: shared context has no usable '{missing}'",
                    self.id
                );
            } else {
                debug!("VU {} skipping iteration: missing '{missing}'", self.id);
            }
            return;
        }

        let variant = self.mixer.draw(&mut self.rng);
        trace!("VU {} running {}", self.id, variant.metric());

        let outcome = variant.invoke(ctx.clone()).await;

        for check in &variant.checks {
            self.aggregator.record_check(&check.evaluate(&outcome));
        }

        if let Some(reason) = &outcome.error {
            debug!("VU {} request for {} failed: {reason}", self.id, variant.metric());
            self.aggregator.record_request_failure();
        }

        self.aggregator.submit(Sample {
            metric: variant.metric.clone(),
            duration: outcome.duration,
            timestamp: Instant::now(),
        });
        self.aggregator.record_completion();
    }
}
