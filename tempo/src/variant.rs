use crate::check::Check;
use crate::context::SharedContext;
use crate::transaction::{timed, ActionFuture, Outcome, Transport};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type Action = Arc<dyn Fn(Arc<SharedContext>) -> ActionFuture + Send + Sync>;

/// One weighted branch of the workload.
///
/// # Example
/// ```no_run
/// use tempo::prelude::*;
/// use std::time::Duration;
///
/// let browse = Variant::new("http_req_duration_browse", 0.8, |ctx| async move {
///     let _token = ctx.get_str("token");
///     Outcome::completed(200, Duration::from_millis(12), vec![])
/// })
/// .check(Check::status("browse status was 200", 200));
/// ```
#[derive(Clone)]
pub struct Variant {
    pub(crate) metric: Arc<str>,
    pub(crate) weight: f64,
    pub(crate) checks: Vec<Check>,
    action: Action,
}

impl Variant {
    pub fn new<F, Fut>(metric: &str, weight: f64, action: F) -> Self
    where
        F: Fn(Arc<SharedContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            metric: Arc::from(metric),
            weight,
            checks: vec![],
            action: Arc::new(move |ctx: Arc<SharedContext>| -> ActionFuture {
                Box::pin(action(ctx))
            }),
        }
    }

    /// A variant that builds a request from the shared context and sends it through
    /// `transport`, timing the round trip.
    pub fn request<T, B>(metric: &str, weight: f64, transport: Arc<T>, build: B) -> Self
    where
        T: Transport,
        B: Fn(&SharedContext) -> T::Request + Send + Sync + 'static,
    {
        Self::new(metric, weight, move |ctx| {
            let transport = transport.clone();
            let request = build(&ctx);
            async move { timed(transport.perform(&request)).await }
        })
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub(crate) fn invoke(&self, ctx: Arc<SharedContext>) -> ActionFuture {
        (self.action)(ctx)
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variant")
            .field("metric", &self.metric)
            .field("weight", &self.weight)
            .field("checks", &self.checks)
            .finish()
    }
}
