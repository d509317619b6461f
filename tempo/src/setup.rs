use crate::aggregator::Aggregator;
use crate::check::Check;
use crate::context::SharedContext;
use crate::error::SetupError;
use crate::transaction::{timed, ActionFuture, Outcome, Transport};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

type SetupAction = Arc<dyn Fn() -> ActionFuture + Send + Sync>;

/// The one-off request that runs before any iteration and publishes the
/// [`SharedContext`] (a login returning a session token, for example).
#[derive(Clone)]
pub struct Setup {
    action: SetupAction,
    checks: Vec<Check>,
    required: Vec<String>,
}

impl Setup {
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self {
            action: Arc::new(move || -> ActionFuture { Box::pin(action()) }),
            checks: vec![],
            required: vec![],
        }
    }

    pub fn request<T: Transport>(transport: Arc<T>, request: T::Request) -> Self {
        let request = Arc::new(request);
        Self::new(move || {
            let transport = transport.clone();
            let request = request.clone();
            async move { timed(transport.perform(&request)).await }
        })
    }

    /// The response body must carry a usable value for `field`.
    pub fn require(mut self, field: &str) -> Self {
        self.required.push(field.to_string());
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub(crate) async fn run(&self, aggregator: &Aggregator) -> Result<SharedContext, SetupError> {
        let outcome = (self.action)().await;
        debug!(
            "Setup request finished in {:?} with status {:?}",
            outcome.duration, outcome.status
        );

        for check in &self.checks {
            aggregator.record_check(&check.evaluate(&outcome));
        }

        let status = match (outcome.status, outcome.error) {
            (Some(status), _) => status,
            (None, reason) => {
                return Err(SetupError::Request(
                    reason.unwrap_or_else(|| "no response".to_string()),
                ))
            }
        };

        if !(200..300).contains(&status) {
            return Err(SetupError::Status(status));
        }

        if self.required.is_empty() && outcome.body.iter().all(u8::is_ascii_whitespace) {
            info!("Setup complete with an empty shared context");
            return Ok(SharedContext::default());
        }

        let Value::Object(values) = serde_json::from_slice::<Value>(&outcome.body)? else {
            return Err(SetupError::NotAnObject);
        };
        let context = SharedContext::new(values);

        if let Some(missing) = self.required.iter().find(|field| !context.has(field)) {
            return Err(SetupError::MissingField(missing.clone()));
        }

        info!("Setup complete; shared context has {} field(s)", context.len());
        Ok(context)
    }
}

impl fmt::Debug for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setup")
            .field("checks", &self.checks)
            .field("required", &self.required)
            .finish()
    }
}
