use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Instant;

/// What a [`Transport`] hands back for a request that reached the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Result of one request as seen by the engine.
///
/// Transport errors are folded into the outcome (`status` is `None` and `error` holds the
/// reason) so a failing request is data, never a fault that stops the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: Option<u16>,
    pub duration: Duration,
    pub body: Vec<u8>,
    pub error: Option<String>,
}

impl Outcome {
    pub fn completed(status: u16, duration: Duration, body: Vec<u8>) -> Self {
        Self {
            status: Some(status),
            duration,
            body,
            error: None,
        }
    }

    pub fn failed(duration: Duration, reason: impl Into<String>) -> Self {
        Self {
            status: None,
            duration,
            body: vec![],
            error: Some(reason.into()),
        }
    }

    /// The request never produced a response.
    pub fn is_failure(&self) -> bool {
        self.status.is_none()
    }

    /// A response arrived with a 2xx status.
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }

    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// The pluggable "perform one request" capability.
///
/// Implementations own their client (connection pools, TLS) and should be built once and
/// shared; the engine clones the surrounding `Arc`, never the transport.
pub trait Transport: Send + Sync + 'static {
    type Request: Send + Sync + 'static;
    type Error: Display + Send;

    fn perform(
        &self,
        request: &Self::Request,
    ) -> impl Future<Output = Result<Response, Self::Error>> + Send;
}

pub(crate) type ActionFuture = Pin<Box<dyn Future<Output = Outcome> + Send>>;

/// Measure a request future and convert its result into an [`Outcome`].
pub async fn timed<F, E>(request: F) -> Outcome
where
    F: Future<Output = Result<Response, E>>,
    E: Display,
{
    let start = Instant::now();
    let res = request.await;
    let elapsed = start.elapsed();

    match res {
        Ok(Response { status, body }) => Outcome::completed(status, elapsed, body),
        Err(err) => Outcome::failed(elapsed, err.to_string()),
    }
}
