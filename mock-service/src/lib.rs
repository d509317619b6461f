use axum::{
    body::Bytes,
    debug_handler,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt::Write;
use std::net::SocketAddr;
use std::{
    num::NonZeroU32,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::{Duration, Instant},
};
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, error, info, warn};

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(120);

type Rejection = (StatusCode, &'static str);

/// Knobs for the simulated per-request cost, read from the environment by the binary.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceConfig {
    pub cpu_iterations: u64,
    pub mem_mb: usize,
    pub session_ttl: Duration,
    /// Requests beyond this rate are answered with 503.
    pub max_rps: Option<NonZeroU32>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cpu_iterations: 0,
            mem_mb: 0,
            session_ttl: DEFAULT_SESSION_TTL,
            max_rps: None,
        }
    }
}

impl ServiceConfig {
    /// `LOAD_CPU_ITERATIONS`, `LOAD_MEM_MB`, `SESSION_TTL_SECS` and `MAX_RPS`; unset or
    /// unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok()?.parse().ok()
        }

        let defaults = Self::default();
        Self {
            cpu_iterations: var("LOAD_CPU_ITERATIONS").unwrap_or(defaults.cpu_iterations),
            mem_mb: var("LOAD_MEM_MB").unwrap_or(defaults.mem_mb),
            session_ttl: var("SESSION_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            max_rps: var("MAX_RPS"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<Sessions>,
    load: Arc<Load>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    prometheus: Option<PrometheusHandle>,
}

impl AppState {
    fn admit(&self) -> Result<(), Rejection> {
        match &self.limiter {
            Some(limiter) if limiter.check().is_err() => {
                counter!("mock_service_rejected_total").increment(1);
                Err((StatusCode::SERVICE_UNAVAILABLE, "Rate limit exceeded"))
            }
            _ => Ok(()),
        }
    }

    /// The username behind a live bearer session.
    fn authorize(&self, headers: &HeaderMap) -> Result<String, Rejection> {
        bearer_token(headers)
            .and_then(|token| self.sessions.username(token, Instant::now()))
            .ok_or((StatusCode::UNAUTHORIZED, "Unauthorized"))
    }
}

pub fn app(config: ServiceConfig, prometheus: Option<PrometheusHandle>) -> Router {
    if config.mem_mb > 0 {
        info!("Pre-allocating {} MB of memory", config.mem_mb);
    }

    let state = AppState {
        sessions: Arc::new(Sessions::new(config.session_ttl)),
        load: Arc::new(Load::new(config.cpu_iterations, config.mem_mb)),
        limiter: config.max_rps.map(|rps| Arc::new(rate_limiter(rps))),
        prometheus,
    };

    Router::new()
        .route("/login", post(login))
        .route("/browse", get(browse))
        .route("/submit", post(submit))
        .route("/metrics", get(metrics_page))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(
    addr: SocketAddr,
    config: ServiceConfig,
    prometheus: Option<PrometheusHandle>,
) -> anyhow::Result<()> {
    info!("Load simulation settings: {config:?}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");
    axum::serve(listener, app(config, prometheus)).await?;
    Ok(())
}

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
}

#[debug_handler]
async fn login(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, Rejection> {
    state.admit()?;
    state.load.simulate();

    let creds: Credentials = serde_json::from_slice(&body)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid request body"))?;

    if creds.username.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Username is required"));
    }

    let token = state.sessions.create(&creds.username, Instant::now());
    counter!("mock_service_logins_total").increment(1);
    debug!("User '{}' logged in", creds.username);

    Ok(Json(json!({ "token": token })))
}

#[debug_handler]
async fn browse(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, Rejection> {
    state.admit()?;
    let user = state.authorize(&headers)?;
    state.load.simulate();
    counter!("mock_service_requests_total", "route" => "browse").increment(1);
    debug!("User '{user}' browsed");

    Ok(Json(json!({
        "status": "success",
        "data": ["Product A", "Product B", "Product C"],
    })))
}

#[debug_handler]
async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, Rejection> {
    state.admit()?;
    let user = state.authorize(&headers)?;
    state.load.simulate();

    let data: Value = serde_json::from_slice(&body)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid request body"))?;
    counter!("mock_service_requests_total", "route" => "submit").increment(1);
    debug!("Submit from '{user}' accepted: {data}");

    Ok(Json(json!({
        "status": "success",
        "message": "Data submitted successfully",
    })))
}

#[debug_handler]
async fn metrics_page(State(state): State<AppState>) -> String {
    let active = state.sessions.prune(Instant::now());

    let mut page = String::new();
    let _ = writeln!(page, "# HELP concurrent_connections The number of active user sessions.");
    let _ = writeln!(page, "# TYPE concurrent_connections gauge");
    let _ = writeln!(page, "concurrent_connections {active}");

    if let Some(handle) = &state.prometheus {
        page.push_str(&handle.render());
    }

    page
}

/// Extract `<token>` from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
}

struct Session {
    username: String,
    expires_at: Instant,
}

/// Login sessions keyed by token.
pub struct Sessions {
    ttl: Duration,
    map: RwLock<HashMap<String, Session>>,
}

impl Sessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(&self, username: &str, now: Instant) -> String {
        let token = format!("{:032x}", rand::random::<u128>());
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                token.clone(),
                Session {
                    username: username.to_string(),
                    expires_at: now + self.ttl,
                },
            );
        token
    }

    pub fn is_valid(&self, token: &str, now: Instant) -> bool {
        self.username(token, now).is_some()
    }

    /// `None` for unknown or expired tokens.
    pub fn username(&self, token: &str, now: Instant) -> Option<String> {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .filter(|session| now < session.expires_at)
            .map(|session| session.username.clone())
    }

    /// Drop expired sessions and return how many remain.
    pub fn prune(&self, now: Instant) -> usize {
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, session| now < session.expires_at);
        map.len()
    }
}

/// Synthetic CPU and memory cost paid by every request.
struct Load {
    cpu_iterations: u64,
    memory: Option<Mutex<Vec<u8>>>,
}

impl Load {
    fn new(cpu_iterations: u64, mem_mb: usize) -> Self {
        Self {
            cpu_iterations,
            memory: (mem_mb > 0).then(|| Mutex::new(vec![0; mem_mb * 1024 * 1024])),
        }
    }

    fn simulate(&self) {
        let mut acc = 0.;
        for i in 0..self.cpu_iterations {
            acc += (i as f64).sqrt();
        }
        std::hint::black_box(acc);

        let Some(memory) = &self.memory else {
            return;
        };
        let mut memory = memory.lock().unwrap_or_else(PoisonError::into_inner);
        // Touch one byte per KiB to keep the store paged in.
        for i in (0..memory.len()).step_by(1024) {
            memory[i] = (i % 256) as u8;
        }
    }
}

/** Utils **/

pub fn rate_limiter(rps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(rps))
}
