//! The browse/submit workload over HTTP: log in once, then mix authenticated browse and
//! submit calls at a fixed arrival rate.
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempo::prelude::*;

pub const BROWSE_METRIC: &str = "http_req_duration_browse";
pub const SUBMIT_METRIC: &str = "http_req_duration_submit";

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Clone, Debug)]
pub struct HttpRequest {
    method: Method,
    url: String,
    bearer: Option<String>,
    json: Option<Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            json: None,
        }
    }

    pub fn bearer(mut self, token: Option<&str>) -> Self {
        self.bearer = token.map(str::to_string);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }
}

impl Transport for HttpTransport {
    type Request = HttpRequest;
    type Error = reqwest::Error;

    async fn perform(&self, request: &HttpRequest) -> Result<Response, reqwest::Error> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }

        let res = builder.send().await?;
        let status = res.status().as_u16();
        let body = res.bytes().await?;
        Ok(Response::new(status, body.to_vec()))
    }
}

/// 1000 iterations/s for 10s on up to 1000 VUs, all of them built up front.
pub fn default_config() -> ScenarioConfig {
    ScenarioConfig {
        target_rate: Some(1_000.),
        duration: Some(Duration::from_secs(10)),
        preallocated_vus: 1_000,
        max_vus: 1_000,
        drain: DrainPolicy::Deadline(tempo::DEFAULT_DRAIN_GRACE),
        ..ScenarioConfig::new("main_scenario")
    }
}

pub fn browse_submit(base_url: &str, config: ScenarioConfig) -> Scenario {
    browse_submit_with(HttpTransport::default(), base_url, config)
}

pub fn browse_submit_with(
    transport: HttpTransport,
    base_url: &str,
    config: ScenarioConfig,
) -> Scenario {
    let transport = Arc::new(transport);
    let base = base_url.trim_end_matches('/');
    let login = HttpRequest::post(format!("{base}/login")).json(json!({ "username": "testuser" }));
    let browse_url = format!("{base}/browse");
    let submit_url = format!("{base}/submit");

    Scenario::from_config(config)
        .setup(
            Setup::request(transport.clone(), login)
                .check(Check::status("login status was 200", 200))
                .require("token"),
        )
        .require("token")
        .variant(
            Variant::request(BROWSE_METRIC, 0.8, transport.clone(), move |ctx| {
                HttpRequest::get(browse_url.clone()).bearer(ctx.get_str("token"))
            })
            .check(Check::status("browse status was 200", 200)),
        )
        .variant(
            Variant::request(SUBMIT_METRIC, 0.2, transport, move |ctx| {
                HttpRequest::post(submit_url.clone())
                    .bearer(ctx.get_str("token"))
                    .json(json!({ "data": "sample" }))
            })
            .check(Check::status("submit status was 200", 200)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = default_config();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.tick_period(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn scenario_keeps_config() {
        let scenario = browse_submit("http://localhost:8080/", default_config());
        assert_eq!(scenario.config().name, "main_scenario");
        assert_eq!(scenario.config().max_vus, 1_000);
    }

    #[test]
    fn requests_carry_auth() {
        let request = HttpRequest::post("http://localhost:8080/submit")
            .bearer(Some("abc"))
            .json(json!({ "data": "sample" }));
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.bearer.as_deref(), Some("abc"));
        assert!(request.json.is_some());
    }
}
