mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use demos::{browse_submit, HttpRequest, HttpTransport, BROWSE_METRIC, SUBMIT_METRIC};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempo::prelude::*;
    use tempo::SetupError;

    fn config(rate: f64, duration: Duration) -> ScenarioConfig {
        ScenarioConfig {
            target_rate: Some(rate),
            duration: Some(duration),
            preallocated_vus: 10,
            max_vus: 50,
            seed: Some(1),
            ..ScenarioConfig::new("browse_submit")
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(30_000)]
    async fn sustains_target_rate() {
        init().await;

        let stats = browse_submit(OPEN_URL, config(200., Duration::from_secs(2)))
            .await
            .unwrap();
        let snapshot = &stats.snapshot;

        assert!(
            (395..=401).contains(&snapshot.dispatched),
            "dispatched {}",
            snapshot.dispatched
        );
        assert_eq!(snapshot.saturation_drops, 0);
        assert_eq!(snapshot.request_failures, 0);
        assert_eq!(snapshot.checks["login status was 200"].passes, 1);

        let browse = snapshot.count(BROWSE_METRIC);
        let submit = snapshot.count(SUBMIT_METRIC);
        assert_eq!(browse + submit, snapshot.dispatched);
        assert_eq!(snapshot.checks["browse status was 200"].passes, browse);
        assert_eq!(snapshot.checks["submit status was 200"].passes, submit);

        let share = browse as f64 / (browse + submit) as f64;
        assert!((share - 0.8).abs() < 0.08, "browse share was {share}");
        assert!((stats.actual_rate() - 200.).abs() < 5., "{stats}");
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(10_000)]
    async fn failed_login_aborts_the_run() {
        init().await;

        let scenario = browse_submit(
            &format!("{OPEN_URL}/missing"),
            config(100., Duration::from_secs(1)),
        );
        let metrics = scenario.metrics();

        let res = scenario.await;

        assert!(matches!(res, Err(RunError::Setup(SetupError::Status(404)))));
        assert_eq!(metrics.snapshot().dispatched, 0);
        assert_eq!(metrics.snapshot().checks["login status was 200"].fails, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(10_000)]
    async fn rejected_requests_are_counted_not_fatal() {
        init().await;

        let stats = browse_submit(LIMITED_URL, config(200., Duration::from_secs(1)))
            .await
            .unwrap();
        let snapshot = &stats.snapshot;

        let fails = snapshot.checks["browse status was 200"].fails
            + snapshot.checks["submit status was 200"].fails;
        assert!(fails >= 50, "only {fails} rejections");
        assert_eq!(
            snapshot.count(BROWSE_METRIC) + snapshot.count(SUBMIT_METRIC),
            snapshot.dispatched
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(10_000)]
    async fn unknown_token_is_unauthorized() {
        init().await;

        let transport = Arc::new(HttpTransport::default());
        let browse_url = format!("{OPEN_URL}/browse");
        let stats = Scenario::from_config(config(50., Duration::from_secs(1)))
            .setup(
                Setup::new(|| async {
                    let body = json!({ "token": "forged" }).to_string();
                    Outcome::completed(200, Duration::ZERO, body.into_bytes())
                })
                .require("token"),
            )
            .variant(
                Variant::request("browse", 1., transport, move |ctx| {
                    HttpRequest::get(browse_url.clone()).bearer(ctx.get_str("token"))
                })
                .check(Check::status("browse status was 200", 200))
                .check(Check::status("browse status was 401", 401)),
            )
            .await
            .unwrap();

        let snapshot = &stats.snapshot;
        assert_eq!(snapshot.checks["browse status was 200"].passes, 0);
        assert_eq!(
            snapshot.checks["browse status was 401"].passes,
            snapshot.dispatched
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(10_000)]
    async fn metrics_page_reports_sessions() {
        init().await;

        let client = reqwest::Client::new();
        client
            .post(format!("{OPEN_URL}/login"))
            .json(&json!({ "username": "metrics" }))
            .send()
            .await
            .unwrap()
            .error_for_status()
            .unwrap();

        let page = client
            .get(format!("{OPEN_URL}/metrics"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        let active: usize = page
            .lines()
            .find_map(|line| line.strip_prefix("concurrent_connections "))
            .and_then(|count| count.trim().parse().ok())
            .unwrap();
        assert!(active >= 1);
    }
}
