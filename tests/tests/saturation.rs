use std::time::Duration;
use tempo::prelude::*;

fn slow_browse() -> Variant {
    Variant::new("browse", 1., |_| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Outcome::completed(200, Duration::from_millis(200), vec![])
    })
}

#[tracing_test::traced_test]
#[tokio::test]
#[ntest::timeout(10_000)]
async fn saturated_pool_warns_once_and_drops() {
    let stats = Scenario::new("saturated")
        .variant(slow_browse())
        .rate(50.)
        .duration(Duration::from_millis(500))
        .preallocated_vus(1)
        .max_vus(2)
        .await
        .unwrap();

    let snapshot = &stats.snapshot;
    assert!(snapshot.saturation_drops > 0);
    assert_eq!(stats.peak_vus, 2);
    assert_eq!(snapshot.count("browse"), snapshot.dispatched);
    assert!(logs_contain("All 2 VUs are busy"));
    logs_assert(|lines: &[&str]| {
        match lines.iter().filter(|line| line.contains("VUs are busy")).count() {
            1 => Ok(()),
            n => Err(format!("saturation warning logged {n} times")),
        }
    });
}
