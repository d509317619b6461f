use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use mock_service::ServiceConfig;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

/// Open service on port 3002.
pub const OPEN_URL: &str = "http://127.0.0.1:3002";
/// Service capped at `LIMITED_RPS` on port 3003.
pub const LIMITED_URL: &str = "http://127.0.0.1:3003";
pub const LIMITED_RPS: u32 = 50;

#[allow(unused)]
pub async fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
            std::process::exit(1);
        }));

        FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_env_filter("tempo=debug,mock_service=debug,axum::rejection=trace")
            .init();

        let prometheus = PrometheusBuilder::new().install_recorder().unwrap();

        spawn_service(3002, ServiceConfig::default(), Some(prometheus));
        spawn_service(
            3003,
            ServiceConfig {
                max_rps: NonZeroU32::new(LIMITED_RPS),
                ..ServiceConfig::default()
            },
            None,
        );
    });

    for port in [3002, 3003] {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        for _ in 0..100 {
            if tokio::net::TcpStream::connect(addr).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

fn spawn_service(port: u16, config: ServiceConfig, prometheus: Option<PrometheusHandle>) {
    // The services outlive any single test's runtime.
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let addr = SocketAddr::from(([127, 0, 0, 1], port));
            if let Err(err) = mock_service::run(addr, config, prometheus).await {
                error!("Mock service on {addr} failed: {err}");
            }
        });
    });
}
