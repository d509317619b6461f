use metrics_exporter_prometheus::PrometheusBuilder;
use mock_service::ServiceConfig;
use std::net::SocketAddr;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("mock_service=info,tower_http=info")
        .init();

    let prometheus = PrometheusBuilder::new().install_recorder()?;

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    mock_service::run(addr, ServiceConfig::from_env(), Some(prometheus)).await
}
