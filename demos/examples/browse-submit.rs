use demos::{browse_submit, default_config};
use tempo::prelude::*;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

/// Usage: `browse-submit [config.json]`
///
/// `TARGET_URL` (default `http://localhost:8080`) picks the service and `DURATION`
/// (e.g. `30s`) overrides the configured window.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("tempo=info,demos=info")
        .init();

    let mut config: ScenarioConfig = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => default_config(),
    };

    if let Ok(duration) = std::env::var("DURATION") {
        config.duration = Some(humantime::parse_duration(&duration)?);
    }

    let target = std::env::var("TARGET_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

    info!("Loading {target} with {config:?}");

    match browse_submit(&target, config).await {
        Ok(stats) => {
            println!("{stats}");
            Ok(())
        }
        Err(err) => {
            error!("Run aborted: {err}");
            std::process::exit(1);
        }
    }
}
