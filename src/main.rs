mod api;
mod branch;
mod config;
mod portal;

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use api::ApiState;
use branch::BranchDirectory;
use config::AppConfig;
use portal::PortalClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env());
    info!("Patient lookup service starting...");

    let status = portal::engine_status(&config);
    if status.browser_found {
        info!(
            "Browser binary: {:?}",
            status
                .configured_path
                .as_ref()
                .or(status.detected_path.as_ref())
        );
    } else {
        warn!("No Chrome/Chromium binary found; lookups will fail until one is installed");
    }

    let state = ApiState {
        config: config.clone(),
        branches: Arc::new(BranchDirectory::new()),
        lookup: Arc::new(PortalClient::new(config.clone())),
    };

    api::server::serve(state, config.port).await
}
