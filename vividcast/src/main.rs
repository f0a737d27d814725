use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use vividcast::api::{self, ApiServerConfig};
use vividcast::config::Settings;
use vividcast::pipeline::SimulatedPipeline;
use vividcast::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vividcast::logging::init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let settings = Settings::from_env_or_default()?;

    // Real deployments plug the external processing pipeline in here; the
    // simulated pipeline walks the same milestones without external calls.
    let container = Arc::new(ServiceContainer::new(&settings, Arc::new(SimulatedPipeline::default())).await?);

    let report = container.start().await?;
    tracing::info!(
        settlements = report.settlements_retried,
        interrupted = report.interrupted_failed,
        requeued = report.pending_requeued,
        "vividcast initialized"
    );

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let state = container.app_state();
    let config = ApiServerConfig::from_settings(&settings);
    api::server::serve(state, config, shutdown).await?;

    container.shutdown().await;

    Ok(())
}
