//! API server setup and configuration.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::routes;
use crate::billing::PaymentService;
use crate::config::Settings;
use crate::database::repositories::{
    AccountRepository, LedgerRepository, SubscriptionRepository,
};
use crate::error::Result;
use crate::ledger::Ledger;
use crate::scheduler::Scheduler;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8742,
            enable_cors: true,
        }
    }
}

impl ApiServerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            bind_address: settings.bind_address.clone(),
            port: settings.port,
            enable_cors: settings.enable_cors,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Scheduler: admission, lifecycle, cancellation
    pub scheduler: Arc<Scheduler>,
    /// Credit ledger service
    pub ledger: Arc<Ledger>,
    /// Ledger read repository for transaction listings
    pub ledger_repo: Arc<dyn LedgerRepository>,
    /// Account repository
    pub account_repo: Arc<dyn AccountRepository>,
    /// Subscription repository
    pub subscription_repo: Arc<dyn SubscriptionRepository>,
    /// Payment confirmation service
    pub payment_service: Arc<PaymentService>,
}

/// Build the application router.
pub fn build_router(state: AppState, config: &ApiServerConfig) -> Router {
    let mut router = routes::router().layer(TraceLayer::new_for_http());

    if config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}

/// Serve the API until the cancellation token fires.
pub async fn serve(
    state: AppState,
    config: ApiServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = build_router(state, &config);
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("API listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
