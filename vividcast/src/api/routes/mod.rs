//! API route modules.

pub mod credits;
pub mod health;
pub mod plans;
pub mod videos;
pub mod webhook;

use axum::Router;

use crate::api::server::AppState;

/// Compose all API routes under `/api`.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/api/videos", videos::router())
        .nest("/api/credits", credits::router())
        .nest("/api/webhooks", webhook::router())
        .merge(plans::router())
        .merge(health::router())
        .merge(crate::api::openapi::router())
}
