//! Subscription plan listing.

use axum::{routing::get, Json, Router};

use crate::api::error::ApiResult;
use crate::api::models::PlanResponse;
use crate::api::server::AppState;
use crate::domain::plan::all_plans;

/// Create the plans router.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/plans", get(list_plans))
}

#[utoipa::path(
    get,
    path = "/api/plans",
    tag = "plans",
    responses(
        (status = 200, description = "Available plans", body = [PlanResponse])
    )
)]
pub async fn list_plans() -> ApiResult<Json<Vec<PlanResponse>>> {
    Ok(Json(all_plans().iter().map(PlanResponse::from).collect()))
}
