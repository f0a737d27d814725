//! OpenAPI documentation.

use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use crate::api::error::ApiErrorResponse;
use crate::api::models::{
    BalanceResponse, GenerateVideoRequest, HealthResponse, LedgerEntryResponse, PaginationMeta,
    PaymentWebhookRequest, PaymentWebhookResponse, PlanResponse, RedeemRequest, RedeemResponse,
    SubmitResponse, TaskListResponse, TaskResponse, TransactionsResponse,
};
use crate::api::server::AppState;

/// OpenAPI document for the vividcast API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "vividcast API",
        description = "Task admission, scheduling and credit settlement for narrated-video generation"
    ),
    paths(
        crate::api::routes::videos::generate_video,
        crate::api::routes::videos::list_tasks,
        crate::api::routes::videos::get_task,
        crate::api::routes::videos::cancel_task,
        crate::api::routes::credits::get_balance,
        crate::api::routes::credits::get_transactions,
        crate::api::routes::credits::redeem_code,
        crate::api::routes::plans::list_plans,
        crate::api::routes::webhook::handle_payment_event,
        crate::api::routes::health::health,
    ),
    components(schemas(
        ApiErrorResponse,
        BalanceResponse,
        GenerateVideoRequest,
        HealthResponse,
        LedgerEntryResponse,
        PaginationMeta,
        PaymentWebhookRequest,
        PaymentWebhookResponse,
        PlanResponse,
        RedeemRequest,
        RedeemResponse,
        SubmitResponse,
        TaskListResponse,
        TaskResponse,
        TransactionsResponse,
    )),
    tags(
        (name = "videos", description = "Generation task management"),
        (name = "credits", description = "Balance, ledger and redemption"),
        (name = "plans", description = "Subscription plan registry"),
        (name = "webhooks", description = "Payment provider callbacks"),
        (name = "health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

/// Serve the generated document at `/api/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/api/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
