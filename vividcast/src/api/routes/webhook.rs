//! Payment provider webhook.
//!
//! Signature verification belongs to the fronting webhook layer; this
//! endpoint receives the decoded event and applies it idempotently.

use axum::{extract::State, routing::post, Json, Router};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{PaymentWebhookRequest, PaymentWebhookResponse};
use crate::api::server::AppState;
use crate::domain::plan::{BillingPeriod, PlanTier};

/// Create the webhook router.
pub fn router() -> Router<AppState> {
    Router::new().route("/payment", post(handle_payment_event))
}

#[utoipa::path(
    post,
    path = "/api/webhooks/payment",
    tag = "webhooks",
    request_body = PaymentWebhookRequest,
    responses(
        (status = 200, description = "Event processed", body = PaymentWebhookResponse),
        (status = 400, description = "Malformed event", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn handle_payment_event(
    State(state): State<AppState>,
    Json(event): Json<PaymentWebhookRequest>,
) -> ApiResult<Json<PaymentWebhookResponse>> {
    uuid::Uuid::parse_str(&event.owner_id)
        .map_err(|_| ApiError::bad_request("owner_id must be a UUID"))?;

    match event.event_type.as_str() {
        "subscription.paid" => {
            let tier = event
                .tier
                .as_deref()
                .and_then(PlanTier::parse)
                .ok_or_else(|| ApiError::bad_request("missing or unknown tier"))?;
            let period = event
                .period
                .as_deref()
                .and_then(BillingPeriod::parse)
                .ok_or_else(|| ApiError::bad_request("missing or unknown period"))?;
            let provider_txn_id = event
                .provider_txn_id
                .as_deref()
                .ok_or_else(|| ApiError::bad_request("missing provider_txn_id"))?;

            let applied = state
                .payment_service
                .on_payment_confirmed(&event.owner_id, tier, period, provider_txn_id)
                .await?;
            Ok(Json(PaymentWebhookResponse { applied }))
        }
        "subscription.canceled" => {
            let applied = state
                .payment_service
                .on_subscription_cancelled(&event.owner_id)
                .await?;
            Ok(Json(PaymentWebhookResponse { applied }))
        }
        other => {
            tracing::info!("ignoring unhandled payment event type: {other}");
            Ok(Json(PaymentWebhookResponse { applied: false }))
        }
    }
}
