//! Credit and redemption routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/api/credits/balance` | Current balance and plan |
//! | GET | `/api/credits/transactions` | Ledger entries |
//! | POST | `/api/credits/redeem` | Redeem a code |

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::error::ApiResult;
use crate::api::extract::OwnerId;
use crate::api::models::{
    BalanceResponse, LedgerEntryResponse, RedeemRequest, RedeemResponse, TransactionParams,
    TransactionsResponse,
};
use crate::api::server::AppState;

/// Create the credits router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/balance", get(get_balance))
        .route("/transactions", get(get_transactions))
        .route("/redeem", post(redeem_code))
}

#[utoipa::path(
    get,
    path = "/api/credits/balance",
    tag = "credits",
    responses(
        (status = 200, description = "Balance", body = BalanceResponse)
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    owner: OwnerId,
) -> ApiResult<Json<BalanceResponse>> {
    let account = state.account_repo.get_or_create(owner.as_str()).await?;
    let reserved = state.ledger.outstanding(owner.as_str());
    let subscription = state
        .subscription_repo
        .get_active_for_owner(owner.as_str())
        .await?;

    Ok(Json(BalanceResponse {
        owner_id: account.owner_id,
        credit_balance: account.credit_balance,
        available_balance: account.credit_balance - reserved,
        reserved_credits: reserved,
        plan_tier: account.plan_tier,
        has_active_subscription: subscription.is_some(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/credits/transactions",
    tag = "credits",
    params(TransactionParams),
    responses(
        (status = 200, description = "Ledger entries", body = TransactionsResponse)
    )
)]
pub async fn get_transactions(
    State(state): State<AppState>,
    owner: OwnerId,
    Query(params): Query<TransactionParams>,
) -> ApiResult<Json<TransactionsResponse>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);

    let entries = state
        .ledger_repo
        .list_entries(owner.as_str(), limit, offset)
        .await?;
    let current_balance = state.ledger.balance(owner.as_str()).await?;

    Ok(Json(TransactionsResponse {
        transactions: entries.iter().map(LedgerEntryResponse::from).collect(),
        current_balance,
    }))
}

#[utoipa::path(
    post,
    path = "/api/credits/redeem",
    tag = "credits",
    request_body = RedeemRequest,
    responses(
        (status = 200, description = "Code redeemed", body = RedeemResponse),
        (status = 400, description = "Invalid code", body = crate::api::error::ApiErrorResponse),
        (status = 409, description = "Code already used", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn redeem_code(
    State(state): State<AppState>,
    owner: OwnerId,
    Json(request): Json<RedeemRequest>,
) -> ApiResult<Json<RedeemResponse>> {
    let amount = state.ledger.redeem(owner.as_str(), &request.code).await?;
    let balance_after = state.ledger.balance(owner.as_str()).await?;
    Ok(Json(RedeemResponse {
        amount,
        balance_after,
    }))
}
