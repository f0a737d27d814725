//! API request and response models.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::database::models::{LedgerEntryDbModel, TaskDbModel};
use crate::domain::plan::Plan;

/// Request body for submitting a generation task.
///
/// Exactly one of `file_ref`, `url`, `text` must be set; when several are
/// present the priority is file over url over text.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GenerateVideoRequest {
    /// Raw text content.
    pub text: Option<String>,
    /// Storage reference of an uploaded document (.docx, .pdf, .txt, .md).
    pub file_ref: Option<String>,
    /// Web page to narrate.
    pub url: Option<String>,
    /// Target language code (default: en).
    #[serde(default = "default_language")]
    pub language: String,
    /// Narration voice (default: Achernar).
    #[serde(default = "default_voice")]
    pub voice: String,
}

fn default_language() -> String {
    crate::domain::language::DEFAULT_LANGUAGE.to_string()
}

fn default_voice() -> String {
    crate::domain::language::DEFAULT_VOICE.to_string()
}

/// Response for a submitted task.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResponse {
    pub task_id: String,
}

/// A task as returned by the API. The stored input text is omitted; `name`
/// carries a short preview instead.
#[derive(Debug, Serialize, ToSchema)]
pub struct TaskResponse {
    pub id: String,
    pub name: String,
    pub input_kind: String,
    pub source_url: Option<String>,
    pub input_file_ref: Option<String>,
    pub output_ref: Option<String>,
    pub error_message: Option<String>,
    pub target_language: String,
    pub voice: String,
    pub status: String,
    pub progress: i64,
    pub reserved_credits: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&TaskDbModel> for TaskResponse {
    fn from(task: &TaskDbModel) -> Self {
        Self {
            id: task.id.clone(),
            name: task.display_name(),
            input_kind: task.input_kind.clone(),
            source_url: task.source_url.clone(),
            input_file_ref: task.input_file_ref.clone(),
            output_ref: task.output_ref.clone(),
            error_message: task.error_message.clone(),
            target_language: task.target_language.clone(),
            voice: task.voice.clone(),
            status: task.status.clone(),
            progress: task.progress,
            reserved_credits: task.reserved_credits,
            created_at: task.created_at.clone(),
            updated_at: task.updated_at.clone(),
        }
    }
}

/// Query parameters for the task listing.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskListParams {
    /// Page number, starting from 1.
    pub page: Option<u32>,
    /// Items per page (1-100).
    pub page_size: Option<u32>,
    /// Status filter (pending, processing, completed, failed, cancelled).
    pub status: Option<String>,
}

/// Pagination metadata for listings.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaginationMeta {
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: u32, page_size: u32, total: i64) -> Self {
        let total_pages = (total + page_size as i64 - 1) / page_size as i64;
        Self {
            page,
            page_size,
            total,
            total_pages,
            has_next: (page as i64) < total_pages,
            has_prev: page > 1,
        }
    }
}

/// Task listing response.
#[derive(Debug, Serialize, ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskResponse>,
    pub pagination: PaginationMeta,
}

/// Credit balance response.
#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub owner_id: String,
    /// Durable balance.
    pub credit_balance: i64,
    /// Balance available for new submissions (balance minus holds).
    pub available_balance: i64,
    /// Sum of outstanding reservations.
    pub reserved_credits: i64,
    pub plan_tier: String,
    pub has_active_subscription: bool,
}

/// A ledger entry as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct LedgerEntryResponse {
    pub id: String,
    pub kind: String,
    pub amount: i64,
    pub balance_after: i64,
    pub task_id: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
}

impl From<&LedgerEntryDbModel> for LedgerEntryResponse {
    fn from(entry: &LedgerEntryDbModel) -> Self {
        Self {
            id: entry.id.clone(),
            kind: entry.kind.clone(),
            amount: entry.amount,
            balance_after: entry.balance_after,
            task_id: entry.task_id.clone(),
            description: entry.description.clone(),
            created_at: entry.created_at.clone(),
        }
    }
}

/// Query parameters for the transaction listing.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransactionParams {
    /// Number of records to return (1-100, default 50).
    pub limit: Option<i64>,
    /// Offset (default 0).
    pub offset: Option<i64>,
}

/// Transaction listing response.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionsResponse {
    pub transactions: Vec<LedgerEntryResponse>,
    pub current_balance: i64,
}

/// Redeem code request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RedeemRequest {
    pub code: String,
}

/// Redeem code response.
#[derive(Debug, Serialize, ToSchema)]
pub struct RedeemResponse {
    pub amount: i64,
    pub balance_after: i64,
}

/// A subscription plan as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlanResponse {
    pub tier: String,
    pub name: String,
    pub monthly_credits: i64,
    pub concurrency_limit: u32,
    pub monthly_price_cents: u32,
    pub yearly_monthly_price_cents: u32,
}

impl From<&Plan> for PlanResponse {
    fn from(plan: &Plan) -> Self {
        Self {
            tier: plan.tier.as_str().to_string(),
            name: plan.name.to_string(),
            monthly_credits: plan.monthly_credits,
            concurrency_limit: plan.concurrency_limit,
            monthly_price_cents: plan.monthly_price_cents,
            yearly_monthly_price_cents: plan.yearly_monthly_price_cents,
        }
    }
}

/// Payment webhook payload, decoded and verified by the fronting layer.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentWebhookRequest {
    /// Event type: "subscription.paid" or "subscription.canceled".
    pub event_type: String,
    pub owner_id: String,
    /// Plan tier (BASIC, PRO); required for paid events.
    pub tier: Option<String>,
    /// Billing period (MONTHLY, YEARLY); required for paid events.
    pub period: Option<String>,
    /// Provider transaction id; idempotency key for paid events.
    pub provider_txn_id: Option<String>,
}

/// Payment webhook response.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentWebhookResponse {
    pub applied: bool,
}

/// Health response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub pending_tasks: i64,
}
