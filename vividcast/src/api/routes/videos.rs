//! Video generation task routes.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/api/videos/generate` | Submit a generation task |
//! | GET | `/api/videos/tasks` | List the caller's tasks |
//! | GET | `/api/videos/tasks/{id}` | Get one task |
//! | POST | `/api/videos/tasks/{id}/cancel` | Cancel a task |

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::OwnerId;
use crate::api::models::{
    GenerateVideoRequest, PaginationMeta, SubmitResponse, TaskListParams, TaskListResponse,
    TaskResponse,
};
use crate::api::server::AppState;
use crate::database::models::{Pagination, TaskFilters, TaskInput, TaskStatus};

/// Create the videos router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generate_video))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/cancel", post(cancel_task))
}

/// Resolve the submitted descriptor; files win over URLs over raw text.
fn resolve_input(request: &GenerateVideoRequest) -> Option<TaskInput> {
    if let Some(file_ref) = request.file_ref.as_ref().filter(|v| !v.trim().is_empty()) {
        return Some(TaskInput::File(file_ref.clone()));
    }
    if let Some(url) = request.url.as_ref().filter(|v| !v.trim().is_empty()) {
        return Some(TaskInput::Url(url.clone()));
    }
    request
        .text
        .as_ref()
        .filter(|v| !v.trim().is_empty())
        .map(|text| TaskInput::Text(text.clone()))
}

#[utoipa::path(
    post,
    path = "/api/videos/generate",
    tag = "videos",
    request_body = GenerateVideoRequest,
    responses(
        (status = 200, description = "Task admitted", body = SubmitResponse),
        (status = 402, description = "Insufficient credit", body = crate::api::error::ApiErrorResponse),
        (status = 429, description = "Concurrency limit exceeded", body = crate::api::error::ApiErrorResponse),
        (status = 422, description = "Validation error", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn generate_video(
    State(state): State<AppState>,
    owner: OwnerId,
    Json(request): Json<GenerateVideoRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let Some(input) = resolve_input(&request) else {
        return Err(ApiError::bad_request(
            "At least one of text, file_ref, or url must be provided",
        ));
    };

    let task = state
        .scheduler
        .submit(owner.as_str(), input, &request.language, &request.voice)
        .await?;

    Ok(Json(SubmitResponse { task_id: task.id }))
}

#[utoipa::path(
    get,
    path = "/api/videos/tasks",
    tag = "videos",
    params(TaskListParams),
    responses(
        (status = 200, description = "Task list", body = TaskListResponse)
    )
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    owner: OwnerId,
    Query(params): Query<TaskListParams>,
) -> ApiResult<Json<TaskListResponse>> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(
            TaskStatus::parse(&raw.to_ascii_uppercase())
                .ok_or_else(|| ApiError::bad_request(format!("unknown status: {raw}")))?,
        ),
        None => None,
    };

    let pagination = Pagination {
        page: params.page.unwrap_or(1),
        page_size: params.page_size.unwrap_or(10),
    }
    .clamped();
    let filters = TaskFilters { status };

    let (tasks, total) = state
        .scheduler
        .list_tasks(owner.as_str(), &filters, pagination)
        .await?;

    Ok(Json(TaskListResponse {
        tasks: tasks.iter().map(TaskResponse::from).collect(),
        pagination: PaginationMeta::new(pagination.page, pagination.page_size, total),
    }))
}

#[utoipa::path(
    get,
    path = "/api/videos/tasks/{id}",
    tag = "videos",
    params(("id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task detail", body = TaskResponse),
        (status = 404, description = "Unknown task", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn get_task(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskResponse>> {
    let task = state.scheduler.get_task(&id, owner.as_str()).await?;
    Ok(Json(TaskResponse::from(&task)))
}

#[utoipa::path(
    post,
    path = "/api/videos/tasks/{id}/cancel",
    tag = "videos",
    params(("id" = String, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task cancelled", body = TaskResponse),
        (status = 404, description = "Unknown task", body = crate::api::error::ApiErrorResponse),
        (status = 409, description = "Task already finished", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn cancel_task(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskResponse>> {
    let task = state.scheduler.cancel(&id, owner.as_str()).await?;
    Ok(Json(TaskResponse::from(&task)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        text: Option<&str>,
        file_ref: Option<&str>,
        url: Option<&str>,
    ) -> GenerateVideoRequest {
        GenerateVideoRequest {
            text: text.map(String::from),
            file_ref: file_ref.map(String::from),
            url: url.map(String::from),
            language: "en".to_string(),
            voice: "Achernar".to_string(),
        }
    }

    #[test]
    fn test_input_priority_file_over_url_over_text() {
        let all = request(Some("t"), Some("inputs/a.pdf"), Some("https://x"));
        assert!(matches!(resolve_input(&all), Some(TaskInput::File(_))));

        let url_text = request(Some("t"), None, Some("https://x"));
        assert!(matches!(resolve_input(&url_text), Some(TaskInput::Url(_))));

        let text_only = request(Some("t"), None, None);
        assert!(matches!(resolve_input(&text_only), Some(TaskInput::Text(_))));

        assert!(resolve_input(&request(None, None, None)).is_none());
        assert!(resolve_input(&request(Some("   "), None, None)).is_none());
    }
}
