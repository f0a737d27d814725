//! Task database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Task database model.
/// One row per generation request, retained after the task finishes.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TaskDbModel {
    pub id: String,
    pub owner_id: String,
    /// Input kind: TEXT, FILE, URL
    pub input_kind: String,
    /// Text input, or text extracted from the file/URL by the pipeline
    pub original_text: Option<String>,
    /// URL input if provided
    pub source_url: Option<String>,
    /// Storage reference for an uploaded input file
    pub input_file_ref: Option<String>,
    pub target_language: String,
    pub voice: String,
    /// Status: PENDING, PROCESSING, COMPLETED, FAILED, CANCELLED
    pub status: String,
    /// Progress: 0-100, non-decreasing while PROCESSING
    pub progress: i64,
    /// Storage reference for the rendered video, set only on COMPLETED
    pub output_ref: Option<String>,
    /// Error description, set only on FAILED
    pub error_message: Option<String>,
    /// Credits held against the owner's balance; immutable once set
    pub reserved_credits: i64,
    /// Set when the ledger settlement for this task has been applied
    pub settled_at: Option<String>,
    /// ISO 8601 timestamps
    pub created_at: String,
    pub updated_at: String,
}

impl TaskDbModel {
    pub fn new(
        owner_id: impl Into<String>,
        input: TaskInput,
        target_language: impl Into<String>,
        voice: impl Into<String>,
        reserved_credits: i64,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        let (input_kind, original_text, source_url, input_file_ref) = input.into_columns();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            input_kind,
            original_text,
            source_url,
            input_file_ref,
            target_language: target_language.into(),
            voice: voice.into(),
            status: TaskStatus::Pending.as_str().to_string(),
            progress: 0,
            output_ref: None,
            error_message: None,
            reserved_credits,
            settled_at: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Preview name for listings: the first characters of the input text.
    pub fn display_name(&self) -> String {
        match &self.original_text {
            Some(text) if text.chars().count() > 30 => {
                let head: String = text.chars().take(30).collect();
                format!("{head}...")
            }
            Some(text) => text.clone(),
            None => self
                .source_url
                .clone()
                .or_else(|| self.input_file_ref.clone())
                .unwrap_or_default(),
        }
    }
}

/// Submitted input descriptor. Exactly one variant per task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskInput {
    Text(String),
    File(String),
    Url(String),
}

impl TaskInput {
    fn into_columns(self) -> (String, Option<String>, Option<String>, Option<String>) {
        match self {
            TaskInput::Text(text) => (InputKind::Text.as_str().to_string(), Some(text), None, None),
            TaskInput::File(file_ref) => {
                (InputKind::File.as_str().to_string(), None, None, Some(file_ref))
            }
            TaskInput::Url(url) => (InputKind::Url.as_str().to_string(), None, Some(url), None),
        }
    }

    pub fn kind(&self) -> InputKind {
        match self {
            TaskInput::Text(_) => InputKind::Text,
            TaskInput::File(_) => InputKind::File,
            TaskInput::Url(_) => InputKind::Url,
        }
    }
}

/// Input kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputKind {
    Text,
    File,
    Url,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::File => "FILE",
            Self::Url => "URL",
        }
    }
}

/// Task status values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Admitted and waiting for an executor.
    Pending,
    /// Picked up by an executor; the pipeline is running.
    Processing,
    /// Pipeline finished; output reference attached, reservation consumed.
    Completed,
    /// Pipeline failed; error attached, reservation released.
    Failed,
    /// Cancelled by the owner before reaching a terminal state.
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Filters for task listings.
#[derive(Debug, Clone, Default)]
pub struct TaskFilters {
    pub status: Option<TaskStatus>,
}

/// Offset/limit pagination for listings.
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
        }
    }
}

impl Pagination {
    /// Clamp to the 1-100 page size range accepted by the API.
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        ((self.page.max(1) - 1) as i64) * (self.page_size as i64)
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}
