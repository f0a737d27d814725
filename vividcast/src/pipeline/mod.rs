//! Pipeline collaborator boundary.
//!
//! The document extraction, scripting, TTS and rendering stages live behind
//! [`VideoPipeline`]: an opaque long-running call that emits progress events
//! on a channel and returns a single terminal result. The engine never
//! inspects what the pipeline does, only meters and schedules it.

pub mod progress;
pub mod simulated;
pub mod worker_pool;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::database::models::TaskDbModel;
use crate::Result;

pub use progress::ProgressSender;
pub use simulated::SimulatedPipeline;
pub use worker_pool::{WorkerPool, WorkerPoolConfig};

/// The slice of a task handed to the pipeline collaborator.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub task_id: String,
    pub input_kind: String,
    pub original_text: Option<String>,
    pub source_url: Option<String>,
    pub input_file_ref: Option<String>,
    pub target_language: String,
    pub voice: String,
}

impl PipelineRequest {
    pub fn from_task(task: &TaskDbModel) -> Self {
        Self {
            task_id: task.id.clone(),
            input_kind: task.input_kind.clone(),
            original_text: task.original_text.clone(),
            source_url: task.source_url.clone(),
            input_file_ref: task.input_file_ref.clone(),
            target_language: task.target_language.clone(),
            voice: task.voice.clone(),
        }
    }
}

/// Terminal output of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Storage reference for the rendered video.
    pub output_ref: String,
    /// Rendered duration in seconds, when the renderer reports it.
    pub video_duration_secs: Option<u64>,
}

/// External processing pipeline.
///
/// Implementations report progress as 0-100 percentages on `progress` and
/// should observe `cancel` at safe checkpoints; cancellation is cooperative
/// and best-effort. Any error return is absorbed by the scheduler into a
/// FAILED transition, never propagated as a crash.
#[async_trait]
pub trait VideoPipeline: Send + Sync {
    async fn process(
        &self,
        request: PipelineRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<PipelineOutput>;
}
