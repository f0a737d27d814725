//! Simulated pipeline for local development and tests.
//!
//! Walks the milestone sequence of the real pipeline (load text, split into
//! segments, per-segment generation, concatenation, upload) without calling
//! any external service. Useful for exercising admission, progress and
//! settlement end to end.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{PipelineOutput, PipelineRequest, ProgressSender, VideoPipeline};
use crate::{Error, Result};

/// Progress milestones matching the stage boundaries of the real pipeline.
const MILESTONES: &[i64] = &[5, 10, 20, 35, 50, 65, 80, 85, 95, 100];

/// A pipeline that sleeps through the milestones and fabricates an output
/// reference.
pub struct SimulatedPipeline {
    step_delay: Duration,
}

impl SimulatedPipeline {
    pub fn new(step_delay: Duration) -> Self {
        Self { step_delay }
    }
}

impl Default for SimulatedPipeline {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait]
impl VideoPipeline for SimulatedPipeline {
    async fn process(
        &self,
        request: PipelineRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<PipelineOutput> {
        for milestone in MILESTONES {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::pipeline("cancelled before completion"));
                }
                _ = tokio::time::sleep(self.step_delay) => {}
            }
            progress.report(*milestone);
        }

        Ok(PipelineOutput {
            output_ref: format!("outputs/{}/video.mp4", request.task_id),
            video_duration_secs: Some(150),
        })
    }
}
