//! Task pricing.
//!
//! Cost is estimated at admission from the input descriptor and reserved in
//! full; a completed task consumes exactly its reservation. The per-segment
//! brackets mirror rendered-narration length: longer segments cost more.

use crate::database::models::TaskInput;

/// Minimum credits reserved for any task.
pub const MIN_TASK_CREDIT: i64 = 30;

/// Segment count bounds produced by the scripting stage.
const MIN_SEGMENTS: u64 = 3;
const MAX_SEGMENTS: u64 = 8;

/// Approximate words per script segment.
const WORDS_PER_SEGMENT: u64 = 80;

/// Approximate narration speed in words per minute.
const NARRATION_WPM: u64 = 150;

/// Segment count assumed for inputs whose text is extracted later
/// (file uploads and URLs).
const OPAQUE_INPUT_SEGMENTS: u64 = 5;
const OPAQUE_INPUT_SEGMENT_SECS: u64 = 30;

/// Credits for a single segment of the given narrated duration.
pub fn segment_credit(duration_secs: u64) -> i64 {
    if duration_secs > 60 {
        45
    } else if duration_secs >= 45 {
        40
    } else if duration_secs >= 30 {
        35
    } else {
        30
    }
}

/// Pricing policy for submissions.
pub trait CostModel: Send + Sync {
    /// Credits to reserve for this input.
    fn price(&self, input: &TaskInput) -> i64;
}

/// Default cost model: estimate segment count and per-segment narration
/// length from the descriptor, then apply the segment brackets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentEstimateCostModel;

impl SegmentEstimateCostModel {
    fn price_text(text: &str) -> i64 {
        let words = text.split_whitespace().count() as u64;
        let segments = (words / WORDS_PER_SEGMENT).clamp(MIN_SEGMENTS, MAX_SEGMENTS);
        let words_per_segment = if segments == 0 { 0 } else { words / segments };
        let est_duration_secs = words_per_segment * 60 / NARRATION_WPM;
        (segments as i64) * segment_credit(est_duration_secs)
    }
}

impl CostModel for SegmentEstimateCostModel {
    fn price(&self, input: &TaskInput) -> i64 {
        let estimate = match input {
            TaskInput::Text(text) => Self::price_text(text),
            // Text is only extracted once the pipeline runs; price on a
            // fixed mid-size document estimate.
            TaskInput::File(_) | TaskInput::Url(_) => {
                (OPAQUE_INPUT_SEGMENTS as i64) * segment_credit(OPAQUE_INPUT_SEGMENT_SECS)
            }
        };
        estimate.max(MIN_TASK_CREDIT)
    }
}
