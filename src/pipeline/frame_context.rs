// src/pipeline/frame_context.rs
//
// Everything known about one processed frame. The overlay reads from this
// instead of reaching back into the tracker or counter.

use crate::counting::{CountState, CrossingEvent, FrameOutcome};
use crate::types::TrackedDetection;

#[derive(Debug, Clone)]
pub struct FrameContext {
    pub frame_index: u64,
    pub detections: Vec<TrackedDetection>,
    pub counts: CountState,
    pub events: Vec<CrossingEvent>,
}

impl FrameContext {
    pub fn new(detections: Vec<TrackedDetection>, outcome: FrameOutcome) -> Self {
        Self {
            frame_index: outcome.frame_index,
            detections,
            counts: outcome.counts,
            events: outcome.events,
        }
    }
}
