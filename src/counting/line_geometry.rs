// src/counting/line_geometry.rs
//
// The counting line. Configured as two endpoints in frame pixels and
// reduced to a single horizontal threshold (midpoint of the endpoint Ys)
// for the crossing predicate. Immutable for a run.

use serde::{Deserialize, Serialize};

/// Fixed boundary line in frame-pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountingLine {
    pub start: (f32, f32),
    pub end: (f32, f32),
}

impl CountingLine {
    pub fn new(start: (f32, f32), end: (f32, f32)) -> Self {
        Self { start, end }
    }

    /// Resolve edge-relative endpoint coordinates against a frame size.
    ///
    /// Negative coordinates count back from the right / bottom edge, so
    /// `[0, -50]` on a 1920x1080 frame is `(0, 1030)`. Endpoints are not
    /// clamped to the frame; keeping them inside is the caller's job.
    pub fn from_frame_edges(start: [f32; 2], end: [f32; 2], width: u32, height: u32) -> Self {
        let resolve = |v: f32, extent: u32| if v < 0.0 { extent as f32 + v } else { v };
        Self {
            start: (resolve(start[0], width), resolve(start[1], height)),
            end: (resolve(end[0], width), resolve(end[1], height)),
        }
    }

    /// One-dimensional threshold used by the crossing predicate.
    #[inline]
    pub fn crossing_reference(&self) -> f32 {
        (self.start.1 + self.end.1) / 2.0
    }
}
