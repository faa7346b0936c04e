// src/counting/crossing_engine.rs
//
// Per-track crossing state machine.
//
// Image Y grows downward. "Inside" the room is the region above the line
// (y < line reference), so:
//
//   Entry: previous y >= ref, current y <  ref, status != CrossedIn  -> IN
//   Exit:  previous y <  ref, current y >= ref, status == CrossedIn  -> OUT
//
// The status gate is what keeps the count honest: an exit only counts
// right after a counted entry of the same track, and a track can never
// enter twice without leaving in between. A track's first observation
// only establishes a reference point.

use serde::Serialize;
use tracing::info;

use super::track_store::{CrossingStatus, TrackStateStore};
use super::{centroid, TrackId};

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrossingDirection {
    In,
    Out,
}

impl CrossingDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CrossingEvent {
    pub track_id: TrackId,
    pub direction: CrossingDirection,
    pub frame_index: u64,
    /// Centroid that triggered the event (last known one for deferred exits)
    pub centroid: (f32, f32),
    /// Resolved by the disappearance policy rather than observed
    pub deferred: bool,
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct LineCrossingEngine {
    line_ref: f32,
}

impl LineCrossingEngine {
    pub fn new(line_ref: f32) -> Self {
        Self { line_ref }
    }

    pub fn line_ref(&self) -> f32 {
        self.line_ref
    }

    /// Evaluate one observation of `track_id` and update the store.
    ///
    /// The stored centroid always moves to the current position, whether or
    /// not a crossing fired.
    pub fn process(
        &self,
        store: &mut TrackStateStore,
        track_id: TrackId,
        bbox: &[f32; 4],
        frame_index: u64,
    ) -> Option<CrossingEvent> {
        let current = centroid(bbox);
        let observation = store.observe(track_id, current, frame_index);

        let (_, py) = observation.previous_centroid?;
        let cy = current.1;

        let direction = classify(py, cy, self.line_ref, observation.previous_status)?;
        let status = match direction {
            CrossingDirection::In => CrossingStatus::CrossedIn,
            CrossingDirection::Out => CrossingStatus::CrossedOut,
        };
        store.set_status(track_id, status);

        info!(
            "{} ID {} crossed {} at frame {} (y {:.0} -> {:.0}, line {:.0})",
            match direction {
                CrossingDirection::In => "✅",
                CrossingDirection::Out => "⬅️",
            },
            track_id,
            direction.as_str(),
            frame_index,
            py,
            cy,
            self.line_ref
        );

        Some(CrossingEvent {
            track_id,
            direction,
            frame_index,
            centroid: current,
            deferred: false,
        })
    }
}

/// Status-gated crossing predicate.
pub fn classify(py: f32, cy: f32, line_ref: f32, status: CrossingStatus) -> Option<CrossingDirection> {
    if py >= line_ref && cy < line_ref && status != CrossingStatus::CrossedIn {
        Some(CrossingDirection::In)
    } else if py < line_ref && cy >= line_ref && status == CrossingStatus::CrossedIn {
        Some(CrossingDirection::Out)
    } else {
        None
    }
}
