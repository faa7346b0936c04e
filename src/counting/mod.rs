// src/counting/mod.rs
//
// Line-crossing counting core. Pure, single-threaded, no I/O:
// observations go in frame order, crossing events and counts come out.

pub mod aggregator;
pub mod counter;
pub mod crossing_engine;
pub mod disappearance;
pub mod line_geometry;
pub mod track_store;

pub use aggregator::CountState;
pub use counter::{FrameOutcome, OccupancyCounter};
pub use crossing_engine::{CrossingDirection, CrossingEvent};
pub use disappearance::DisappearanceConfig;
pub use line_geometry::CountingLine;

/// Opaque, run-scoped identity assigned by the tracker.
pub type TrackId = u64;

/// Centroid of a bounding box in whole pixels, `(x, y)`.
///
/// Boxes are truncated to pixel coordinates before averaging so that
/// positions compare exactly against the integer-valued line reference.
pub fn centroid(bbox: &[f32; 4]) -> (f32, f32) {
    let [x1, y1, x2, y2] = bbox.map(f32::trunc);
    (((x1 + x2) / 2.0).trunc(), ((y1 + y2) / 2.0).trunc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_truncates_to_pixels() {
        assert_eq!(centroid(&[10.0, 20.0, 30.0, 40.0]), (20.0, 30.0));
        assert_eq!(centroid(&[10.9, 20.2, 31.7, 41.0]), (20.0, 30.0));
        assert_eq!(centroid(&[0.0, 0.0, 3.0, 5.0]), (1.0, 2.0));
    }
}
