// src/detection/mod.rs
//
// Per-frame subject tracking: detection plus identity assignment.

mod iou_tracker;
mod kalman;
mod person_detector;

pub use iou_tracker::IouTracker;
pub use person_detector::PersonDetector;

use anyhow::Result;
use opencv::core::Mat;

use crate::types::{Config, TrackedDetection};

/// Anything that turns a decoded frame into tracked boxes. A detection
/// with `track_id: None` is drawn but never counted.
pub trait SubjectTracker {
    fn track(&mut self, frame: &Mat) -> Result<Vec<TrackedDetection>>;
}

pub struct YoloPersonTracker {
    detector: PersonDetector,
    tracker: IouTracker,
}

impl YoloPersonTracker {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            detector: PersonDetector::new(&config.detector)?,
            tracker: IouTracker::new(config.tracker.clone()),
        })
    }
}

impl SubjectTracker for YoloPersonTracker {
    fn track(&mut self, frame: &Mat) -> Result<Vec<TrackedDetection>> {
        let detections = self.detector.detect(frame)?;
        Ok(self.tracker.update(detections))
    }
}
