// src/detection/iou_tracker.rs
//
// Frame-to-frame identity assignment by box overlap against each track's
// Kalman-predicted box. Ids start at 1, only ever increase, and are never
// handed out twice within a run.

use std::collections::HashMap;

use tracing::debug;

use super::kalman::BoxKalman;
use super::person_detector::{iou, Detection};
use crate::counting::TrackId;
use crate::types::{TrackedDetection, TrackerConfig};

#[derive(Debug, Clone)]
struct Track {
    filter: BoxKalman,
    class_id: usize,
    last_seen_frame: u64,
}

pub struct IouTracker {
    config: TrackerConfig,
    next_id: TrackId,
    frame_index: u64,
    tracks: HashMap<TrackId, Track>,
}

impl IouTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            next_id: 1,
            frame_index: 0,
            tracks: HashMap::new(),
        }
    }

    /// Associate this frame's detections with live tracks. Every returned
    /// detection carries an id.
    pub fn update(&mut self, detections: Vec<Detection>) -> Vec<TrackedDetection> {
        self.frame_index += 1;
        let frame = self.frame_index;

        for track in self.tracks.values_mut() {
            track.filter.predict();
        }

        // Greedy global matching: best overlaps claim first
        let mut pairs: Vec<(f32, TrackId, usize)> = Vec::new();
        for (det_idx, det) in detections.iter().enumerate() {
            for (&id, track) in &self.tracks {
                if track.class_id != det.class_id {
                    continue;
                }
                let overlap = iou(&track.filter.predicted_box(), &det.bbox);
                if overlap >= self.config.min_iou {
                    pairs.push((overlap, id, det_idx));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut assigned: Vec<Option<TrackId>> = vec![None; detections.len()];
        let mut claimed: Vec<TrackId> = Vec::new();
        for (_, id, det_idx) in pairs {
            if assigned[det_idx].is_some() || claimed.contains(&id) {
                continue;
            }
            assigned[det_idx] = Some(id);
            claimed.push(id);
        }

        let mut out = Vec::with_capacity(detections.len());
        for (det, slot) in detections.into_iter().zip(assigned) {
            let id = match slot.and_then(|id| self.tracks.get_mut(&id).map(|t| (id, t))) {
                Some((id, track)) => {
                    track.filter.update(&det.bbox);
                    track.last_seen_frame = frame;
                    id
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    debug!("🆕 New track #{}", id);
                    self.tracks.insert(
                        id,
                        Track {
                            filter: BoxKalman::new(&det.bbox),
                            class_id: det.class_id,
                            last_seen_frame: frame,
                        },
                    );
                    id
                }
            };
            out.push(TrackedDetection {
                bbox: det.bbox,
                confidence: det.confidence,
                class_id: det.class_id,
                track_id: Some(id),
            });
        }

        let max_coast = self.config.max_coast_frames;
        self.tracks.retain(|id, t| {
            let keep = frame.saturating_sub(t.last_seen_frame) <= max_coast;
            if !keep {
                debug!("Dropping track #{} (velocity {:?})", id, t.filter.velocity());
            }
            keep
        });

        out
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }
}
