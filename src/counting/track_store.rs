// src/counting/track_store.rs
//
// One record per live track: last centroid, crossing status, last-seen
// frame. Position, status and staleness live in the same record so that
// eviction is a single remove and the three can never drift apart.

use std::collections::HashMap;

use serde::Serialize;

use super::TrackId;

// ============================================================================
// TYPES
// ============================================================================

/// Crossing status of a track relative to the counting line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum CrossingStatus {
    /// Seen, but no counted crossing yet
    #[default]
    Unseen,
    /// Last counted crossing was an entry
    CrossedIn,
    /// Last counted crossing was an exit
    CrossedOut,
}

impl CrossingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unseen => "UNSEEN",
            Self::CrossedIn => "IN",
            Self::CrossedOut => "OUT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackRecord {
    pub last_centroid: (f32, f32),
    pub status: CrossingStatus,
    pub first_seen_frame: u64,
    pub last_seen_frame: u64,
}

/// What the store knew about a track before the current observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// `None` on the track's first observation
    pub previous_centroid: Option<(f32, f32)>,
    pub previous_status: CrossingStatus,
}

impl Observation {
    pub fn is_first(&self) -> bool {
        self.previous_centroid.is_none()
    }
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Debug, Default)]
pub struct TrackStateStore {
    tracks: HashMap<TrackId, TrackRecord>,
}

impl TrackStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation and return the state from before it.
    ///
    /// First sighting registers the track as `Unseen`. Later sightings
    /// overwrite centroid and last-seen frame; status is left to the
    /// crossing engine.
    pub fn observe(&mut self, track_id: TrackId, centroid: (f32, f32), frame_index: u64) -> Observation {
        match self.tracks.get_mut(&track_id) {
            Some(record) => {
                let observation = Observation {
                    previous_centroid: Some(record.last_centroid),
                    previous_status: record.status,
                };
                record.last_centroid = centroid;
                record.last_seen_frame = frame_index;
                observation
            }
            None => {
                self.tracks.insert(
                    track_id,
                    TrackRecord {
                        last_centroid: centroid,
                        status: CrossingStatus::Unseen,
                        first_seen_frame: frame_index,
                        last_seen_frame: frame_index,
                    },
                );
                Observation {
                    previous_centroid: None,
                    previous_status: CrossingStatus::Unseen,
                }
            }
        }
    }

    /// Returns false if the track is unknown.
    pub fn set_status(&mut self, track_id: TrackId, status: CrossingStatus) -> bool {
        match self.tracks.get_mut(&track_id) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, track_id: TrackId) -> Option<&TrackRecord> {
        self.tracks.get(&track_id)
    }

    pub fn evict(&mut self, track_id: TrackId) -> Option<TrackRecord> {
        self.tracks.remove(&track_id)
    }

    /// Tracks absent for more than `threshold` frames, in ascending id order.
    ///
    /// Pure query; callers decide what to do with the result.
    pub fn stale_tracks(&self, frame_index: u64, threshold: u64) -> Vec<TrackId> {
        let mut stale: Vec<TrackId> = self
            .tracks
            .iter()
            .filter(|(_, record)| frame_index.saturating_sub(record.last_seen_frame) > threshold)
            .map(|(id, _)| *id)
            .collect();
        stale.sort_unstable();
        stale
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
