// src/counting/disappearance.rs
//
// Stale-track pruning. Runs once per processed frame so the store stays
// bounded over long clips.
//
// Optional deferred exits: a subject that entered (CrossedIn) and was last
// seen just inside the line, then vanished, most likely walked out while
// the tracker lost it. With `resolve_lost_exits` on, such a track is
// counted OUT at its last known centroid before eviction. With it off
// (the default) these exits are lost and the total over-reports by one
// per such subject.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::crossing_engine::{CrossingDirection, CrossingEvent};
use super::track_store::{CrossingStatus, TrackRecord, TrackStateStore};
use super::TrackId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisappearanceConfig {
    /// Frames of absence after which a track is stale
    #[serde(default = "default_max_absent_frames")]
    pub max_absent_frames: u64,
    /// Resolve lost CrossedIn tracks near the line as deferred exits
    #[serde(default)]
    pub resolve_lost_exits: bool,
    /// Distance (px) inside the line within which a lost track counts
    /// as "at the boundary"
    #[serde(default = "default_exit_band_px")]
    pub exit_band_px: f32,
}

fn default_max_absent_frames() -> u64 {
    30
}

fn default_exit_band_px() -> f32 {
    50.0
}

impl Default for DisappearanceConfig {
    fn default() -> Self {
        Self {
            max_absent_frames: default_max_absent_frames(),
            resolve_lost_exits: false,
            exit_band_px: default_exit_band_px(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisappearancePolicy {
    config: DisappearanceConfig,
}

/// Result of one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepResult {
    pub evicted: Vec<TrackId>,
    pub deferred_exits: Vec<CrossingEvent>,
}

impl DisappearancePolicy {
    pub fn new(config: DisappearanceConfig) -> Self {
        Self { config }
    }

    /// Evict every stale track, resolving deferred exits first when enabled.
    pub fn sweep(&self, store: &mut TrackStateStore, frame_index: u64, line_ref: f32) -> SweepResult {
        let mut result = SweepResult::default();

        for track_id in store.stale_tracks(frame_index, self.config.max_absent_frames) {
            let Some(record) = store.evict(track_id) else {
                continue;
            };

            if self.should_resolve_exit(&record, line_ref) {
                info!(
                    "⬅️ ID {} lost inside the line at y={:.0} (last seen frame {}), counting deferred OUT",
                    track_id, record.last_centroid.1, record.last_seen_frame
                );
                result.deferred_exits.push(CrossingEvent {
                    track_id,
                    direction: CrossingDirection::Out,
                    frame_index,
                    centroid: record.last_centroid,
                    deferred: true,
                });
            } else {
                debug!(
                    "🗑️ Evicting ID {} ({}) - tracked frames {}..={}, not seen for {} frames",
                    track_id,
                    record.status.as_str(),
                    record.first_seen_frame,
                    record.last_seen_frame,
                    frame_index - record.last_seen_frame
                );
            }
            result.evicted.push(track_id);
        }

        result
    }

    fn should_resolve_exit(&self, record: &TrackRecord, line_ref: f32) -> bool {
        if !self.config.resolve_lost_exits || record.status != CrossingStatus::CrossedIn {
            return false;
        }
        let y = record.last_centroid.1;
        y < line_ref && line_ref - y <= self.config.exit_band_px
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(id: TrackId, y: f32, status: CrossingStatus, frame: u64) -> TrackStateStore {
        let mut store = TrackStateStore::new();
        store.observe(id, (100.0, y), frame);
        store.set_status(id, status);
        store
    }

    #[test]
    fn test_sweep_evicts_only_stale_tracks() {
        let policy = DisappearancePolicy::new(DisappearanceConfig::default());
        let mut store = TrackStateStore::new();
        store.observe(1, (0.0, 600.0), 1);
        store.observe(2, (0.0, 600.0), 20);

        let result = policy.sweep(&mut store, 40, 500.0);
        assert_eq!(result.evicted, vec![1]);
        assert!(result.deferred_exits.is_empty());
        assert!(store.get(1).is_none());
        assert!(store.get(2).is_some());
        assert!(store.stale_tracks(40, 30).is_empty());
    }

    #[test]
    fn test_deferred_exit_disabled_by_default() {
        let policy = DisappearancePolicy::new(DisappearanceConfig::default());
        let mut store = store_with(1, 480.0, CrossingStatus::CrossedIn, 1);

        let result = policy.sweep(&mut store, 100, 500.0);
        assert_eq!(result.evicted, vec![1]);
        assert!(result.deferred_exits.is_empty());
    }

    #[test]
    fn test_deferred_exit_when_enabled() {
        let policy = DisappearancePolicy::new(DisappearanceConfig {
            resolve_lost_exits: true,
            ..Default::default()
        });
        let mut store = store_with(1, 480.0, CrossingStatus::CrossedIn, 1);

        let result = policy.sweep(&mut store, 100, 500.0);
        assert_eq!(result.deferred_exits.len(), 1);
        let exit = result.deferred_exits[0];
        assert_eq!(exit.direction, CrossingDirection::Out);
        assert!(exit.deferred);
        assert_eq!(exit.centroid, (100.0, 480.0));
        assert_eq!(exit.frame_index, 100);
        assert!(store.is_empty());
    }

    #[test]
    fn test_deferred_exit_requires_boundary_band_and_status() {
        let policy = DisappearancePolicy::new(DisappearanceConfig {
            resolve_lost_exits: true,
            exit_band_px: 50.0,
            ..Default::default()
        });

        // Deep inside the room: still there, just occluded
        let mut deep = store_with(1, 300.0, CrossingStatus::CrossedIn, 1);
        assert!(policy.sweep(&mut deep, 100, 500.0).deferred_exits.is_empty());

        // Outside side of the line
        let mut outside = store_with(2, 520.0, CrossingStatus::CrossedIn, 1);
        assert!(policy.sweep(&mut outside, 100, 500.0).deferred_exits.is_empty());

        // Never counted in
        let mut unseen = store_with(3, 480.0, CrossingStatus::Unseen, 1);
        assert!(policy.sweep(&mut unseen, 100, 500.0).deferred_exits.is_empty());

        // Already counted out
        let mut out = store_with(4, 480.0, CrossingStatus::CrossedOut, 1);
        assert!(policy.sweep(&mut out, 100, 500.0).deferred_exits.is_empty());
    }
}
