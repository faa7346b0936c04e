// src/counting/counter.rs
//
// Per-frame driver for the counting core. Owns one track store and one
// aggregator for exactly one run; nothing here is shared across runs.
//
// Per processed frame:
//   1. every detection carrying a track id -> crossing engine
//   2. disappearance sweep over the same store
//   3. events folded into counts; counts refreshed even if nothing fired
//
// Frames where the tracker produced no identities skip step 1 only; the
// sweep still runs so tracks lost for good are eventually resolved.

use tracing::debug;

use super::aggregator::{CountAggregator, CountState, CountingError};
use super::crossing_engine::{CrossingEvent, LineCrossingEngine};
use super::disappearance::{DisappearanceConfig, DisappearancePolicy};
use super::line_geometry::CountingLine;
use super::track_store::TrackStateStore;
use super::TrackId;
use crate::types::TrackedDetection;

/// What happened on one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameOutcome {
    pub frame_index: u64,
    /// Observed crossings first, then deferred exits from the sweep
    pub events: Vec<CrossingEvent>,
    pub evicted: Vec<TrackId>,
    pub counts: CountState,
    /// False when the tracker gave no identities and no track was observed
    pub tracked: bool,
}

pub struct OccupancyCounter {
    line: CountingLine,
    engine: LineCrossingEngine,
    policy: DisappearancePolicy,
    store: TrackStateStore,
    aggregator: CountAggregator,
    last_frame_index: Option<u64>,
}

impl OccupancyCounter {
    pub fn new(line: CountingLine, disappearance: DisappearanceConfig) -> Self {
        Self {
            engine: LineCrossingEngine::new(line.crossing_reference()),
            line,
            policy: DisappearancePolicy::new(disappearance),
            store: TrackStateStore::new(),
            aggregator: CountAggregator::new(),
            last_frame_index: None,
        }
    }

    pub fn load_baseline(&mut self, persisted_total: i64) -> Result<i64, CountingError> {
        self.aggregator.load_baseline(persisted_total)
    }

    pub fn seed_initial_occupancy(&mut self, occupancy: i64) -> Result<(), CountingError> {
        self.aggregator.seed_initial_occupancy(occupancy)
    }

    /// Process one frame's tracker output. Frame indices must increase.
    pub fn process_frame(&mut self, frame_index: u64, detections: &[TrackedDetection]) -> FrameOutcome {
        debug_assert!(
            self.last_frame_index.map_or(true, |last| frame_index > last),
            "frames must be processed in order"
        );
        self.last_frame_index = Some(frame_index);

        let mut outcome = FrameOutcome {
            frame_index,
            ..Default::default()
        };

        let ids: Vec<TrackId> = detections.iter().filter_map(|d| d.track_id).collect();
        if !ids.is_empty() {
            outcome.tracked = true;
            debug!("Frame {}: detected IDs {:?}", frame_index, ids);

            for det in detections {
                let Some(track_id) = det.track_id else {
                    continue;
                };
                if let Some(event) = self.engine.process(&mut self.store, track_id, &det.bbox, frame_index) {
                    self.aggregator.apply(&event);
                    outcome.events.push(event);
                }
            }
        }

        let sweep = self.policy.sweep(&mut self.store, frame_index, self.engine.line_ref());
        for exit in sweep.deferred_exits {
            self.aggregator.apply(&exit);
            outcome.events.push(exit);
        }
        outcome.evicted = sweep.evicted;

        outcome.counts = self.aggregator.refresh();
        outcome
    }

    pub fn counts(&self) -> CountState {
        self.aggregator.state()
    }

    pub fn line(&self) -> &CountingLine {
        &self.line
    }

    pub fn active_tracks(&self) -> usize {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::crossing_engine::CrossingDirection;

    fn det(id: TrackId, y: f32) -> TrackedDetection {
        TrackedDetection {
            bbox: [90.0, y - 10.0, 110.0, y + 10.0],
            confidence: 0.9,
            class_id: 0,
            track_id: Some(id),
        }
    }

    fn counter(baseline: i64) -> OccupancyCounter {
        // Reference 500
        let line = CountingLine::new((0.0, 500.0), (800.0, 500.0));
        let mut counter = OccupancyCounter::new(line, DisappearanceConfig::default());
        counter.load_baseline(baseline).unwrap();
        counter
    }

    fn invariant(s: &CountState) -> bool {
        s.total_count == s.baseline_total + s.initial_occupancy + s.in_count as i64 - s.out_count as i64
    }

    #[test]
    fn test_scenario_entry_exit_and_single_sighting() {
        let mut c = counter(3);

        assert!(c.process_frame(1, &[det(1, 520.0)]).events.is_empty());

        let f2 = c.process_frame(2, &[det(1, 480.0)]);
        assert_eq!(f2.events.len(), 1);
        assert_eq!(f2.events[0].direction, CrossingDirection::In);
        assert_eq!(f2.counts.total_count, 4);

        c.process_frame(3, &[det(1, 460.0)]);
        let f4 = c.process_frame(4, &[det(1, 520.0)]);
        assert_eq!(f4.events[0].direction, CrossingDirection::Out);
        assert_eq!(f4.counts.total_count, 3);

        // Track B seen once, never again
        let f5 = c.process_frame(5, &[det(2, 510.0)]);
        assert!(f5.events.is_empty());
        assert_eq!(f5.counts.total_count, 3);
        assert_eq!((f5.counts.in_count, f5.counts.out_count), (1, 1));
    }

    #[test]
    fn test_untracked_frames_pass_through() {
        let mut c = counter(2);
        let untracked = TrackedDetection {
            track_id: None,
            ..det(0, 480.0)
        };
        let outcome = c.process_frame(1, &[untracked]);
        assert!(!outcome.tracked);
        assert!(outcome.events.is_empty());
        assert_eq!(c.active_tracks(), 0);

        let empty = c.process_frame(2, &[]);
        assert!(!empty.tracked);
        assert_eq!(empty.counts.total_count, 2);
    }

    #[test]
    fn test_no_tracks_whole_run() {
        let mut c = counter(4);
        c.seed_initial_occupancy(1).unwrap();
        for i in 1..=100 {
            let s = c.process_frame(i, &[]).counts;
            assert!(invariant(&s));
        }
        let s = c.counts();
        assert_eq!((s.in_count, s.out_count), (0, 0));
        assert_eq!(s.total_count, 5);
    }

    #[test]
    fn test_invariant_holds_every_frame() {
        let mut c = counter(10);
        let path_a = [520.0, 480.0, 470.0, 530.0, 490.0, 510.0];
        let path_b = [300.0, 600.0, 450.0, 550.0, 450.0, 470.0];
        for (i, (ya, yb)) in path_a.iter().zip(path_b.iter()).enumerate() {
            let outcome = c.process_frame(i as u64 + 1, &[det(1, *ya), det(2, *yb)]);
            assert!(invariant(&outcome.counts), "frame {}: {:?}", i + 1, outcome.counts);
        }
    }

    #[test]
    fn test_stale_track_evicted_and_reobserved_as_new() {
        let mut c = counter(0);
        c.process_frame(1, &[det(1, 520.0)]);
        c.process_frame(2, &[det(1, 480.0)]);
        assert_eq!(c.counts().in_count, 1);

        // Another subject keeps the tracker busy while track 1 is gone
        let mut evicted = Vec::new();
        for i in 3..=40 {
            evicted.extend(c.process_frame(i, &[det(2, 700.0)]).evicted);
        }
        assert_eq!(evicted, vec![1]);

        // Tracker reuses id 1: first sighting again, so no exit fires
        c.process_frame(41, &[det(1, 470.0)]);
        let outcome = c.process_frame(42, &[det(1, 520.0)]);
        assert!(outcome.events.is_empty());
        assert_eq!(c.counts().out_count, 0);
    }

    #[test]
    fn test_deferred_exit_counts_when_enabled() {
        let line = CountingLine::new((0.0, 500.0), (800.0, 500.0));
        let mut c = OccupancyCounter::new(
            line,
            DisappearanceConfig {
                resolve_lost_exits: true,
                ..Default::default()
            },
        );
        c.load_baseline(0).unwrap();
        c.process_frame(1, &[det(1, 520.0)]);
        c.process_frame(2, &[det(1, 480.0)]);

        let mut deferred = Vec::new();
        for i in 3..=40 {
            deferred.extend(c.process_frame(i, &[det(2, 700.0)]).events);
        }
        assert_eq!(deferred.len(), 1);
        assert!(deferred[0].deferred);
        assert_eq!(c.counts().out_count, 1);
        assert_eq!(c.counts().total_count, 0);
    }

    #[test]
    fn test_deferred_exit_fires_after_room_empties() {
        let line = CountingLine::new((0.0, 500.0), (800.0, 500.0));
        let mut c = OccupancyCounter::new(
            line,
            DisappearanceConfig {
                resolve_lost_exits: true,
                ..Default::default()
            },
        );
        c.load_baseline(0).unwrap();
        c.process_frame(1, &[det(1, 520.0)]);
        c.process_frame(2, &[det(1, 480.0)]);

        // Last subject lost at the boundary; nothing is detected afterwards
        let mut deferred = Vec::new();
        let mut evicted = Vec::new();
        for i in 3..=200 {
            let outcome = c.process_frame(i, &[]);
            assert!(!outcome.tracked);
            assert!(invariant(&outcome.counts));
            deferred.extend(outcome.events);
            evicted.extend(outcome.evicted);
        }
        assert_eq!(deferred.len(), 1);
        assert!(deferred[0].deferred);
        assert_eq!(deferred[0].frame_index, 33);
        assert_eq!(evicted, vec![1]);
        assert_eq!(c.counts().out_count, 1);
        assert_eq!(c.counts().total_count, 0);
        assert_eq!(c.active_tracks(), 0);
    }
}
