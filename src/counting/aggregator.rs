// src/counting/aggregator.rs
//
// Folds crossing events and the carried-over baseline into a total.
// After every update: total = baseline + initial_occupancy + in - out.

use serde::Serialize;
use thiserror::Error;

use super::crossing_engine::{CrossingDirection, CrossingEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CountingError {
    #[error("baseline already loaded for this run (current baseline {0})")]
    BaselineAlreadyLoaded(i64),

    #[error("initial occupancy already seeded for this run")]
    AlreadySeeded,

    #[error("initial occupancy must be seeded before the first crossing ({0} events applied)")]
    SeedAfterCrossing(u64),
}

/// Run-scoped counts. `in_count` and `out_count` never decrease.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountState {
    pub in_count: u64,
    pub out_count: u64,
    pub baseline_total: i64,
    pub initial_occupancy: i64,
    pub total_count: i64,
}

impl CountState {
    fn recompute(&mut self) {
        self.total_count = self.baseline_total + self.initial_occupancy + self.in_count as i64
            - self.out_count as i64;
    }

    pub fn events_applied(&self) -> u64 {
        self.in_count + self.out_count
    }
}

#[derive(Debug, Default)]
pub struct CountAggregator {
    state: CountState,
    baseline_loaded: bool,
    seeded: bool,
}

impl CountAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the carried-over total. Allowed exactly once per run.
    pub fn load_baseline(&mut self, persisted_total: i64) -> Result<i64, CountingError> {
        if self.baseline_loaded {
            return Err(CountingError::BaselineAlreadyLoaded(self.state.baseline_total));
        }
        self.baseline_loaded = true;
        self.state.baseline_total = persisted_total;
        self.state.recompute();
        Ok(self.state.baseline_total)
    }

    /// Seed people already in the room. At most once, before any crossing.
    pub fn seed_initial_occupancy(&mut self, occupancy: i64) -> Result<(), CountingError> {
        if self.seeded {
            return Err(CountingError::AlreadySeeded);
        }
        let applied = self.state.events_applied();
        if applied > 0 {
            return Err(CountingError::SeedAfterCrossing(applied));
        }
        self.seeded = true;
        self.state.initial_occupancy = occupancy;
        self.state.recompute();
        Ok(())
    }

    pub fn apply(&mut self, event: &CrossingEvent) -> CountState {
        match event.direction {
            CrossingDirection::In => self.state.in_count += 1,
            CrossingDirection::Out => self.state.out_count += 1,
        }
        self.state.recompute();
        self.state
    }

    /// Recompute without an event (per-frame reporting).
    pub fn refresh(&mut self) -> CountState {
        self.state.recompute();
        self.state
    }

    pub fn state(&self) -> CountState {
        self.state
    }
}
