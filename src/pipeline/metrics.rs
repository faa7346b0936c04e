// src/pipeline/metrics.rs
//
// Per-run counters and timings, summarized into the end-of-run report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::counting::{CrossingDirection, FrameOutcome};

#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub frames_read: Arc<AtomicU64>,
    pub frames_processed: Arc<AtomicU64>,
    pub frames_with_tracks: Arc<AtomicU64>,
    pub crossings_in: Arc<AtomicU64>,
    pub crossings_out: Arc<AtomicU64>,
    pub deferred_exits: Arc<AtomicU64>,
    pub evictions: Arc<AtomicU64>,
    pub tracking_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            frames_read: Arc::new(AtomicU64::new(0)),
            frames_processed: Arc::new(AtomicU64::new(0)),
            frames_with_tracks: Arc::new(AtomicU64::new(0)),
            crossings_in: Arc::new(AtomicU64::new(0)),
            crossings_out: Arc::new(AtomicU64::new(0)),
            deferred_exits: Arc::new(AtomicU64::new(0)),
            evictions: Arc::new(AtomicU64::new(0)),
            tracking_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_timing(&self, counter: &AtomicU64, elapsed: Duration) {
        counter.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: &FrameOutcome) {
        self.inc(&self.frames_processed);
        if outcome.tracked {
            self.inc(&self.frames_with_tracks);
        }
        for event in &outcome.events {
            match event.direction {
                CrossingDirection::In => self.inc(&self.crossings_in),
                CrossingDirection::Out => self.inc(&self.crossings_out),
            }
            if event.deferred {
                self.inc(&self.deferred_exits);
            }
        }
        self.evictions
            .fetch_add(outcome.evicted.len() as u64, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.frames_read.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let processed = self.frames_processed.load(Ordering::Relaxed);
        let tracking_us = self.tracking_time_us.load(Ordering::Relaxed);
        MetricsSummary {
            frames_read: self.frames_read.load(Ordering::Relaxed),
            frames_processed: processed,
            frames_with_tracks: self.frames_with_tracks.load(Ordering::Relaxed),
            crossings_in: self.crossings_in.load(Ordering::Relaxed),
            crossings_out: self.crossings_out.load(Ordering::Relaxed),
            deferred_exits: self.deferred_exits.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            avg_tracking_us: if processed > 0 { tracking_us / processed } else { 0 },
            fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub frames_with_tracks: u64,
    pub crossings_in: u64,
    pub crossings_out: u64,
    pub deferred_exits: u64,
    pub evictions: u64,
    pub avg_tracking_us: u64,
    pub fps: f64,
    pub elapsed_secs: f64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!("\n📊 Run Report:");
        info!(
            "  Frames: {} read, {} processed, {} with tracks",
            self.frames_read, self.frames_processed, self.frames_with_tracks
        );
        info!("  ✅ Entries: {}", self.crossings_in);
        info!("  ⬅️  Exits: {} ({} deferred)", self.crossings_out, self.deferred_exits);
        info!("  🗑️  Evicted tracks: {}", self.evictions);
        info!(
            "  ⏱️  {:.1}s total, {:.1} FPS, {}µs avg tracking",
            self.elapsed_secs, self.fps, self.avg_tracking_us
        );
    }
}
