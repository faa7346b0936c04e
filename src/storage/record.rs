// src/storage/record.rs
//
// The per-run document and its id.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::counting::CountState;

/// Persisted once per run, keyed by `run_id`.
///
/// Field names on the wire match the existing `people_counter` documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub timestamp: DateTime<FixedOffset>,
    #[serde(rename = "in")]
    pub in_count: u64,
    #[serde(rename = "out")]
    pub out_count: u64,
    pub total_count: i64,
    pub video_name: String,
    pub video_url: String,
}

impl RunRecord {
    pub fn new(
        run_id: &str,
        timestamp: DateTime<FixedOffset>,
        counts: &CountState,
        video_name: &str,
        video_url: &str,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            timestamp,
            in_count: counts.in_count,
            out_count: counts.out_count,
            total_count: counts.total_count,
            video_name: video_name.to_string(),
            video_url: video_url.to_string(),
        }
    }
}

/// Run id derived from the run's start time, e.g. `2025-03-01_081500`.
pub fn run_id_for(started_at: &DateTime<FixedOffset>) -> String {
    started_at.format("%Y-%m-%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_id_format() {
        let tz = FixedOffset::east_opt(7 * 3600).unwrap();
        let t = tz.with_ymd_and_hms(2025, 3, 1, 8, 5, 9).unwrap();
        assert_eq!(run_id_for(&t), "2025-03-01_080509");
    }

    #[test]
    fn test_wire_field_names() {
        let tz = FixedOffset::east_opt(7 * 3600).unwrap();
        let counts = CountState {
            in_count: 4,
            out_count: 1,
            baseline_total: 2,
            initial_occupancy: 0,
            total_count: 5,
        };
        let record = RunRecord::new(
            "r1",
            tz.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
            &counts,
            "videos/a.mp4",
            "https://example.test/a.mp4",
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["in"], 4);
        assert_eq!(json["out"], 1);
        assert_eq!(json["total_count"], 5);
        assert_eq!(json["timestamp"], "2025-03-01T08:00:00+07:00");
    }
}
