use crate::types::Config;
use anyhow::{ensure, Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file {}", path))?;
        Self::from_yaml(&contents).with_context(|| format!("Invalid config file {}", path))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.counting.process_every >= 1,
            "counting.process_every must be at least 1"
        );
        ensure!(
            self.detector.confidence_threshold > 0.0 && self.detector.confidence_threshold <= 1.0,
            "detector.confidence_threshold must be in (0, 1], got {}",
            self.detector.confidence_threshold
        );
        ensure!(
            !self.detector.class_ids.is_empty(),
            "detector.class_ids must name at least one class"
        );
        ensure!(
            !self.video.source_extensions.is_empty(),
            "video.source_extensions must not be empty"
        );
        ensure!(
            self.schedule.reset_hour < 24 && self.schedule.reset_minute < 60,
            "schedule reset time {}:{} is not a valid time of day",
            self.schedule.reset_hour,
            self.schedule.reset_minute
        );
        ensure!(
            self.schedule.utc_offset_hours.abs() < 24,
            "schedule.utc_offset_hours out of range"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::types::{Config, StorageConfig};

    const MINIMAL: &str = r#"
detector:
  model_path: models/yolov8n.onnx
storage:
  backend: local
  records_path: data/records.json
  objects_dir: data/objects
  public_base_url: http://localhost:8080
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.detector.confidence_threshold, 0.5);
        assert_eq!(config.detector.class_ids, vec![0]);
        assert_eq!(config.counting.process_every, 1);
        assert_eq!(config.counting.disappearance.max_absent_frames, 30);
        assert!(!config.counting.disappearance.resolve_lost_exits);
        assert_eq!(config.counting.line_start, [0.0, -50.0]);
        assert_eq!(config.video.source_prefix, "videos/");
        assert_eq!(config.schedule.utc_offset_hours, 7);
        assert!(matches!(config.storage, StorageConfig::Local(_)));
    }

    #[test]
    fn test_firebase_backend_and_overrides() {
        let yaml = r#"
detector:
  model_path: m.onnx
  confidence_threshold: 0.4
counting:
  line_start: [0, 600]
  line_end: [1280, 640]
  max_absent_frames: 45
  resolve_lost_exits: true
  exit_band_px: 80
storage:
  backend: firebase
  project_id: smart-class
  bucket: smart-class.firebasestorage.app
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.counting.line_end, [1280.0, 640.0]);
        assert_eq!(config.counting.disappearance.max_absent_frames, 45);
        assert!(config.counting.disappearance.resolve_lost_exits);
        assert_eq!(config.counting.disappearance.exit_band_px, 80.0);
        match config.storage {
            StorageConfig::Firebase(fb) => {
                assert_eq!(fb.collection, "people_counter");
                assert_eq!(fb.access_token_env, "GOOGLE_OAUTH_ACCESS_TOKEN");
            }
            other => panic!("expected firebase backend, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_zero_stride() {
        let yaml = format!("{}\ncounting:\n  process_every: 0\n", MINIMAL);
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("process_every"), "{}", err);
    }

    #[test]
    fn test_rejects_bad_reset_time() {
        let yaml = format!("{}\nschedule:\n  reset_hour: 24\n", MINIMAL);
        assert!(Config::from_yaml(&yaml).is_err());
    }
}
