use serde::{Deserialize, Serialize};

use crate::counting::{DisappearanceConfig, TrackId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub detector: DetectorConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub counting: CountingConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub model_path: String,
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    #[serde(default = "default_nms_iou")]
    pub nms_iou_threshold: f32,
    /// COCO class ids to keep (0 = person)
    #[serde(default = "default_class_ids")]
    pub class_ids: Vec<usize>,
    #[serde(default = "default_input_size")]
    pub input_size: usize,
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,
    #[serde(default)]
    pub use_cuda: bool,
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub min_iou: f32,
    pub max_coast_frames: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_iou: 0.3,
            max_coast_frames: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountingConfig {
    /// Endpoints `[x, y]`; negative values count back from the right/bottom edge
    pub line_start: [f32; 2],
    pub line_end: [f32; 2],
    pub initial_occupancy: i64,
    /// Only every N-th frame goes through tracker and counter
    pub process_every: u64,
    #[serde(flatten)]
    pub disappearance: DisappearanceConfig,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            line_start: [0.0, -50.0],
            line_end: [-1550.0, -300.0],
            initial_occupancy: 0,
            process_every: 1,
            disappearance: DisappearanceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Scratch directory for the downloaded source and produced artifacts
    pub work_dir: String,
    pub source_prefix: String,
    pub source_extensions: Vec<String>,
    pub output_prefix: String,
    pub upload_prefix: String,
    pub overlay: OverlayConfig,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            work_dir: ".".to_string(),
            source_prefix: "videos/".to_string(),
            source_extensions: vec!["mp4".to_string()],
            output_prefix: "Room901_".to_string(),
            upload_prefix: "counter_videos/".to_string(),
            overlay: OverlayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverlayConfig {
    #[serde(default)]
    pub draw_line: bool,
    #[serde(default)]
    pub draw_in_out: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub ffmpeg_path: String,
    pub preset: String,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            preset: "fast".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    Firebase(FirebaseConfig),
    Local(LocalStorageConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseConfig {
    pub project_id: String,
    pub bucket: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Environment variable holding an OAuth2 bearer token
    #[serde(default = "default_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    pub records_path: String,
    pub objects_dir: String,
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Offset of the site's wall clock from UTC
    pub utc_offset_hours: i32,
    pub reset_hour: u32,
    pub reset_minute: u32,
    /// Also run the reset check at the start of every processing run
    pub reset_on_run_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 7,
            reset_hour: 0,
            reset_minute: 0,
            reset_on_run_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_confidence() -> f32 {
    0.5
}

fn default_nms_iou() -> f32 {
    0.45
}

fn default_class_ids() -> Vec<usize> {
    vec![0]
}

fn default_input_size() -> usize {
    640
}

fn default_num_classes() -> usize {
    80
}

fn default_intra_threads() -> usize {
    4
}

fn default_collection() -> String {
    "people_counter".to_string()
}

fn default_token_env() -> String {
    "GOOGLE_OAUTH_ACCESS_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

/// One detector/tracker output box.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDetection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] pixels
    pub confidence: f32,
    pub class_id: usize,
    /// `None` when the tracker could not assign an identity this frame
    pub track_id: Option<TrackId>,
}
