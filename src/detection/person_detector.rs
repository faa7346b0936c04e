// src/detection/person_detector.rs
//
// YOLOv8 ONNX detector restricted to configured COCO classes (person by
// default). Letterboxes the BGR frame to a square input, runs ONNX Runtime
// and maps boxes back to source-frame pixels.

use anyhow::{Context, Result};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use tracing::{debug, info};

use crate::types::DetectorConfig;

const LETTERBOX_FILL: f64 = 114.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in source-frame pixels
    pub confidence: f32,
    pub class_id: usize,
}

/// Geometry of the resize + pad applied before inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub scaled_w: i32,
    pub scaled_h: i32,
    pub pad_x: i32,
    pub pad_y: i32,
}

impl Letterbox {
    pub fn fit(src_w: i32, src_h: i32, target: i32) -> Self {
        let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
        let scaled_w = ((src_w as f32 * scale) as i32).clamp(1, target);
        let scaled_h = ((src_h as f32 * scale) as i32).clamp(1, target);
        Self {
            scale,
            scaled_w,
            scaled_h,
            pad_x: (target - scaled_w) / 2,
            pad_y: (target - scaled_h) / 2,
        }
    }

    /// Model-space corner box back to source pixels.
    pub fn unmap(&self, bbox: [f32; 4]) -> [f32; 4] {
        [
            (bbox[0] - self.pad_x as f32) / self.scale,
            (bbox[1] - self.pad_y as f32) / self.scale,
            (bbox[2] - self.pad_x as f32) / self.scale,
            (bbox[3] - self.pad_y as f32) / self.scale,
        ]
    }
}

pub struct PersonDetector {
    session: Session,
    config: DetectorConfig,
}

impl PersonDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        info!("Loading YOLO model: {}", config.model_path);

        let mut builder = Session::builder()?;
        if config.use_cuda {
            info!("Enabling CUDA execution provider");
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().with_device_id(0).build()])?;
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads)?
            .commit_from_file(&config.model_path)
            .with_context(|| format!("Failed to load model {}", config.model_path))?;

        info!("✓ Person detector initialized (classes {:?})", config.class_ids);
        Ok(Self {
            session,
            config: config.clone(),
        })
    }

    pub fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>> {
        let size = frame.size()?;
        let letterbox = Letterbox::fit(size.width, size.height, self.config.input_size as i32);

        let input = self.preprocess(frame, &letterbox)?;
        let output = self.infer(input)?;

        let candidates = decode_predictions(
            &output,
            self.config.num_classes,
            &letterbox,
            self.config.confidence_threshold,
            &self.config.class_ids,
        );
        let detections = nms(candidates, self.config.nms_iou_threshold);

        debug!("Detected {} person(s)", detections.len());
        Ok(detections)
    }

    fn preprocess(&self, frame: &Mat, letterbox: &Letterbox) -> Result<Vec<f32>> {
        let target = self.config.input_size as i32;

        let mut rgb = Mat::default();
        imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        let mut resized = Mat::default();
        imgproc::resize(
            &rgb,
            &mut resized,
            core::Size::new(letterbox.scaled_w, letterbox.scaled_h),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let mut canvas = Mat::default();
        core::copy_make_border(
            &resized,
            &mut canvas,
            letterbox.pad_y,
            target - letterbox.scaled_h - letterbox.pad_y,
            letterbox.pad_x,
            target - letterbox.scaled_w - letterbox.pad_x,
            core::BORDER_CONSTANT,
            core::Scalar::all(LETTERBOX_FILL),
        )?;

        Ok(hwc_to_chw(canvas.data_bytes()?, target as usize))
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<Vec<f32>> {
        let side = self.config.input_size;
        let input_value = Tensor::from_array(([1usize, 3, side, side], input))?;

        let outputs = self.session.run(ort::inputs!["images" => input_value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }
}

/// Normalize `[0, 255]` -> `[0, 1]` and reorder HWC -> CHW.
fn hwc_to_chw(pixels: &[u8], side: usize) -> Vec<f32> {
    let plane = side * side;
    let mut input = vec![0.0f32; 3 * plane];
    for (i, px) in pixels.chunks_exact(3).take(plane).enumerate() {
        for c in 0..3 {
            input[c * plane + i] = px[c] as f32 / 255.0;
        }
    }
    input
}

/// Parse a `[1, 4 + C, N]` YOLOv8 output: rows are cx, cy, w, h followed
/// by one score per class.
pub fn decode_predictions(
    output: &[f32],
    num_classes: usize,
    letterbox: &Letterbox,
    conf_thresh: f32,
    class_ids: &[usize],
) -> Vec<Detection> {
    let rows = 4 + num_classes;
    let n = output.len() / rows;
    let mut detections = Vec::new();

    for i in 0..n {
        let mut best_conf = 0.0f32;
        let mut best_class = 0;
        for c in 0..num_classes {
            let conf = output[n * (4 + c) + i];
            if conf > best_conf {
                best_conf = conf;
                best_class = c;
            }
        }

        if best_conf < conf_thresh || !class_ids.contains(&best_class) {
            continue;
        }

        let cx = output[i];
        let cy = output[n + i];
        let w = output[n * 2 + i];
        let h = output[n * 3 + i];

        detections.push(Detection {
            bbox: letterbox.unmap([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]),
            confidence: best_conf,
            class_id: best_class,
        });
    }
    detections
}

pub fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        if keep.iter().all(|k| iou(&k.bbox, &det.bbox) < iou_threshold) {
            keep.push(det);
        }
    }
    keep
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
