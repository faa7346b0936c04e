// src/video_processor.rs
//
// Source decoding, annotated output encoding, and the per-frame overlay.

use std::path::Path;

use anyhow::{bail, Context, Result};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use tracing::{debug, info};

use crate::counting::{CountingLine, CrossingDirection};
use crate::pipeline::FrameContext;
use crate::types::OverlayConfig;

/// Fallback when the container reports no frame rate.
const DEFAULT_FPS: f64 = 30.0;

/// Right margin of the text block, matching 1600px on a 1920px frame.
const TEXT_RIGHT_MARGIN: i32 = 320;

// Colors (BGR)
const BOX_COLOR: core::Scalar = core::Scalar::new(0.0, 87.0, 212.0, 0.0);
const CENTROID_COLOR: core::Scalar = core::Scalar::new(0.0, 0.0, 255.0, 0.0);
const LINE_COLOR: core::Scalar = core::Scalar::new(250.0, 192.0, 23.0, 0.0);
const IN_COLOR: core::Scalar = core::Scalar::new(0.0, 255.0, 0.0, 0.0);
const OUT_COLOR: core::Scalar = core::Scalar::new(0.0, 0.0, 255.0, 0.0);
const TOTAL_COLOR: core::Scalar = core::Scalar::new(255.0, 255.0, 0.0, 0.0);

// ============================================================================
// READER
// ============================================================================

pub struct VideoReader {
    cap: VideoCapture,
    pub fps: f64,
    pub total_frames: i32,
    pub current_frame: u64,
    pub width: i32,
    pub height: i32,
}

impl VideoReader {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening video: {}", path.display());

        let path_str = path
            .to_str()
            .with_context(|| format!("Non UTF-8 video path {}", path.display()))?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;

        if !cap.is_opened()? {
            bail!("Failed to open video file {}", path.display());
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let fps = if fps > 0.0 { fps } else { DEFAULT_FPS };
        let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i32;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        if width <= 0 || height <= 0 {
            bail!("Video {} reports no frame size", path.display());
        }

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, total_frames
        );

        Ok(Self {
            cap,
            fps,
            total_frames,
            current_frame: 0,
            width,
            height,
        })
    }

    /// Next decoded BGR frame, `None` at end of stream.
    pub fn read_frame(&mut self) -> Result<Option<Mat>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();
        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }
        self.current_frame += 1;
        Ok(Some(mat))
    }

    pub fn progress(&self) -> f32 {
        if self.total_frames <= 0 {
            return 0.0;
        }
        (self.current_frame as f32 / self.total_frames as f32) * 100.0
    }
}

// ============================================================================
// WRITER
// ============================================================================

pub struct AnnotatedWriter {
    writer: VideoWriter,
    pub frames_written: u64,
}

impl AnnotatedWriter {
    pub fn create(path: &Path, width: i32, height: i32, fps: f64) -> Result<Self> {
        let path_str = path
            .to_str()
            .with_context(|| format!("Non UTF-8 output path {}", path.display()))?;

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(path_str, fourcc, fps, core::Size::new(width, height), true)?;
        if !writer.is_opened()? {
            bail!("Failed to open video writer {}", path.display());
        }

        info!("Output video: {}", path.display());
        Ok(Self {
            writer,
            frames_written: 0,
        })
    }

    pub fn write(&mut self, frame: &Mat) -> Result<()> {
        use opencv::videoio::VideoWriterTrait;
        self.writer.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Flush and close the container.
    pub fn finish(mut self) -> Result<u64> {
        use opencv::videoio::VideoWriterTrait;
        self.writer.release()?;
        Ok(self.frames_written)
    }
}

// ============================================================================
// OVERLAY
// ============================================================================

/// Text lines drawn in the top-right block, with their colors.
fn overlay_text(ctx: &FrameContext, overlay: &OverlayConfig) -> Vec<(String, core::Scalar)> {
    let mut lines = Vec::new();
    if overlay.draw_in_out {
        lines.push((format!("In: {}", ctx.counts.in_count), IN_COLOR));
        lines.push((format!("Out: {}", ctx.counts.out_count), OUT_COLOR));
    }
    lines.push((format!("Total_count: {}", ctx.counts.total_count), TOTAL_COLOR));
    lines
}

/// Ring at each crossing on this frame, green for entries and red for exits.
/// Deferred exits are marked at the subject's last known centroid.
fn crossing_markers(ctx: &FrameContext) -> Vec<(core::Point, core::Scalar)> {
    ctx.events
        .iter()
        .map(|event| {
            let color = match event.direction {
                CrossingDirection::In => IN_COLOR,
                CrossingDirection::Out => OUT_COLOR,
            };
            (core::Point::new(event.centroid.0 as i32, event.centroid.1 as i32), color)
        })
        .collect()
}

/// Draw boxes, centroids, crossing markers and counts onto `frame` in place.
pub fn draw_overlay(
    frame: &mut Mat,
    ctx: &FrameContext,
    line: &CountingLine,
    overlay: &OverlayConfig,
) -> Result<()> {
    for det in &ctx.detections {
        let [x1, y1, x2, y2] = det.bbox.map(|v| v as i32);
        imgproc::rectangle(
            frame,
            core::Rect::new(x1, y1, x2 - x1, y2 - y1),
            BOX_COLOR,
            2,
            imgproc::LINE_8,
            0,
        )?;

        let (cx, cy) = crate::counting::centroid(&det.bbox);
        imgproc::circle(
            frame,
            core::Point::new(cx as i32, cy as i32),
            4,
            CENTROID_COLOR,
            -1,
            imgproc::LINE_8,
            0,
        )?;
    }

    let markers = crossing_markers(ctx);
    if !markers.is_empty() {
        debug!("Frame {}: marking {} crossing(s)", ctx.frame_index, markers.len());
    }
    for (center, color) in markers {
        imgproc::circle(frame, center, 18, color, 3, imgproc::LINE_AA, 0)?;
    }

    if overlay.draw_line {
        imgproc::line(
            frame,
            core::Point::new(line.start.0 as i32, line.start.1 as i32),
            core::Point::new(line.end.0 as i32, line.end.1 as i32),
            LINE_COLOR,
            6,
            imgproc::LINE_AA,
            0,
        )?;
    }

    let text_x = (frame.cols() - TEXT_RIGHT_MARGIN).max(10);
    let lines = overlay_text(ctx, overlay);
    // Total stays on the third row whether or not In/Out are drawn
    let first_row = 3 - lines.len() as i32;
    for (i, (text, color)) in lines.iter().enumerate() {
        imgproc::put_text(
            frame,
            text,
            core::Point::new(text_x, 30 + 40 * (first_row + i as i32)),
            imgproc::FONT_HERSHEY_SIMPLEX,
            1.0,
            *color,
            2,
            imgproc::LINE_8,
            false,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::CountState;

    fn ctx(total: i64) -> FrameContext {
        FrameContext {
            frame_index: 1,
            detections: vec![],
            counts: CountState {
                in_count: 2,
                out_count: 1,
                baseline_total: total - 1,
                initial_occupancy: 0,
                total_count: total,
            },
            events: vec![],
        }
    }

    #[test]
    fn test_overlay_text_total_only_by_default() {
        let lines = overlay_text(&ctx(4), &OverlayConfig::default());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, "Total_count: 4");
    }

    #[test]
    fn test_overlay_text_with_in_out() {
        let overlay = OverlayConfig {
            draw_line: false,
            draw_in_out: true,
        };
        let text: Vec<String> = overlay_text(&ctx(4), &overlay)
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(text, vec!["In: 2", "Out: 1", "Total_count: 4"]);
    }

    #[test]
    fn test_crossing_markers_follow_events() {
        use crate::counting::CrossingEvent;

        let mut frame = ctx(4);
        assert!(crossing_markers(&frame).is_empty());

        frame.events = vec![
            CrossingEvent {
                track_id: 3,
                direction: CrossingDirection::In,
                frame_index: 1,
                centroid: (120.0, 480.0),
                deferred: false,
            },
            CrossingEvent {
                track_id: 5,
                direction: CrossingDirection::Out,
                frame_index: 1,
                centroid: (640.0, 470.0),
                deferred: true,
            },
        ];
        let markers = crossing_markers(&frame);
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0], (opencv::core::Point::new(120, 480), IN_COLOR));
        assert_eq!(markers[1], (opencv::core::Point::new(640, 470), OUT_COLOR));
    }
}
